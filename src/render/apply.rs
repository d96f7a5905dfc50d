use kuchiki::NodeRef;

use super::plan::PatchOp;
use super::{
    title_container, RenderError, COUNT_BUBBLE_SELECTOR, COUNT_TEXT_SELECTOR, SUBTITLE_CLASS,
    TEXT_WRAPPER_CLASS, TITLE_CLASS, TITLE_GROUP_CLASS, TITLE_TEXT_CLASS,
};
use crate::dom::{
    create_element, deep_clone, element_children, first_element_child, first_visible_in,
    has_class, hide, is_visible, query_in, set_text, show,
};

/// Execute `plan` against the live tile that contains `target`.
pub fn apply_plan(target: &NodeRef, plan: &[PatchOp]) -> Result<(), RenderError> {
    let container = title_container(target)?;
    for op in plan {
        match op {
            PatchOp::SetCountText(text) => {
                let bubble = first_visible_in(&container, COUNT_BUBBLE_SELECTOR)
                    .ok_or(RenderError::UnexpectedStructure("visible count bubble"))?;
                set_text(&bubble, text);
            }
            PatchOp::BuildTextWrapper { total } => build_text_wrapper(&container, total)?,
            PatchOp::UpdateWrapperTotal { total } => update_wrapper_total(&container, total)?,
            PatchOp::RemoveTextWrapper => remove_text_wrapper(&container)?,
            PatchOp::AppendTotalGroup { total } => append_total_group(&container, total),
            PatchOp::UpdateGroupTotal { total } => update_group_total(&container, total)?,
            PatchOp::RemoveTotalGroup => remove_total_group(&container),
            PatchOp::HideSubtitle => {
                if let Some(subtitle) = subtitle(&container) {
                    if is_visible(&subtitle) {
                        hide(&subtitle);
                    }
                }
            }
            PatchOp::ShowSubtitle => {
                if let Some(subtitle) = subtitle(&container) {
                    show(&subtitle);
                }
            }
        }
    }
    Ok(())
}

fn subtitle(container: &NodeRef) -> Option<NodeRef> {
    query_in(container, &format!(".{SUBTITLE_CLASS}"))
}

fn text_wrapper(container: &NodeRef) -> Result<NodeRef, RenderError> {
    query_in(container, &format!(".{TEXT_WRAPPER_CLASS}"))
        .ok_or(RenderError::UnexpectedStructure("text wrapper"))
}

fn build_text_wrapper(container: &NodeRef, total: &str) -> Result<(), RenderError> {
    let title = query_in(container, &format!(".{TITLE_CLASS}"))
        .ok_or(RenderError::UnexpectedStructure("tile title"))?;
    let anchor =
        first_element_child(&title).ok_or(RenderError::UnexpectedStructure("title text"))?;

    let wrapper = create_element("div", Some(TEXT_WRAPPER_CLASS));
    anchor.insert_after(wrapper.clone());

    // The dashboard intermittently drops the first child of a freshly
    // inserted wrapper. The original count text goes first, hidden, so the
    // loss never reaches a visible node.
    let count_text_decoy = query_in(container, COUNT_TEXT_SELECTOR)
        .ok_or(RenderError::UnexpectedStructure("count text"))?;
    let count_text = deep_clone(&count_text_decoy);
    let total_text = deep_clone(&count_text_decoy);
    let total_bubble =
        first_element_child(&total_text).ok_or(RenderError::UnexpectedStructure("count bubble"))?;
    set_text(&total_bubble, total);

    let slash = create_element("div", Some(TITLE_TEXT_CLASS));
    set_text(&slash, "/");
    let slash_decoy = deep_clone(&slash);
    hide(&slash_decoy);
    hide(&count_text_decoy);

    wrapper.append(count_text_decoy);
    wrapper.append(slash_decoy);
    wrapper.append(count_text);
    wrapper.append(slash);
    wrapper.append(total_text);
    Ok(())
}

fn update_wrapper_total(container: &NodeRef, total: &str) -> Result<(), RenderError> {
    let wrapper = text_wrapper(container)?;
    let bubble = element_children(&wrapper)
        .last()
        .and_then(|total_text| query_in(total_text, ".count-bubble"))
        .ok_or(RenderError::UnexpectedStructure("total bubble"))?;
    set_text(&bubble, total);
    Ok(())
}

fn remove_text_wrapper(container: &NodeRef) -> Result<(), RenderError> {
    let wrapper = text_wrapper(container)?;
    // The first child is the original count text, or a visible copy if the
    // decoy was dropped after insertion.
    let original = element_children(&wrapper)
        .into_iter()
        .find(|child| query_in(child, ".count-bubble").is_some())
        .ok_or(RenderError::UnexpectedStructure("count text"))?;
    show(&original);
    wrapper.insert_before(original);
    wrapper.detach();
    Ok(())
}

fn append_total_group(container: &NodeRef, total: &str) {
    let children = element_children(container);

    let copies: Vec<NodeRef> = children
        .iter()
        .map(|child| {
            let copy = deep_clone(child);
            if has_class(&copy, SUBTITLE_CLASS) {
                set_text(&copy, "Total");
            }
            if has_class(&copy, TITLE_CLASS) {
                if let Some(bubble) = query_in(&copy, COUNT_BUBBLE_SELECTOR) {
                    set_text(&bubble, total);
                }
            }
            copy
        })
        .collect();

    let existing_group = create_element("div", Some(TITLE_GROUP_CLASS));
    for child in children {
        existing_group.append(child);
    }
    container.prepend(existing_group);

    let total_group = create_element("div", Some(TITLE_GROUP_CLASS));
    for copy in copies {
        total_group.append(copy);
    }
    container.append(total_group);
}

fn update_group_total(container: &NodeRef, total: &str) -> Result<(), RenderError> {
    let bubble = element_children(container)
        .into_iter()
        .filter(|child| has_class(child, TITLE_GROUP_CLASS))
        .last()
        .and_then(|group| query_in(&group, COUNT_BUBBLE_SELECTOR))
        .ok_or(RenderError::UnexpectedStructure("total group"))?;
    set_text(&bubble, total);
    Ok(())
}

fn remove_total_group(container: &NodeRef) {
    let groups: Vec<NodeRef> = element_children(container)
        .into_iter()
        .filter(|child| has_class(child, TITLE_GROUP_CLASS))
        .collect();
    let Some(first) = groups.first() else {
        return;
    };
    let children: Vec<NodeRef> = first.children().collect();
    for child in children {
        first.insert_before(child);
    }
    for group in groups {
        group.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{attr, Page};
    use crate::render::fixtures::dashboard;
    use crate::render::{DisplayMode, RenderMutator, TileValues};

    const VALUES: TileValues = TileValues {
        today: 5,
        total: 37,
    };

    fn target(page: &Page) -> NodeRef {
        page.query(COUNT_BUBBLE_SELECTOR).expect("count bubble")
    }

    fn visible_texts(page: &Page, selector: &str) -> Vec<String> {
        page.query_all(selector)
            .into_iter()
            .filter(is_visible)
            .map(|node| node.text_contents())
            .collect()
    }

    #[test]
    fn compact_tile_shows_today_slash_total() {
        let page = Page::parse(&dashboard("one-third", "5"));
        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();

        let wrapper = page.query(".todays-lessons-widget__text-wrapper").unwrap();
        let children = element_children(&wrapper);
        assert_eq!(children.len(), 5);
        assert!(!is_visible(&children[0]), "count text decoy is hidden");
        assert!(!is_visible(&children[1]), "slash decoy is hidden");
        assert_eq!(children[2].text_contents(), "5");
        assert_eq!(children[3].text_contents(), "/");
        assert_eq!(children[4].text_contents(), "37");

        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["5", "37"]);
        let subtitle = page.query(".todays-lessons-widget__subtitle").unwrap();
        assert_eq!(attr(&subtitle, "style").as_deref(), Some("display: none"));
    }

    #[test]
    fn wide_tile_gets_total_group() {
        let page = Page::parse(&dashboard("two-thirds", "5"));
        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();

        let container = page.query(".todays-lessons-widget__title-container").unwrap();
        let groups = element_children(&container);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| has_class(g, TITLE_GROUP_CLASS)));
        assert_eq!(
            query_in(&groups[0], ".todays-lessons-widget__subtitle")
                .unwrap()
                .text_contents(),
            "Today's"
        );
        assert_eq!(
            query_in(&groups[1], ".todays-lessons-widget__subtitle")
                .unwrap()
                .text_contents(),
            "Total"
        );
        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["5", "37"]);
        assert_eq!(visible_texts(&page, ".todays-lessons-widget__subtitle").len(), 2);
    }

    #[test]
    fn total_only_replaces_count_and_hides_subtitle() {
        let page = Page::parse(&dashboard("one-half", "5"));
        let plan = RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TotalOnly)
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["37"]);
        assert!(visible_texts(&page, ".todays-lessons-widget__subtitle").is_empty());
        assert!(page.query(".todays-lessons-widget__title-group-container").is_none());
    }

    #[test]
    fn second_wide_apply_does_not_add_groups() {
        let page = Page::parse(&dashboard("full", "5"));
        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();
        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();
        assert_eq!(
            page.query_all(".todays-lessons-widget__title-group-container")
                .len(),
            2
        );
    }

    #[test]
    fn second_compact_apply_updates_in_place() {
        let page = Page::parse(&dashboard("one-third", "5"));
        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();
        let later = TileValues {
            today: 5,
            total: 40,
        };
        RenderMutator
            .apply(&target(&page), &later, DisplayMode::TodayAndTotal)
            .unwrap();
        assert_eq!(
            page.query_all(".todays-lessons-widget__text-wrapper").len(),
            1
        );
        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["5", "40"]);
    }

    #[test]
    fn compact_tile_switches_between_modes() {
        let page = Page::parse(&dashboard("one-third", "5"));
        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();

        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TotalOnly)
            .unwrap();
        assert!(page.query(".todays-lessons-widget__text-wrapper").is_none());
        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["37"]);
        assert!(visible_texts(&page, ".todays-lessons-widget__subtitle").is_empty());

        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();
        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["5", "37"]);
        assert_eq!(
            page.query_all(".todays-lessons-widget__text-wrapper").len(),
            1
        );
    }

    #[test]
    fn wide_tile_switches_between_modes() {
        let page = Page::parse(&dashboard("two-thirds", "5"));
        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();

        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TotalOnly)
            .unwrap();
        assert!(page
            .query(".todays-lessons-widget__title-group-container")
            .is_none());
        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["37"]);

        RenderMutator
            .apply(&target(&page), &VALUES, DisplayMode::TodayAndTotal)
            .unwrap();
        assert_eq!(visible_texts(&page, ".count-bubble"), vec!["5", "37"]);
        assert_eq!(
            visible_texts(&page, ".todays-lessons-widget__subtitle"),
            vec!["Today's", "Total"]
        );
    }
}
