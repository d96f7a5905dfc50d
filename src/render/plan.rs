use kuchiki::NodeRef;

use super::{
    title_container, DisplayMode, RenderError, TileValues, SUBTITLE_CLASS, TEXT_WRAPPER_CLASS,
    TITLE_GROUP_CLASS,
};
use crate::dom::{first_element_child, has_class, is_element_named, is_visible, query_in};

/// Size classes the dashboard assigns to widget frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLayout {
    OneThird,
    OneHalf,
    TwoThirds,
    FullRow,
}

impl TileLayout {
    fn from_frame(frame: &NodeRef) -> Option<Self> {
        [
            ("dashboard__widget--one-third", Self::OneThird),
            ("dashboard__widget--one-half", Self::OneHalf),
            ("dashboard__widget--two-thirds", Self::TwoThirds),
            ("dashboard__widget--full", Self::FullRow),
        ]
        .into_iter()
        .find(|(class, _)| has_class(frame, class))
        .map(|(_, layout)| layout)
    }
}

/// What the planner needs to know about the tile as it currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedTile {
    pub layout: TileLayout,
    /// The title container already holds title-group wrappers.
    pub grouped: bool,
    /// The title already holds a "<today> / <total>" text wrapper.
    pub wrapped: bool,
    pub subtitle_visible: bool,
}

/// One edit to the tile. Count edits always land on the visible bubble, so
/// hidden decoys are never written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    SetCountText(String),
    /// Compact layout: "<today> / <total>" inside a text wrapper, preceded by
    /// hidden decoys.
    BuildTextWrapper { total: String },
    UpdateWrapperTotal { total: String },
    /// Put the original count text back and drop the wrapper.
    RemoveTextWrapper,
    /// Wide layouts: a second title group labelled "Total".
    AppendTotalGroup { total: String },
    UpdateGroupTotal { total: String },
    /// Move the first group's children back and drop both groups.
    RemoveTotalGroup,
    HideSubtitle,
    ShowSubtitle,
}

pub type PatchPlan = Vec<PatchOp>;

pub fn observe(target: &NodeRef) -> Result<ObservedTile, RenderError> {
    let container = title_container(target)?;

    // Classified from the enclosing widget frame, never from script state.
    let layout = container
        .ancestors()
        .filter(|node| is_element_named(node, "turbo-frame"))
        .find_map(|frame| TileLayout::from_frame(&frame))
        .unwrap_or(TileLayout::FullRow);

    let grouped = first_element_child(&container)
        .map(|first| has_class(&first, TITLE_GROUP_CLASS))
        .unwrap_or(false);
    let wrapped = query_in(&container, &format!(".{TEXT_WRAPPER_CLASS}")).is_some();
    let subtitle_visible = query_in(&container, &format!(".{SUBTITLE_CLASS}"))
        .map(|subtitle| is_visible(&subtitle))
        .unwrap_or(false);

    Ok(ObservedTile {
        layout,
        grouped,
        wrapped,
        subtitle_visible,
    })
}

/// Edits that bring the observed tile to `mode`. A tile decorated by an
/// earlier call is updated in place rather than decorated again.
pub fn plan(observed: &ObservedTile, values: &TileValues, mode: DisplayMode) -> PatchPlan {
    let today = values.today.to_string();
    let total = values.total.to_string();
    let compact = observed.layout == TileLayout::OneThird;
    let mut ops = Vec::new();

    let hide_subtitle = mode == DisplayMode::TotalOnly || compact;
    // Shown first so a freshly cloned total group copies a visible subtitle.
    if !hide_subtitle && !observed.subtitle_visible {
        ops.push(PatchOp::ShowSubtitle);
    }

    match mode {
        DisplayMode::TotalOnly => {
            if observed.wrapped {
                ops.push(PatchOp::RemoveTextWrapper);
            }
            if observed.grouped {
                ops.push(PatchOp::RemoveTotalGroup);
            }
            ops.push(PatchOp::SetCountText(total));
        }
        DisplayMode::TodayAndTotal if compact => {
            if observed.grouped {
                ops.push(PatchOp::RemoveTotalGroup);
            }
            ops.push(PatchOp::SetCountText(today));
            if observed.wrapped {
                ops.push(PatchOp::UpdateWrapperTotal { total });
            } else {
                ops.push(PatchOp::BuildTextWrapper { total });
            }
        }
        DisplayMode::TodayAndTotal => {
            if observed.wrapped {
                ops.push(PatchOp::RemoveTextWrapper);
            }
            ops.push(PatchOp::SetCountText(today));
            if observed.grouped {
                ops.push(PatchOp::UpdateGroupTotal { total });
            } else {
                ops.push(PatchOp::AppendTotalGroup { total });
            }
        }
    }

    if hide_subtitle && observed.subtitle_visible {
        ops.push(PatchOp::HideSubtitle);
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Page;
    use crate::render::fixtures::dashboard;
    use crate::render::COUNT_BUBBLE_SELECTOR;

    fn observed(layout: TileLayout, grouped: bool) -> ObservedTile {
        ObservedTile {
            layout,
            grouped,
            wrapped: false,
            subtitle_visible: true,
        }
    }

    const VALUES: TileValues = TileValues {
        today: 5,
        total: 37,
    };

    #[test]
    fn observes_layout_from_frame_class() {
        for (class, expected) in [
            ("one-third", TileLayout::OneThird),
            ("one-half", TileLayout::OneHalf),
            ("two-thirds", TileLayout::TwoThirds),
            ("full", TileLayout::FullRow),
        ] {
            let page = Page::parse(&dashboard(class, "5"));
            let target = page.query(COUNT_BUBBLE_SELECTOR).unwrap();
            let tile = observe(&target).unwrap();
            assert_eq!(tile.layout, expected, "class {class}");
            assert!(!tile.grouped);
            assert!(!tile.wrapped);
            assert!(tile.subtitle_visible);
        }
    }

    #[test]
    fn observe_rejects_detached_target() {
        let page = Page::parse("<html><body><span class=\"count-bubble\">1</span></body></html>");
        let target = page.query(".count-bubble").unwrap();
        target.detach();
        assert_eq!(
            observe(&target),
            Err(RenderError::UnexpectedStructure("title container"))
        );
    }

    #[test]
    fn total_only_is_a_single_replacement() {
        let ops = plan(
            &observed(TileLayout::TwoThirds, false),
            &VALUES,
            DisplayMode::TotalOnly,
        );
        assert_eq!(
            ops,
            vec![PatchOp::SetCountText("37".into()), PatchOp::HideSubtitle]
        );
    }

    #[test]
    fn compact_layout_builds_wrapper_and_hides_subtitle() {
        let ops = plan(
            &observed(TileLayout::OneThird, false),
            &VALUES,
            DisplayMode::TodayAndTotal,
        );
        assert_eq!(
            ops,
            vec![
                PatchOp::SetCountText("5".into()),
                PatchOp::BuildTextWrapper { total: "37".into() },
                PatchOp::HideSubtitle,
            ]
        );
    }

    #[test]
    fn wide_layout_updates_existing_group() {
        let fresh = plan(
            &observed(TileLayout::FullRow, false),
            &VALUES,
            DisplayMode::TodayAndTotal,
        );
        assert_eq!(
            fresh,
            vec![
                PatchOp::SetCountText("5".into()),
                PatchOp::AppendTotalGroup { total: "37".into() },
            ]
        );

        let grouped = plan(
            &observed(TileLayout::OneHalf, true),
            &VALUES,
            DisplayMode::TodayAndTotal,
        );
        assert_eq!(
            grouped,
            vec![
                PatchOp::SetCountText("5".into()),
                PatchOp::UpdateGroupTotal { total: "37".into() },
            ]
        );
    }

    #[test]
    fn hidden_subtitle_is_left_alone() {
        let tile = ObservedTile {
            layout: TileLayout::OneThird,
            grouped: false,
            wrapped: false,
            subtitle_visible: false,
        };
        let ops = plan(&tile, &VALUES, DisplayMode::TotalOnly);
        assert_eq!(ops, vec![PatchOp::SetCountText("37".into())]);
    }

    #[test]
    fn wrapped_compact_tile_is_updated_in_place() {
        let tile = ObservedTile {
            layout: TileLayout::OneThird,
            grouped: false,
            wrapped: true,
            subtitle_visible: false,
        };
        assert_eq!(
            plan(&tile, &VALUES, DisplayMode::TodayAndTotal),
            vec![
                PatchOp::SetCountText("5".into()),
                PatchOp::UpdateWrapperTotal { total: "37".into() },
            ]
        );
        assert_eq!(
            plan(&tile, &VALUES, DisplayMode::TotalOnly),
            vec![
                PatchOp::RemoveTextWrapper,
                PatchOp::SetCountText("37".into()),
            ]
        );
    }

    #[test]
    fn grouped_tile_switching_to_total_only_is_ungrouped() {
        let ops = plan(
            &observed(TileLayout::TwoThirds, true),
            &VALUES,
            DisplayMode::TotalOnly,
        );
        assert_eq!(
            ops,
            vec![
                PatchOp::RemoveTotalGroup,
                PatchOp::SetCountText("37".into()),
                PatchOp::HideSubtitle,
            ]
        );
    }

    #[test]
    fn hidden_subtitle_is_shown_before_regrouping() {
        let tile = ObservedTile {
            layout: TileLayout::OneHalf,
            grouped: false,
            wrapped: false,
            subtitle_visible: false,
        };
        assert_eq!(
            plan(&tile, &VALUES, DisplayMode::TodayAndTotal),
            vec![
                PatchOp::ShowSubtitle,
                PatchOp::SetCountText("5".into()),
                PatchOp::AppendTotalGroup { total: "37".into() },
            ]
        );
    }
}
