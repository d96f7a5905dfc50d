//! Live document the coordinator queries and decorates.
//!
//! The page is owned by an external renderer that may replace any frame's
//! contents between two observations, so callers hold on to a [`Page`] and
//! re-query it instead of keeping node references across suspension points.

use html5ever::{LocalName, Namespace, QualName};
use kuchiki::traits::*;
use kuchiki::{parse_html, Attribute, ExpandedName, NodeRef};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

#[derive(Clone)]
pub struct Page {
    document: NodeRef,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Self {
            document: parse_html().one(html),
        }
    }

    /// First element matching `selector`. Invalid selectors match nothing.
    pub fn query(&self, selector: &str) -> Option<NodeRef> {
        query_in(&self.document, selector)
    }

    /// First element matching `selector` that is not hidden.
    pub fn query_visible(&self, selector: &str) -> Option<NodeRef> {
        first_visible_in(&self.document, selector)
    }

    pub fn query_all(&self, selector: &str) -> Vec<NodeRef> {
        match self.document.select(selector) {
            Ok(matches) => matches.map(|element| element.as_node().clone()).collect(),
            Err(()) => {
                tracing::warn!(target = "dom", %selector, "invalid selector");
                Vec::new()
            }
        }
    }

    pub fn head(&self) -> Option<NodeRef> {
        self.query("head")
    }

    pub fn frame(&self, frame_id: &str) -> Option<NodeRef> {
        self.query(&format!("turbo-frame#{frame_id}"))
    }

    /// Swap the contents of a frame the way the external renderer does.
    /// Returns `false` when the frame is not on the page.
    pub fn replace_frame(&self, frame_id: &str, inner_html: &str) -> bool {
        let Some(frame) = self.frame(frame_id) else {
            return false;
        };
        clear_children(&frame);
        for child in parse_fragment_nodes(inner_html) {
            frame.append(child);
        }
        true
    }

    /// Empty a frame, as happens while its replacement is being rendered.
    pub fn clear_frame(&self, frame_id: &str) -> bool {
        match self.frame(frame_id) {
            Some(frame) => {
                clear_children(&frame);
                true
            }
            None => false,
        }
    }

    pub fn to_html(&self) -> String {
        self.document.to_string()
    }
}

pub fn query_in(root: &NodeRef, selector: &str) -> Option<NodeRef> {
    match root.select_first(selector) {
        Ok(element) => Some(element.as_node().clone()),
        Err(()) => None,
    }
}

/// First element under `root` matching `selector` that is not hidden.
pub fn first_visible_in(root: &NodeRef, selector: &str) -> Option<NodeRef> {
    root.select(selector)
        .ok()?
        .map(|element| element.as_node().clone())
        .find(is_visible)
}

fn parse_fragment_nodes(html: &str) -> Vec<NodeRef> {
    let parsed = parse_html().one(format!("<html><body>{html}</body></html>"));
    match query_in(&parsed, "body") {
        Some(body) => {
            let children: Vec<NodeRef> = body.children().collect();
            for child in &children {
                child.detach();
            }
            children
        }
        None => Vec::new(),
    }
}

pub fn create_element(tag: &str, class: Option<&str>) -> NodeRef {
    let name = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag));
    let node = NodeRef::new_element(name, Vec::<(ExpandedName, Attribute)>::new());
    if let Some(class) = class {
        set_attr(&node, "class", class);
    }
    node
}

pub fn attr(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attributes = element.attributes.borrow();
    attributes.get(name).map(str::to_string)
}

pub fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub fn has_class(node: &NodeRef, class: &str) -> bool {
    attr(node, "class")
        .map(|classes| classes.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

pub fn is_element_named(node: &NodeRef, tag: &str) -> bool {
    node.as_element()
        .map(|element| &*element.name.local == tag)
        .unwrap_or(false)
}

pub fn element_children(node: &NodeRef) -> Vec<NodeRef> {
    node.children()
        .filter(|child| child.as_element().is_some())
        .collect()
}

pub fn first_element_child(node: &NodeRef) -> Option<NodeRef> {
    node.children().find(|child| child.as_element().is_some())
}

pub fn clear_children(node: &NodeRef) {
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        child.detach();
    }
}

/// Replace every child of `node` with a single text node.
pub fn set_text(node: &NodeRef, text: &str) {
    clear_children(node);
    node.append(NodeRef::new_text(text));
}

pub fn deep_clone(node: &NodeRef) -> NodeRef {
    let copy = NodeRef::new(node.data().clone());
    for child in node.children() {
        copy.append(deep_clone(&child));
    }
    copy
}

pub fn hide(node: &NodeRef) {
    let style = match attr(node, "style") {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{}; display: none", existing.trim().trim_end_matches(';'))
        }
        _ => "display: none".to_string(),
    };
    set_attr(node, "style", &style);
}

/// Drop any `display: none` declaration added by [`hide`]. The attribute is
/// removed entirely when nothing else remains.
pub fn show(node: &NodeRef) {
    let Some(style) = attr(node, "style") else {
        return;
    };
    let kept: Vec<&str> = style
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty() && !is_display_none(decl))
        .collect();
    let Some(element) = node.as_element() else {
        return;
    };
    let mut attributes = element.attributes.borrow_mut();
    if kept.is_empty() {
        attributes.remove("style");
    } else {
        attributes.insert("style", kept.join("; "));
    }
}

fn is_display_none(decl: &str) -> bool {
    let mut parts = decl.splitn(2, ':');
    let property = parts.next().unwrap_or("").trim();
    let value = parts.next().unwrap_or("").trim();
    property.eq_ignore_ascii_case("display") && value.eq_ignore_ascii_case("none")
}

fn hidden_by_style(node: &NodeRef) -> bool {
    attr(node, "style")
        .map(|style| style.split(';').any(is_display_none))
        .unwrap_or(false)
}

/// Inline-style approximation of visibility: neither the node nor any
/// ancestor carries `display: none`, and the `hidden` attribute is absent.
pub fn is_visible(node: &NodeRef) -> bool {
    node.inclusive_ancestors()
        .all(|n| !hidden_by_style(&n) && attr(&n, "hidden").is_none())
}
