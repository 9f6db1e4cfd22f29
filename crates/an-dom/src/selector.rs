//! # Selector Engine
//!
//! Produces a CSS selector that resolves to exactly one element whenever the
//! document allows it. Strategies run from most to least stable and the first
//! unique result wins:
//!
//! 1. `#id`
//! 2. the application-assigned `data-annotate-id`
//! 3. `tag.class` for any single non-reserved class
//! 4. `tag[attr="value"]` for a fixed set of content attributes
//! 5. a `tag.class:nth-of-type(n)` path grown one ancestor at a time
//!
//! When no step of the path is unique the full path is returned anyway.

use crate::dom::DomTree;
use cssparser::{serialize_identifier, serialize_string};

pub const STABLE_ID_ATTR: &str = "data-annotate-id";
/// Classes with this prefix belong to the engine (highlight, badge hosts) and
/// never take part in a selector.
pub const RESERVED_CLASS_PREFIX: &str = "annotate-";
const CONTENT_ATTRS: [&str; 5] = ["name", "title", "alt", "placeholder", "aria-label"];
const PATH_SEPARATOR: &str = " > ";

fn css_ident(value: &str) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = serialize_identifier(value, &mut out);
    out
}

fn css_string(value: &str) -> String {
    let mut out = String::new();
    let _ = serialize_string(value, &mut out);
    out
}

fn is_unique<D: DomTree>(dom: &D, selector: &str) -> bool {
    matches!(dom.query_all(selector), Ok(found) if found.len() == 1)
}

fn usable_classes<D: DomTree>(dom: &D, node: D::Node) -> Vec<String> {
    dom.classes(node)
        .into_iter()
        .filter(|c| !c.is_empty() && !c.starts_with(RESERVED_CLASS_PREFIX))
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Selector for `node`; empty for anything that is not an element.
pub fn generate_selector<D: DomTree>(dom: &D, node: D::Node) -> String {
    let Some(tag) = dom.tag_name(node) else {
        return String::new();
    };

    if let Some(id) = non_blank(dom.attr(node, "id")) {
        let candidate = format!("#{}", css_ident(&id));
        if is_unique(dom, &candidate) {
            return candidate;
        }
    }

    if let Some(stable) = non_blank(dom.attr(node, STABLE_ID_ATTR)) {
        let candidate = format!("[{STABLE_ID_ATTR}={}]", css_string(&stable));
        if is_unique(dom, &candidate) {
            return candidate;
        }
    }

    let tag_ident = css_ident(&tag);
    for class in usable_classes(dom, node) {
        let candidate = format!("{tag_ident}.{}", css_ident(&class));
        if is_unique(dom, &candidate) {
            return candidate;
        }
    }

    for attr in CONTENT_ATTRS {
        let Some(value) = non_blank(dom.attr(node, attr)) else {
            continue;
        };
        let candidate = format!("{tag_ident}[{attr}={}]", css_string(&value));
        if is_unique(dom, &candidate) {
            return candidate;
        }
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(node);
    while let Some(el) = current {
        parts.insert(0, path_segment(dom, el));
        let candidate = parts.join(PATH_SEPARATOR);
        if is_unique(dom, &candidate) {
            return candidate;
        }
        current = dom.parent_element(el);
    }
    parts.join(PATH_SEPARATOR)
}

fn path_segment<D: DomTree>(dom: &D, node: D::Node) -> String {
    let tag = dom.tag_name(node).unwrap_or_default();
    let mut segment = css_ident(&tag);
    for class in usable_classes(dom, node) {
        segment.push('.');
        segment.push_str(&css_ident(&class));
    }
    if let Some(parent) = dom.parent_element(node) {
        let same_tag: Vec<D::Node> = dom
            .element_children(parent)
            .into_iter()
            .filter(|sibling| dom.tag_name(*sibling).as_deref() == Some(tag.as_str()))
            .collect();
        if same_tag.len() > 1 {
            if let Some(index) = same_tag.iter().position(|sibling| *sibling == node) {
                segment.push_str(&format!(":nth-of-type({})", index + 1));
            }
        }
    }
    segment
}
