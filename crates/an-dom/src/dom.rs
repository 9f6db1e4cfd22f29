//! # DOM port
//!
//! The slice of a document the engine reads. Hosts with a live page implement
//! it over their own node handles; tests and server-side tooling use
//! [`crate::HtmlDocument`].

use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// Id of the annotation panel.
pub const PANEL_ID: &str = "annotate-panel";
/// Classes marking the engine's own chrome. Pointer events on these never
/// select or highlight page content.
pub const CHROME_CLASSES: [&str; 4] = [
    "annotate-floating-controls",
    "annotate-autocomplete",
    "annotate-modal",
    "annotate-badge",
];
pub const BADGE_CLASS: &str = "annotate-badge";
/// Attribute the host writes on badges and on elements owning a thread.
pub const THREAD_ID_ATTR: &str = "data-annotate-thread-id";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid selector `{selector}`: {reason}")]
    Invalid { selector: String, reason: String },
}

pub trait DomTree {
    type Node: Copy + Eq + Hash + Debug;

    /// Lowercase tag name; `None` for anything that is not an element.
    fn tag_name(&self, node: Self::Node) -> Option<String>;
    fn attr(&self, node: Self::Node, name: &str) -> Option<String>;
    fn classes(&self, node: Self::Node) -> Vec<String>;
    fn parent_element(&self, node: Self::Node) -> Option<Self::Node>;
    /// Element children in document order.
    fn element_children(&self, node: Self::Node) -> Vec<Self::Node>;
    /// Every element matching `selector`, in document order.
    fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, SelectorError>;

    fn is_element(&self, node: Self::Node) -> bool {
        self.tag_name(node).is_some()
    }

    fn query_first(&self, selector: &str) -> Result<Option<Self::Node>, SelectorError> {
        Ok(self.query_all(selector)?.into_iter().next())
    }

    fn has_class(&self, node: Self::Node, class: &str) -> bool {
        self.classes(node).iter().any(|c| c == class)
    }

    /// `node` or its nearest element ancestor satisfying `pred`.
    fn closest<F>(&self, node: Self::Node, pred: F) -> Option<Self::Node>
    where
        F: Fn(&Self, Self::Node) -> bool,
        Self: Sized,
    {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if self.is_element(candidate) && pred(self, candidate) {
                return Some(candidate);
            }
            current = self.parent_element(candidate);
        }
        None
    }
}

/// Whether `node` sits inside the panel, floating controls, autocomplete,
/// modal or a badge.
pub fn is_chrome<D: DomTree>(dom: &D, node: D::Node) -> bool {
    dom.closest(node, |d, n| {
        d.attr(n, "id").as_deref() == Some(PANEL_ID)
            || CHROME_CLASSES.iter().any(|class| d.has_class(n, class))
    })
    .is_some()
}
