//! [`DomTree`] over a parsed HTML document.

use crate::dom::{DomTree, SelectorError};
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn root_element(&self) -> NodeId {
        self.html.root_element().id()
    }

    /// Every element in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        self.html
            .tree
            .nodes()
            .filter_map(ElementRef::wrap)
            .map(|el| el.id())
            .collect()
    }

    /// Text content of an element, concatenated.
    pub fn text(&self, node: NodeId) -> String {
        self.element(node)
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default()
    }

    fn element(&self, node: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(node).and_then(ElementRef::wrap)
    }
}

impl DomTree for HtmlDocument {
    type Node = NodeId;

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.element(node)
            .map(|el| el.value().name().to_ascii_lowercase())
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.value().attr(name).map(str::to_string)
    }

    fn classes(&self, node: NodeId) -> Vec<String> {
        self.element(node)
            .map(|el| el.value().classes().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.html.tree.get(node)?.parent()?;
        ElementRef::wrap(parent).map(|el| el.id())
    }

    fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node)
            .map(|n| n.children().filter_map(ElementRef::wrap).map(|el| el.id()).collect())
            .unwrap_or_default()
    }

    fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let parsed = Selector::parse(selector).map_err(|err| SelectorError::Invalid {
            selector: selector.to_string(),
            reason: err.to_string(),
        })?;
        Ok(self.html.select(&parsed).map(|el| el.id()).collect())
    }
}
