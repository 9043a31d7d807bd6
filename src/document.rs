//! # In-Memory Document
//!
//! An HTML tree implementing [`Surface`]. It backs the terminal binary and
//! the tests, and is a reference for what a host toolkit has to provide.
//!
//! Markup goes through `scraper`'s html5ever parser, so entities, void
//! elements and unclosed tags behave the way a browser handles them.
//! Selectors are `scraper` CSS selectors. Comments and text consisting only
//! of whitespace are dropped when a fragment is imported, so templates can be
//! indented freely.
//!
//! Nodes live in the `ego_tree` arena inside the page's [`Html`]. Removed
//! nodes are detached, not freed; they go away with the document.

use ego_tree::NodeRef;
use scraper::node::Text;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::surface::{MarkupError, Surface};

/// Handle to a node of a [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(ego_tree::NodeId);

#[derive(Clone, Debug)]
pub struct Document {
    html: Html,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn is_tag(node: &NodeRef<'_, Node>, name: &str) -> bool {
    node.value().as_element().is_some_and(|el| el.name() == name)
}

impl Document {
    /// An empty page with a `<body>` root.
    pub fn new() -> Self {
        let html = Html::parse_document("<!DOCTYPE html><html><head></head><body></body></html>");
        let body = html
            .tree
            .root()
            .descendants()
            .find(|node| is_tag(node, "body"))
            .map(|node| node.id())
            .unwrap_or_else(|| html.root_element().id());
        Document {
            html,
            body: NodeId(body),
        }
    }

    /// A page whose body contains `markup`.
    ///
    /// ```
    /// use counter_clock_lib::Document;
    ///
    /// let doc = Document::parse(r#"<main id="app"><p class="note">hi &amp; bye</p></main>"#);
    /// let note = doc.query("#app .note")[0];
    /// assert_eq!(doc.text_content(note), "hi & bye");
    /// ```
    pub fn parse(markup: &str) -> Self {
        let mut doc = Document::new();
        let body = doc.body;
        for node in doc.parse_nodes(markup) {
            doc.append_child(body, node);
        }
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn get(&self, node: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(node.0)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.get(node).is_some()
    }

    /// Tag name of an element, `None` for text nodes.
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.get(node)?.value().as_element().map(|el| el.name())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.get(node)?.value().as_element()?.attr(name)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.get(node)
            .map(|n| n.children().map(|child| NodeId(child.id())).collect())
            .unwrap_or_default()
    }

    /// Parent of `node`. The body has none.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        if node == self.body {
            return None;
        }
        self.get(node)?.parent().map(|parent| NodeId(parent.id()))
    }

    /// True if `node` hangs off the document body.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.is_within(node, self.body)
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Move `child` to the end of `parent`'s children. Ignored when either
    /// node is unknown or the move would put `child` inside itself.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) || self.is_within(parent, child) {
            return;
        }
        if let Some(mut node) = self.html.tree.get_mut(child.0) {
            node.detach();
        }
        if let Some(mut node) = self.html.tree.get_mut(parent.0) {
            node.append_id(child.0);
        }
    }

    pub fn remove(&mut self, node: NodeId) {
        if node == self.body {
            return;
        }
        if let Some(mut node) = self.html.tree.get_mut(node.0) {
            node.detach();
        }
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(node) = self.get(node) {
            for text in node.descendants().filter_map(|n| n.value().as_text()) {
                out.push_str(text);
            }
        }
        out
    }

    /// Replace every child of `node` with a single text node. A lone text
    /// child is rewritten in place.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        let Some(current) = self.get(node) else {
            return;
        };
        if current.value().is_text() {
            self.replace_text(node, text);
            return;
        }
        let children = self.children(node);
        if let [only] = children[..] {
            if !text.is_empty() && self.get(only).is_some_and(|n| n.value().is_text()) {
                self.replace_text(only, text);
                return;
            }
        }
        for child in children {
            self.remove(child);
        }
        if !text.is_empty() {
            if let Some(mut parent) = self.html.tree.get_mut(node.0) {
                parent.append(text_node(text));
            }
        }
    }

    fn replace_text(&mut self, node: NodeId, text: &str) {
        if let Some(mut node) = self.html.tree.get_mut(node.0) {
            *node.value() = text_node(text);
        }
    }

    /// Element descendants of `node` in tree order, excluding `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.get(node)
            .map(|n| {
                n.descendants()
                    .skip(1)
                    .filter(|d| d.value().is_element())
                    .map(|d| NodeId(d.id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attached elements matching `selector`, in tree order. The body itself
    /// is a candidate. An invalid selector matches nothing.
    pub fn query(&self, selector: &str) -> Vec<NodeId> {
        let mut candidates = vec![self.body];
        candidates.extend(self.descendants(self.body));
        self.matching(candidates, selector)
    }

    /// Descendants of `node` matching `selector`.
    pub fn query_within(&self, node: NodeId, selector: &str) -> Vec<NodeId> {
        self.matching(self.descendants(node), selector)
    }

    fn matching(&self, candidates: Vec<NodeId>, selector: &str) -> Vec<NodeId> {
        let Ok(selector) = Selector::parse(selector) else {
            debug!(selector, "invalid selector");
            return Vec::new();
        };
        candidates
            .into_iter()
            .filter(|&id| {
                self.get(id)
                    .and_then(ElementRef::wrap)
                    .is_some_and(|el| selector.matches(&el))
            })
            .collect()
    }

    /// Serialized markup of an element and its subtree.
    pub fn to_markup(&self, node: NodeId) -> String {
        self.get(node)
            .and_then(ElementRef::wrap)
            .map(|el| el.html())
            .unwrap_or_default()
    }

    /// Parse `markup` into detached top-level nodes.
    pub fn parse_nodes(&mut self, markup: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(markup);
        fragment
            .root_element()
            .children()
            .filter_map(|node| self.import(node))
            .collect()
    }

    /// Copy a parsed subtree into this page as an orphan.
    fn import(&mut self, source: NodeRef<'_, Node>) -> Option<NodeId> {
        match source.value() {
            Node::Text(text) if text.trim().is_empty() => return None,
            Node::Text(_) | Node::Element(_) => {}
            _ => return None,
        }
        let id = self.html.tree.orphan(source.value().clone()).id();
        for child in source.children() {
            if let Some(child) = self.import(child) {
                if let Some(mut node) = self.html.tree.get_mut(id) {
                    node.append_id(child.0);
                }
            }
        }
        Some(NodeId(id))
    }
}

fn text_node(text: &str) -> Node {
    Node::Text(Text { text: text.into() })
}

impl Surface for Document {
    type Node = NodeId;

    fn query(&self, selector: &str) -> Vec<NodeId> {
        Document::query(self, selector)
    }

    fn parse_fragment(&mut self, markup: &str) -> Result<Vec<NodeId>, MarkupError> {
        Ok(self.parse_nodes(markup))
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        Document::append_child(self, parent, child);
    }

    fn remove(&mut self, node: NodeId) {
        Document::remove(self, node);
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        Document::parent(self, node)
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        Document::descendants(self, node)
    }

    fn class_name(&self, node: NodeId) -> String {
        self.attr(node, "class").unwrap_or_default().to_string()
    }

    fn text(&self, node: NodeId) -> String {
        self.text_content(node)
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.set_text_content(node, text);
    }
}
