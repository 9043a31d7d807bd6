//! # Presentation Surface
//!
//! The counter renders into a host-owned node tree it knows nothing about
//! beyond this trait. A surface must be able to:
//!
//! - find nodes by selector (to resolve attach targets)
//! - parse a markup fragment into detached nodes
//! - insert, remove and discard nodes
//! - walk a subtree and read class lists
//! - read and write the text of a node
//!
//! Node handles are small `Copy` values owned by the surface. The counter
//! holds on to them between calls, so a surface must keep a handle valid
//! until the counter discards it.

use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use thiserror::Error;

/// A markup fragment the surface could not parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("markup error at byte {position}: {message}")]
pub struct MarkupError {
    /// Byte offset into the markup
    pub position: usize,
    pub message: String,
}

impl MarkupError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

pub trait Surface {
    type Node: Copy + Eq + Hash + Debug;

    /// Nodes attached to the surface matching `selector`, in tree order.
    fn query(&self, selector: &str) -> Vec<Self::Node>;

    /// Parse `markup` into detached top-level nodes.
    fn parse_fragment(&mut self, markup: &str) -> Result<Vec<Self::Node>, MarkupError>;

    /// Append `child` as the last child of `parent`.
    fn append_child(&mut self, parent: Self::Node, child: Self::Node);

    /// Detach `node` from its parent. A node without a parent is left alone.
    fn remove(&mut self, node: Self::Node);

    /// Release a detached subtree. Handles into it must not be used again.
    fn discard(&mut self, _node: Self::Node) {}

    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Element descendants of `node` in tree order, excluding `node`.
    fn descendants(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Whitespace-separated class list, empty if the node has none.
    fn class_name(&self, node: Self::Node) -> String;

    fn text(&self, node: Self::Node) -> String;

    /// Replace the contents of `node` with `text`.
    fn set_text(&mut self, node: Self::Node, text: &str);
}

/// Where [`crate::Counter::attach`] puts the counter element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target<N> {
    /// Append to this node
    Node(N),
    /// Append to the first node matching the selector
    Selector(String),
    /// Append to the first node of the collection
    First(Vec<N>),
    /// Build the element but leave it out of the tree
    Detached,
}

impl<N: Copy> Target<N> {
    pub fn selector(selector: impl Into<String>) -> Self {
        Target::Selector(selector.into())
    }

    /// Resolve to a parent node. `None` means "do not insert".
    pub fn resolve<S>(&self, surface: &S) -> Option<N>
    where
        S: Surface<Node = N> + ?Sized,
    {
        match self {
            Target::Node(node) => Some(*node),
            Target::Selector(selector) => surface.query(selector).first().copied(),
            Target::First(nodes) => nodes.first().copied(),
            Target::Detached => None,
        }
    }
}

impl<N> Default for Target<N> {
    fn default() -> Self {
        Target::Detached
    }
}

/// A bare string is a selector.
impl<N> From<&str> for Target<N> {
    fn from(selector: &str) -> Self {
        Target::Selector(selector.to_string())
    }
}

impl<N> From<String> for Target<N> {
    fn from(selector: String) -> Self {
        Target::Selector(selector)
    }
}

impl<N> From<Option<N>> for Target<N> {
    fn from(node: Option<N>) -> Self {
        match node {
            Some(node) => Target::Node(node),
            None => Target::Detached,
        }
    }
}

/// Several counters may share one document through `Rc<RefCell<_>>`.
///
/// Borrows last only for the duration of each call, so listeners running
/// inside a counter dispatch can still use the shared handle.
impl<T: Surface> Surface for Rc<RefCell<T>> {
    type Node = T::Node;

    fn query(&self, selector: &str) -> Vec<Self::Node> {
        self.borrow().query(selector)
    }

    fn parse_fragment(&mut self, markup: &str) -> Result<Vec<Self::Node>, MarkupError> {
        self.borrow_mut().parse_fragment(markup)
    }

    fn append_child(&mut self, parent: Self::Node, child: Self::Node) {
        self.borrow_mut().append_child(parent, child);
    }

    fn remove(&mut self, node: Self::Node) {
        self.borrow_mut().remove(node);
    }

    fn discard(&mut self, node: Self::Node) {
        self.borrow_mut().discard(node);
    }

    fn parent(&self, node: Self::Node) -> Option<Self::Node> {
        self.borrow().parent(node)
    }

    fn descendants(&self, node: Self::Node) -> Vec<Self::Node> {
        self.borrow().descendants(node)
    }

    fn class_name(&self, node: Self::Node) -> String {
        self.borrow().class_name(node)
    }

    fn text(&self, node: Self::Node) -> String {
        self.borrow().text(node)
    }

    fn set_text(&mut self, node: Self::Node, text: &str) {
        self.borrow_mut().set_text(node, text);
    }
}
