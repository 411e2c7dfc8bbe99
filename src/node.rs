//! Document tree
//!
//! A loaded document is a tree of [`Node`]s. String scalars are either
//! literal text or a [`LazyScalar`]: a cell that starts out `Pending` with the
//! unexpanded template and is back-filled exactly once when the template can
//! finally be expanded. The cell is shared between the tree and the deferred
//! step that retries it, so resolving the step fills in the tree.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_yaml::Number;

/// A node of a document tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(Scalar),
    Sequence(Vec<Node>),
    Mapping(Mapping),
    /// Node under a tag this loader does not interpret (kept for output)
    Tagged(Box<TaggedNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedNode {
    /// Tag name without the leading `!`
    pub tag: String,
    pub value: Node,
}

impl Node {
    /// Literal string node
    pub fn string(text: impl Into<String>) -> Self {
        Node::String(Scalar::Literal(text.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    /// Borrow literal text.
    ///
    /// Trees returned by [`crate::load`] hold literal text only; a lazy scalar
    /// still inside the loader is not visible through this accessor.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(Scalar::Literal(text)) => Some(text),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Scalar text usable as a variable value.
    ///
    /// Strings bind as is, numbers and booleans as their YAML text. Pending
    /// scalars, nulls and collections have no text.
    pub fn text(&self) -> Option<String> {
        match self {
            Node::String(scalar) => scalar.text(),
            Node::Number(n) => Some(n.to_string()),
            Node::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Value under `key` when this node is a mapping
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Walk a dotted path: mapping keys by name, sequence items by index.
    ///
    /// `"install.images.0"` reads the first item of `images` under `install`.
    pub fn get_path(&self, path: &str) -> Option<&Node> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |node, segment| match node {
            Node::Mapping(mapping) => mapping.get(segment),
            Node::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Replace every resolved lazy scalar by its literal text.
    ///
    /// Mappings are rebuilt through [`Mapping::insert`], since a deferred key
    /// may have resolved to the text of another key.
    pub(crate) fn collapse(&mut self) {
        match self {
            Node::String(scalar) => {
                if let Scalar::Deferred(lazy) = scalar {
                    if let Some(text) = lazy.resolved() {
                        *scalar = Scalar::Literal(text);
                    }
                }
            }
            Node::Sequence(items) => items.iter_mut().for_each(Node::collapse),
            Node::Mapping(mapping) => {
                for (mut key, mut value) in std::mem::take(&mut mapping.entries) {
                    key.collapse();
                    value.collapse();
                    mapping.insert(key, value);
                }
            }
            Node::Tagged(tagged) => tagged.value.collapse(),
            Node::Null | Node::Bool(_) | Node::Number(_) => {}
        }
    }
}

/// Ordered key/value pairs. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(Node, Node)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair; the last value for a key wins and keeps the first position
    pub fn insert(&mut self, key: Node, value: Node) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value whose key text is `key`
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.text().as_deref() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Node, Node)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A string scalar
#[derive(Debug, Clone)]
pub enum Scalar {
    /// Text known when the node was built (or collapsed after resolution)
    Literal(String),
    /// Text filled in later by the deferred queue
    Deferred(LazyScalar),
}

impl Scalar {
    /// Final text, `None` while still pending
    pub fn text(&self) -> Option<String> {
        match self {
            Scalar::Literal(text) => Some(text.clone()),
            Scalar::Deferred(lazy) => lazy.resolved(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Scalar::Deferred(lazy) if !lazy.is_resolved())
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self.text(), other.text()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (self, other) {
                (Scalar::Deferred(a), Scalar::Deferred(b)) => a.template() == b.template(),
                _ => false,
            },
            _ => false,
        }
    }
}

/// Resolution state of a lazy scalar. `Pending` moves to `Resolved` once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarState {
    Pending { template: String, retries_left: u32 },
    Resolved(String),
}

#[derive(Debug)]
struct LazyCell {
    state: ScalarState,
    failed_attempts: u32,
}

/// Shared single-assignment cell behind a deferred string scalar
#[derive(Clone)]
pub struct LazyScalar(Rc<RefCell<LazyCell>>);

impl LazyScalar {
    pub(crate) fn pending(template: impl Into<String>, retries: u32) -> Self {
        LazyScalar(Rc::new(RefCell::new(LazyCell {
            state: ScalarState::Pending {
                template: template.into(),
                retries_left: retries,
            },
            failed_attempts: 0,
        })))
    }

    pub fn state(&self) -> ScalarState {
        self.0.borrow().state.clone()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.0.borrow().state, ScalarState::Resolved(_))
    }

    pub fn resolved(&self) -> Option<String> {
        match &self.0.borrow().state {
            ScalarState::Resolved(text) => Some(text.clone()),
            ScalarState::Pending { .. } => None,
        }
    }

    /// Unexpanded template while pending
    pub fn template(&self) -> Option<String> {
        match &self.0.borrow().state {
            ScalarState::Pending { template, .. } => Some(template.clone()),
            ScalarState::Resolved(_) => None,
        }
    }

    /// Deferred attempts that failed so far
    pub fn failed_attempts(&self) -> u32 {
        self.0.borrow().failed_attempts
    }

    /// Back-fill the final text. A resolved cell is never overwritten.
    pub(crate) fn resolve(&self, text: String) {
        let mut cell = self.0.borrow_mut();
        debug_assert!(
            matches!(cell.state, ScalarState::Pending { .. }),
            "lazy scalar resolved twice"
        );
        if let ScalarState::Pending { .. } = cell.state {
            cell.state = ScalarState::Resolved(text);
        }
    }

    /// Count a failed attempt and return the retries left
    pub(crate) fn record_failure(&self) -> u32 {
        let mut cell = self.0.borrow_mut();
        cell.failed_attempts += 1;
        match &mut cell.state {
            ScalarState::Pending { retries_left, .. } => {
                *retries_left = retries_left.saturating_sub(1);
                *retries_left
            }
            ScalarState::Resolved(_) => 0,
        }
    }

    /// Give up: the scalar keeps its unexpanded template as final text
    pub(crate) fn freeze(&self) {
        if let Some(template) = self.template() {
            self.0.borrow_mut().state = ScalarState::Resolved(template);
        }
    }
}

impl fmt::Debug for LazyScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.borrow().state {
            ScalarState::Pending { template, .. } => write!(f, "<pending {:?}>", template),
            ScalarState::Resolved(text) => write!(f, "{:?}", text),
        }
    }
}
