//! Variable scopes
//!
//! Every loader owns one [`Scope`]. Scopes chain to the scope of the loader
//! that spawned them and read through it; nothing ever writes into an
//! ancestor. The only mutable part is the document-variables slot, set once
//! by the root loader when its document's `variables` mapping shows up.

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::node::{Mapping, Node};
use crate::template::Lookup;

/// Name → text bindings (environment, caller parameters, include overrides)
pub type Bindings = HashMap<String, String>;

/// Reserved binding holding the absolute directory of the loaded file
pub const DIR_VARIABLE: &str = "__DIR__";

/// Live view of a document's `variables` mapping.
///
/// The table shares cells with the tree, so an entry becomes visible as soon
/// as its key and value are resolved.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    entries: Vec<(Node, Node)>,
}

impl VariableTable {
    pub fn from_mapping(mapping: &Mapping) -> Self {
        Self {
            entries: mapping.iter().cloned().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key.text().as_deref() == Some(name))
            .and_then(|(_, value)| value.text())
    }
}

/// Chainable table of name → text bindings
#[derive(Debug, Default)]
pub struct Scope {
    /// Lowest priority: environment, `__DIR__` and caller parameters (root only)
    defaults: Bindings,
    /// Inline `name=value` assignments of the include that opened this scope
    overrides: Bindings,
    /// The document's `variables` mapping, once discovered
    document_variables: OnceCell<VariableTable>,
    parent: Option<Rc<Scope>>,
    root: Option<Rc<Scope>>,
}

impl Scope {
    /// Scope of a root loader
    pub fn root(defaults: Bindings) -> Rc<Self> {
        Rc::new(Self {
            defaults,
            ..Self::default()
        })
    }

    /// Scope of an include or script loader spawned under `parent`
    pub fn child(parent: &Rc<Scope>, overrides: Bindings) -> Rc<Self> {
        let root = parent.root.clone().unwrap_or_else(|| Rc::clone(parent));
        Rc::new(Self {
            overrides,
            parent: Some(Rc::clone(parent)),
            root: Some(root),
            ..Self::default()
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Resolve `name`: own overrides, own document variables, the parent
    /// chain, the root's document variables, then defaults.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.document_variables.get().and_then(|t| t.get(name)) {
            return Some(value);
        }
        if let Some(value) = self.parent.as_ref().and_then(|p| p.resolve(name)) {
            return Some(value);
        }
        if let Some(value) = self
            .root
            .as_ref()
            .and_then(|r| r.document_variables.get())
            .and_then(|t| t.get(name))
        {
            return Some(value);
        }
        self.defaults.get(name).cloned()
    }

    pub fn has_document_variables(&self) -> bool {
        self.document_variables.get().is_some()
    }

    /// Install the document variables. Returns false if they were already set.
    pub(crate) fn set_document_variables(&self, table: VariableTable) -> bool {
        self.document_variables.set(table).is_ok()
    }
}

impl Lookup for Scope {
    fn lookup(&self, name: &str) -> Option<String> {
        self.resolve(name)
    }
}
