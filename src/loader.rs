//! Document loader
//!
//! A [`Loader`] builds one document against one [`Scope`]. The root loader
//! is created from the seed variables; every `!include` and `!script` spawns
//! a child loader whose scope chains to the spawning loader's scope.
//!
//! Building a document is two-phase:
//! 1. Construct the tree. Scalars are expanded immediately when possible;
//!    otherwise they become pending lazy scalars with a retry step queued.
//! 2. Drain the queue to a fixpoint. At the start of every pass the root
//!    looks for its document's top-level `variables` mapping and installs
//!    it in its scope, because variables may be defined after the place
//!    they are used. A child never installs variables: when its document
//!    has a `variables` mapping it drops a rescan marker on the root queue.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, instrument, warn};

use crate::directive;
use crate::error::LoadError;
use crate::node::{LazyScalar, Mapping, Node, Scalar, TaggedNode};
use crate::options::LoadOptions;
use crate::parse::{parse_document, RawNode};
use crate::queue::{DeferredQueue, Retry, Step};
use crate::scope::{Bindings, Scope, VariableTable};
use crate::template::{interpolate, TemplateError};

/// Key of the top-level mapping that defines document variables
pub const VARIABLES_KEY: &str = "variables";

pub struct Loader {
    /// Document name (file path or script label)
    name: Rc<str>,
    /// Directory relative includes are resolved against
    base_dir: PathBuf,
    scope: Rc<Scope>,
    queue: DeferredQueue,
    /// The root loader's queue; `None` on the root itself
    root_queue: Option<DeferredQueue>,
    options: Rc<LoadOptions>,
}

impl Loader {
    /// Root loader seeded with `variables` as scope defaults
    pub fn from_variables(
        variables: Bindings,
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        options: LoadOptions,
    ) -> Self {
        Self {
            name: Rc::from(name.into()),
            base_dir: base_dir.into(),
            scope: Scope::root(variables),
            queue: DeferredQueue::default(),
            root_queue: None,
            options: Rc::new(options),
        }
    }

    /// Loader for a document spawned by a directive of this loader
    pub(crate) fn child(&self, overrides: Bindings, name: impl Into<String>, base_dir: PathBuf) -> Self {
        let root_queue = self
            .root_queue
            .clone()
            .unwrap_or_else(|| self.queue.clone());
        Self {
            name: Rc::from(name.into()),
            base_dir,
            scope: Scope::child(&self.scope, overrides),
            queue: DeferredQueue::default(),
            root_queue: Some(root_queue),
            options: Rc::clone(&self.options),
        }
    }

    pub fn is_root(&self) -> bool {
        self.root_queue.is_none()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Parse `text` and build the document, deferred templates included.
    ///
    /// On a child loader, templates still pending after its own drain stay
    /// queued on the root and resolve when the root drains.
    pub fn load_str(&self, text: &str) -> Result<Node, LoadError> {
        let raw = parse_document(text, &self.name)?;
        self.load_raw(raw)
    }

    #[instrument(skip(self, raw), fields(name = %self.name, root = self.is_root()))]
    pub(crate) fn load_raw(&self, raw: RawNode) -> Result<Node, LoadError> {
        let tree = self.construct(raw)?;
        debug!("built {}, {} deferred steps", self.name, self.queue.len());
        self.drain(&tree)?;
        Ok(tree)
    }

    fn drain(&self, tree: &Node) -> Result<(), LoadError> {
        let requeue = self.root_queue.as_ref().unwrap_or(&self.queue);
        self.queue
            .drain(requeue, &self.options, &self.name, || self.scan(tree))
    }

    /// Look for this document's `variables` mapping
    fn scan(&self, tree: &Node) {
        let Some(variables) = tree.get(VARIABLES_KEY) else {
            return;
        };

        let Some(root_queue) = &self.root_queue else {
            if self.scope.has_document_variables() {
                return;
            }
            let table = match variables.as_mapping() {
                Some(mapping) => {
                    debug!("found the root variables mapping in {}", self.name);
                    VariableTable::from_mapping(mapping)
                }
                None => {
                    warn!("'{}' in {} is not a mapping, ignoring it", VARIABLES_KEY, self.name);
                    VariableTable::default()
                }
            };
            self.scope.set_document_variables(table);
            return;
        };

        debug!("found a candidate variables mapping in {}", self.name);
        root_queue.push(Step::Rescan);
    }

    fn construct(&self, raw: RawNode) -> Result<Node, LoadError> {
        let node = match raw {
            RawNode::Null => Node::Null,
            RawNode::Bool(b) => Node::Bool(b),
            RawNode::Number(n) => Node::Number(n),
            RawNode::String(text) => Node::String(self.construct_scalar(text)?),
            RawNode::Sequence(items) => Node::Sequence(
                items
                    .into_iter()
                    .map(|item| self.construct(item))
                    .collect::<Result<_, _>>()?,
            ),
            RawNode::Mapping(entries) => {
                let mut mapping = Mapping::new();
                for (key, value) in entries {
                    let key = self.construct(key)?;
                    let value = self.construct(value)?;
                    mapping.insert(key, value);
                }
                Node::Mapping(mapping)
            }
            RawNode::Tagged(tag, value) => self.construct_tagged(tag, *value)?,
        };
        Ok(node)
    }

    /// Directives are replaced by the document they produce
    fn construct_tagged(&self, tag: String, value: RawNode) -> Result<Node, LoadError> {
        if tag == directive::INCLUDE_TAG {
            return directive::include(self, value);
        }
        if tag == directive::SCRIPT_TAG {
            return directive::script(self, value);
        }
        let value = self.construct(value)?;
        Ok(Node::Tagged(Box::new(TaggedNode { tag, value })))
    }

    /// Expand a string scalar now, or defer it
    fn construct_scalar(&self, text: String) -> Result<Scalar, LoadError> {
        if !self.options.expand {
            return Ok(Scalar::Literal(text));
        }

        match interpolate(&text, self.scope.as_ref(), None) {
            Ok(expanded) => Ok(Scalar::Literal(expanded)),
            Err(TemplateError::Unresolved { name, .. }) if self.options.max_retries == 0 => {
                if self.options.strict {
                    return Err(LoadError::TemplateExhausted {
                        template: text,
                        missing: name,
                        name: self.name.to_string(),
                    });
                }
                warn!("cannot expand template '{}' in {}", text, self.name);
                Ok(Scalar::Literal(text))
            }
            Err(TemplateError::Unresolved { name, .. }) => {
                debug!("deferring {} in {} ('{}' unknown)", text, self.name, name);
                let lazy = LazyScalar::pending(text, self.options.max_retries);
                self.queue.push(Step::Retry(Retry {
                    lazy: lazy.clone(),
                    scope: Rc::clone(&self.scope),
                    source: Rc::clone(&self.name),
                }));
                Ok(Scalar::Deferred(lazy))
            }
            Err(TemplateError::InvalidPlaceholder { position, template }) => {
                Err(LoadError::InvalidPlaceholder {
                    template,
                    position,
                    name: self.name.to_string(),
                })
            }
        }
    }

    /// Expand a directive argument in a single attempt.
    ///
    /// Directives are not deferred: the type of their result is unknown
    /// until they run, so an unknown name fails the load right away.
    pub(crate) fn expand_now(&self, directive: &'static str, text: &str) -> Result<String, LoadError> {
        if !self.options.expand {
            return Ok(text.to_string());
        }
        interpolate(text, self.scope.as_ref(), None).map_err(|e| match e {
            TemplateError::Unresolved { name, template } => LoadError::DirectiveUnresolved {
                directive,
                template,
                missing: name,
                name: self.name.to_string(),
            },
            TemplateError::InvalidPlaceholder { position, template } => {
                LoadError::InvalidPlaceholder {
                    template,
                    position,
                    name: self.name.to_string(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ScalarState;

    fn root(vars: &[(&str, &str)]) -> Loader {
        root_with(vars, LoadOptions::default())
    }

    fn root_with(vars: &[(&str, &str)], options: LoadOptions) -> Loader {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Loader::from_variables(vars, "root.yml", "/nonexistent", options)
    }

    fn text_at(tree: &Node, key: &str) -> Option<String> {
        tree.get(key).and_then(Node::text)
    }

    #[test]
    fn expands_known_names_immediately() {
        let loader = root(&[("ARCH", "amd64")]);
        let tree = loader.load_str("arch: $ARCH\nplain: text\n").unwrap();
        assert_eq!(tree.get("arch").and_then(Node::as_str), Some("amd64"));
        assert_eq!(tree.get("plain").and_then(Node::as_str), Some("text"));
        assert!(loader.queue.is_empty());
    }

    #[test]
    fn forward_reference_to_variables() {
        let loader = root(&[]);
        let tree = loader
            .load_str("a: $b\nvariables:\n  b: X\n")
            .unwrap();
        assert_eq!(text_at(&tree, "a").as_deref(), Some("X"));
    }

    #[test]
    fn variables_may_reference_each_other() {
        let loader = root(&[]);
        let tree = loader
            .load_str("out: $first\nvariables:\n  first: ${second}-1\n  second: ${third}-2\n  third: base\n")
            .unwrap();
        assert_eq!(text_at(&tree, "out").as_deref(), Some("base-2-1"));
    }

    #[test]
    fn document_variables_beat_seed_variables_once_discovered() {
        let loader = root(&[("name", "env")]);
        let tree = loader
            .load_str("early: $name\nlate: ${x}-${name}\nvariables:\n  x: 1\n  name: doc\n")
            .unwrap();
        // early expands while the tree is built, before variables are discovered
        assert_eq!(text_at(&tree, "early").as_deref(), Some("env"));
        assert_eq!(text_at(&tree, "late").as_deref(), Some("1-doc"));
    }

    #[test]
    fn undefined_name_fails_after_exactly_max_retries() {
        let loader = root(&[]);
        let raw = parse_document("a: $undefined\n", "root.yml").unwrap();
        let tree = loader.construct(raw).unwrap();
        let lazy = match tree.get("a") {
            Some(Node::String(Scalar::Deferred(lazy))) => lazy.clone(),
            other => panic!("expected a deferred scalar, got {other:?}"),
        };

        let err = loader.drain(&tree).unwrap_err();
        assert!(matches!(err, LoadError::TemplateExhausted { ref missing, .. } if missing == "undefined"));
        assert_eq!(lazy.failed_attempts(), 5);
    }

    #[test]
    fn zero_retry_budget_never_defers() {
        let loader = root_with(&[], LoadOptions::default().with_max_retries(0));
        let raw = parse_document("a: $undefined\n", "root.yml").unwrap();
        let err = loader.construct(raw).unwrap_err();
        assert!(matches!(err, LoadError::TemplateExhausted { ref missing, .. } if missing == "undefined"));
        assert!(loader.queue.is_empty());

        let lenient = root_with(&[], LoadOptions::lenient().with_max_retries(0));
        let tree = lenient.load_str("a: $undefined\nb: $late\nvariables:\n  late: x\n").unwrap();
        assert_eq!(tree.get("a").and_then(Node::as_str), Some("$undefined"));
        assert_eq!(tree.get("b").and_then(Node::as_str), Some("$late"));
        assert!(lenient.queue.is_empty());
    }

    #[test]
    fn eager_expansion_uses_seed_even_when_variables_come_first() {
        let loader = root(&[("name", "param")]);
        let tree = loader.load_str("variables:\n  name: doc\nearly: $name\n").unwrap();
        assert_eq!(text_at(&tree, "early").as_deref(), Some("param"));
    }

    #[test]
    fn lenient_mode_keeps_template() {
        let loader = root_with(&[], LoadOptions::lenient());
        let tree = loader.load_str("a: pre-${undefined}\n").unwrap();
        match tree.get("a") {
            Some(Node::String(Scalar::Deferred(lazy))) => {
                assert_eq!(lazy.state(), ScalarState::Resolved("pre-${undefined}".into()));
                assert_eq!(lazy.failed_attempts(), 5);
            }
            other => panic!("expected a deferred scalar, got {other:?}"),
        }
    }

    #[test]
    fn literal_mode_skips_expansion() {
        let loader = root_with(&[("x", "1")], LoadOptions::literal());
        let tree = loader.load_str("a: $x\nb: $$ ${nope}\n").unwrap();
        assert_eq!(tree.get("a").and_then(Node::as_str), Some("$x"));
        assert_eq!(tree.get("b").and_then(Node::as_str), Some("$$ ${nope}"));
    }

    #[test]
    fn invalid_placeholder_is_fatal() {
        let loader = root(&[]);
        let err = loader.load_str("price: $5\n").unwrap_err();
        assert!(matches!(err, LoadError::InvalidPlaceholder { position: 0, .. }));
    }

    #[test]
    fn keys_are_expanded_too() {
        let loader = root(&[("k", "name")]);
        let tree = loader.load_str("$k: v\n").unwrap();
        assert_eq!(tree.get("name").and_then(Node::as_str), Some("v"));
    }

    #[test]
    fn non_mapping_variables_are_ignored() {
        let loader = root_with(&[], LoadOptions::lenient());
        let tree = loader.load_str("variables: [a, b]\nx: $a\n").unwrap();
        assert_eq!(text_at(&tree, "x").as_deref(), Some("$a"));
    }

    #[test]
    fn unknown_tags_are_kept() {
        let loader = root(&[("v", "1")]);
        let tree = loader.load_str("a: !custom $v\n").unwrap();
        match tree.get("a") {
            Some(Node::Tagged(tagged)) => {
                assert_eq!(tagged.tag, "custom");
                assert_eq!(tagged.value.as_str(), Some("1"));
            }
            other => panic!("expected a tagged node, got {other:?}"),
        }
    }

    #[test]
    fn child_defers_to_root_queue() {
        let root = root(&[]);
        let child = root.child(Bindings::new(), "child.yml", PathBuf::from("/nonexistent"));
        assert!(!child.is_root());

        let tree = child.load_str("a: $later\n").unwrap();
        assert!(child.queue.is_empty());
        assert_eq!(root.queue.len(), 1);
        assert_eq!(text_at(&tree, "a"), None);
    }

    #[test]
    fn child_with_variables_requests_root_rescan() {
        let root = root(&[]);
        let child = root.child(Bindings::new(), "child.yml", PathBuf::from("/nonexistent"));
        child.load_str("variables:\n  a: 1\nb: $zzz\n").unwrap();

        let steps = root.queue.take();
        assert!(steps.iter().any(|s| matches!(s, Step::Rescan)));
        assert!(!child.scope().has_document_variables());
    }

    #[test]
    fn expand_now_does_not_defer() {
        let loader = root(&[]);
        let err = loader.expand_now("script", "echo $nope").unwrap_err();
        assert!(matches!(err, LoadError::DirectiveUnresolved { directive: "script", .. }));
        assert!(loader.queue.is_empty());
    }
}
