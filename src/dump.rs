//! Serializer
//!
//! Renders a document tree back to YAML. Lazy scalars render as their
//! resolved text; a pending one means the tree never went through a full
//! load, which is a bug in the caller, so rendering it panics.
//!
//! Text is written as resolved: a `$` in a value (from a `$$` escape or a
//! bound value) is not escaped again. Reloading such output with expansion
//! on fails with an invalid placeholder; reload it with
//! [`LoadOptions::literal`](crate::LoadOptions::literal) instead.

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::Value;

use crate::error::LoadError;
use crate::node::{Node, Scalar};

/// Render a resolved document as YAML text
pub fn dump(node: &Node) -> Result<String, LoadError> {
    Ok(serde_yaml::to_string(&to_value(node))?)
}

/// Convert a resolved document into a `serde_yaml::Value`.
///
/// # Panics
///
/// If the tree still holds a pending lazy scalar.
pub fn to_value(node: &Node) -> Value {
    match node {
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(*b),
        Node::Number(n) => Value::Number(n.clone()),
        Node::String(scalar) => Value::String(scalar_text(scalar)),
        Node::Sequence(items) => Value::Sequence(items.iter().map(to_value).collect()),
        Node::Mapping(mapping) => {
            let mut out = serde_yaml::Mapping::with_capacity(mapping.len());
            for (key, value) in mapping.iter() {
                out.insert(to_value(key), to_value(value));
            }
            Value::Mapping(out)
        }
        Node::Tagged(tagged) => Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(tagged.tag.as_str()),
            value: to_value(&tagged.value),
        })),
    }
}

fn scalar_text(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Deferred(lazy) if scalar.is_pending() => panic!(
            "cannot serialize unresolved template '{}'",
            lazy.template().unwrap_or_default()
        ),
        _ => scalar.text().unwrap_or_default(),
    }
}

impl Node {
    /// See [`to_value`]
    pub fn to_value(&self) -> Value {
        to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{LazyScalar, Mapping, TaggedNode};

    #[test]
    fn dumps_structure() {
        let mut m = Mapping::new();
        m.insert(Node::string("name"), Node::string("onl"));
        m.insert(
            Node::string("list"),
            Node::Sequence(vec![Node::Bool(true), Node::Number(7.into()), Node::Null]),
        );
        let text = dump(&Node::Mapping(m)).unwrap();
        assert_eq!(text, "name: onl\nlist:\n- true\n- 7\n- null\n");
    }

    #[test]
    fn resolved_lazy_renders_as_text() {
        let lazy = LazyScalar::pending("$v", 5);
        lazy.resolve("done".into());
        let text = dump(&Node::String(Scalar::Deferred(lazy))).unwrap();
        assert_eq!(text, "done\n");
    }

    #[test]
    #[should_panic(expected = "unresolved template")]
    fn pending_lazy_panics() {
        let lazy = LazyScalar::pending("$v", 5);
        let _ = dump(&Node::String(Scalar::Deferred(lazy)));
    }

    #[test]
    fn tags_survive() {
        let node = Node::Tagged(Box::new(TaggedNode {
            tag: "custom".into(),
            value: Node::string("x"),
        }));
        assert_eq!(dump(&node).unwrap(), "!custom x\n");
    }
}
