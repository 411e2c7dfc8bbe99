//! YAML text to raw node tree
//!
//! `serde_yaml::Value` rejects duplicate mapping keys, and the loader needs
//! tags (`!include`, `!script`) before any interpretation, so documents are
//! read through a custom visitor into [`RawNode`]. A repeated key replaces the
//! earlier value at the earlier position.

use std::fmt;

use serde::de::{self, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::Deserialize;
use serde_yaml::Number;
use tracing::warn;

use crate::error::LoadError;

/// Document tree as written, before any expansion
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawNode {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<RawNode>),
    Mapping(Vec<(RawNode, RawNode)>),
    /// Tag name without the leading `!`
    Tagged(String, Box<RawNode>),
}

impl RawNode {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            RawNode::Null => "null",
            RawNode::Bool(_) => "boolean",
            RawNode::Number(_) => "number",
            RawNode::String(_) => "string",
            RawNode::Sequence(_) => "sequence",
            RawNode::Mapping(_) => "mapping",
            RawNode::Tagged(..) => "tagged node",
        }
    }
}

/// Parse one YAML document. `name` only labels errors.
pub(crate) fn parse_document(text: &str, name: &str) -> Result<RawNode, LoadError> {
    if text.trim().is_empty() {
        return Ok(RawNode::Null);
    }
    serde_yaml::from_str(text).map_err(|source| LoadError::Yaml {
        name: name.to_string(),
        source,
    })
}

impl<'de> Deserialize<'de> for RawNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RawNodeVisitor)
    }
}

struct RawNodeVisitor;

impl<'de> Visitor<'de> for RawNodeVisitor {
    type Value = RawNode;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any YAML value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<RawNode, E> {
        Ok(RawNode::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<RawNode, E> {
        Ok(RawNode::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<RawNode, E> {
        Ok(RawNode::Number(v.into()))
    }

    fn visit_f64<E>(self, v: f64) -> Result<RawNode, E> {
        Ok(RawNode::Number(v.into()))
    }

    fn visit_str<E>(self, v: &str) -> Result<RawNode, E> {
        Ok(RawNode::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<RawNode, E> {
        Ok(RawNode::String(v))
    }

    fn visit_unit<E>(self) -> Result<RawNode, E> {
        Ok(RawNode::Null)
    }

    fn visit_none<E>(self) -> Result<RawNode, E> {
        Ok(RawNode::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<RawNode, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawNode::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<RawNode, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(RawNode::Sequence(items))
    }

    fn visit_map<M>(self, mut map: M) -> Result<RawNode, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut entries: Vec<(RawNode, RawNode)> = Vec::new();
        while let Some((key, value)) = map.next_entry::<RawNode, RawNode>()? {
            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => {
                    warn!("duplicate mapping key {:?}, keeping the last value", key);
                    slot.1 = value;
                }
                None => entries.push((key, value)),
            }
        }
        Ok(RawNode::Mapping(entries))
    }

    fn visit_enum<A>(self, data: A) -> Result<RawNode, A::Error>
    where
        A: EnumAccess<'de>,
    {
        let (tag, variant): (String, A::Variant) = data.variant()?;
        let value: RawNode = variant.newtype_variant()?;
        let tag = tag.trim_start_matches('!').to_string();
        if tag.is_empty() {
            return Err(de::Error::custom("empty tag"));
        }
        Ok(RawNode::Tagged(tag, Box::new(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> RawNode {
        RawNode::String(text.to_string())
    }

    #[test]
    fn parses_plain_structure() {
        let raw = parse_document("a: 1\nb: [x, true]\nc: ~\n", "t").unwrap();
        assert_eq!(
            raw,
            RawNode::Mapping(vec![
                (s("a"), RawNode::Number(1.into())),
                (s("b"), RawNode::Sequence(vec![s("x"), RawNode::Bool(true)])),
                (s("c"), RawNode::Null),
            ])
        );
    }

    #[test]
    fn keeps_custom_tags() {
        let raw = parse_document("inc: !include other.yml a=b\n", "t").unwrap();
        assert_eq!(
            raw,
            RawNode::Mapping(vec![(
                s("inc"),
                RawNode::Tagged("include".into(), Box::new(s("other.yml a=b")))
            )])
        );
    }

    #[test]
    fn keeps_tagged_mappings() {
        let raw = parse_document("inc: !include {'=': x.yml, k: v}\n", "t").unwrap();
        let RawNode::Mapping(entries) = raw else {
            panic!("expected mapping");
        };
        let RawNode::Tagged(tag, inner) = &entries[0].1 else {
            panic!("expected tagged node");
        };
        assert_eq!(tag, "include");
        assert_eq!(
            **inner,
            RawNode::Mapping(vec![(s("="), s("x.yml")), (s("k"), s("v"))])
        );
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let raw = parse_document("a: 1\nb: 2\na: 3\n", "t").unwrap();
        assert_eq!(
            raw,
            RawNode::Mapping(vec![
                (s("a"), RawNode::Number(3.into())),
                (s("b"), RawNode::Number(2.into())),
            ])
        );
    }

    #[test]
    fn empty_document_is_null() {
        assert_eq!(parse_document("", "t").unwrap(), RawNode::Null);
        assert_eq!(parse_document("  \n", "t").unwrap(), RawNode::Null);
    }

    #[test]
    fn syntax_error_names_the_document() {
        let err = parse_document("a: [1, 2\n", "broken.yml").unwrap_err();
        assert!(matches!(err, LoadError::Yaml { ref name, .. } if name == "broken.yml"));
    }
}
