//! Numeric id spaces for nodes and edges.
//!
//! Ids arrive over the wire as whatever the last writer stored: numbers,
//! numeric strings, occasionally nothing at all. Parsing is lenient (anything
//! unusable becomes 0) so one malformed record can never reject a whole
//! document payload. Allocation scans the surviving values and hands out
//! max + 1.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};

use crate::document::{Edge, Node};

/// Identifier for a node within one document.
///
/// Unique per document, allocated monotonically. An id freed by deletion is
/// never handed out again. Zero marks an id that failed to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Identifier for an edge within one document.
///
/// Same allocation discipline as [`NodeId`], in a separate id space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u64);

macro_rules! id_impls {
    ($name:ident) => {
        impl $name {
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        // Serialize as a plain number; position-map keys stringify through
        // the JSON map-key path automatically.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_u64(self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                d.deserialize_any(LenientIdVisitor).map(Self)
            }
        }
    };
}

id_impls!(NodeId);
id_impls!(EdgeId);

/// Accepts integers, integer-valued floats, and numeric strings. Everything
/// else (null, negatives, fractions, junk text) collapses to 0.
struct LenientIdVisitor;

impl<'de> Visitor<'de> for LenientIdVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("an integer id, a numeric string, or null")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        Ok(u64::try_from(v).unwrap_or(0))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
            Ok(v as u64)
        } else {
            Ok(0)
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        Ok(v.trim().parse().unwrap_or(0))
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<u64, E> {
        Ok(0)
    }

    fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
        Ok(0)
    }

    fn visit_none<E: de::Error>(self) -> Result<u64, E> {
        Ok(0)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<u64, D::Error> {
        d.deserialize_any(LenientIdVisitor)
    }
}

/// Next free id for a bulk-loaded collection: max + 1, or 1 when empty.
///
/// Ids that failed to parse sit at 0 and never win the max, so a collection
/// of only-junk ids also allocates 1. A record already carrying `u64::MAX`
/// pins allocation there instead of wrapping. Re-run this after every
/// wholesale replacement of a collection.
pub fn next_id<I>(ids: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    ids.into_iter().max().map_or(1, |max| max.saturating_add(1))
}

/// Next free node id for `nodes`.
pub fn next_node_id(nodes: &[Node]) -> NodeId {
    NodeId(next_id(nodes.iter().map(|n| n.id.as_u64())))
}

/// Next free edge id for `edges`.
pub fn next_edge_id(edges: &[Edge]) -> EdgeId {
    EdgeId(next_id(edges.iter().map(|e| e.id.as_u64())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id_empty_is_one() {
        assert_eq!(next_id([]), 1);
    }

    #[test]
    fn test_next_id_is_max_plus_one() {
        assert_eq!(next_id([3, 7, 2]), 8);
    }

    #[test]
    fn test_next_id_ignores_order() {
        assert_eq!(next_id([9, 1, 5]), 10);
        assert_eq!(next_id([1, 5, 9]), 10);
    }

    #[test]
    fn test_next_id_all_invalid_is_one() {
        // Unparseable ids land at 0, so only-junk collections allocate 1.
        assert_eq!(next_id([0, 0, 0]), 1);
    }

    #[test]
    fn test_next_id_saturates_at_ceiling() {
        assert_eq!(next_id([u64::MAX]), u64::MAX);
        assert_eq!(next_id([3, u64::MAX, 7]), u64::MAX);
    }

    #[test]
    fn test_deserialize_number() {
        let id: NodeId = serde_json::from_str("42").unwrap();
        assert_eq!(id, NodeId::from(42));
    }

    #[test]
    fn test_deserialize_numeric_string() {
        let id: NodeId = serde_json::from_str("\"17\"").unwrap();
        assert_eq!(id.as_u64(), 17);
    }

    #[test]
    fn test_deserialize_padded_numeric_string() {
        let id: NodeId = serde_json::from_str("\" 8 \"").unwrap();
        assert_eq!(id.as_u64(), 8);
    }

    #[test]
    fn test_deserialize_junk_is_zero() {
        for junk in ["\"banana\"", "null", "-3", "2.5", "true", "\"\""] {
            let id: NodeId = serde_json::from_str(junk).unwrap();
            assert_eq!(id.as_u64(), 0, "expected {junk} to parse as 0");
        }
    }

    #[test]
    fn test_deserialize_integer_float() {
        let id: EdgeId = serde_json::from_str("6.0").unwrap();
        assert_eq!(id.as_u64(), 6);
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&NodeId::from(9)).unwrap();
        assert_eq!(json, "9");
    }

    #[test]
    fn test_map_key_roundtrip() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(NodeId::from(5), "five");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"5":"five"}"#);
        let back: HashMap<NodeId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&NodeId::from(5)).map(String::as_str), Some("five"));
    }

    #[test]
    fn test_next_node_id_over_mixed_records() {
        // Records with missing or junk ids count as 0.
        let nodes: Vec<Node> = serde_json::from_str(
            r#"[{"id": 3}, {"id": "7"}, {"title": "no id"}, {"id": "x"}]"#,
        )
        .unwrap();
        assert_eq!(next_node_id(&nodes), NodeId::from(8));
    }

    #[test]
    fn test_next_node_id_at_ceiling_does_not_wrap() {
        // The lenient parser accepts u64::MAX as a legal wire id.
        let nodes: Vec<Node> =
            serde_json::from_str(r#"[{"id": 18446744073709551615}]"#).unwrap();
        assert_eq!(next_node_id(&nodes), NodeId::from(u64::MAX));
    }

    #[test]
    fn test_next_edge_id_empty() {
        assert_eq!(next_edge_id(&[]), EdgeId::from(1));
    }
}
