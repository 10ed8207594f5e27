//! Ordered metadata maps.
//!
//! A [`MetadataDocument`] keeps its keys in insertion order so merged output
//! is deterministic, while equality ignores that order: two documents with the
//! same fields and values are the same document.

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::error::TypeError;
use crate::value::DocumentValue;

/// An ordered mapping from field name to [`DocumentValue`].
///
/// Keys are unique. Documents are small (tens to hundreds of fields), so the
/// entries live in a vector and lookups scan it.
#[derive(Clone, Debug, Default)]
pub struct MetadataDocument {
    entries: Vec<(String, DocumentValue)>,
}

impl MetadataDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&DocumentValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert a field, returning the previous value for that key.
    ///
    /// A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: DocumentValue) -> Option<DocumentValue> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Field names in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocumentValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse a JSON document. The root must be an object.
    pub fn from_json_str(input: &str) -> Result<Self, TypeError> {
        serde_json::from_str(input).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Render as JSON with two-space indentation.
    pub fn to_json_pretty(&self) -> Result<String, TypeError> {
        serde_json::to_string_pretty(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

impl PartialEq for MetadataDocument {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl Eq for MetadataDocument {}

impl FromIterator<(String, DocumentValue)> for MetadataDocument {
    fn from_iter<I: IntoIterator<Item = (String, DocumentValue)>>(iter: I) -> Self {
        let mut doc = Self::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

impl IntoIterator for MetadataDocument {
    type Item = (String, DocumentValue);
    type IntoIter = std::vec::IntoIter<(String, DocumentValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl TryFrom<serde_json::Value> for MetadataDocument {
    type Error = TypeError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::try_from(DocumentValue::from(value))
    }
}

impl TryFrom<DocumentValue> for MetadataDocument {
    type Error = TypeError;

    fn try_from(value: DocumentValue) -> Result<Self, Self::Error> {
        match value {
            DocumentValue::Map(map) => Ok(map),
            other => Err(TypeError::NotADocument {
                kind: other.kind().to_string(),
            }),
        }
    }
}

impl Serialize for MetadataDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut out = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            out.serialize_entry(key, value)?;
        }
        out.end()
    }
}

impl<'de> Deserialize<'de> for MetadataDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::try_from(DocumentValue::deserialize(deserializer)?).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> MetadataDocument {
        MetadataDocument::try_from(value).unwrap()
    }

    #[test]
    fn insert_keeps_first_position_on_replace() {
        let mut d = MetadataDocument::new();
        d.insert("a", 1i64.into());
        d.insert("b", 2i64.into());
        let previous = d.insert("a", 3i64.into());

        assert_eq!(previous, Some(DocumentValue::from(1i64)));
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(d.get("a"), Some(&DocumentValue::from(3i64)));
    }

    #[test]
    fn equality_ignores_key_order() {
        let left = MetadataDocument::from_json_str(r#"{"a": 1, "b": [1, 2]}"#).unwrap();
        let right = MetadataDocument::from_json_str(r#"{"b": [1, 2], "a": 1}"#).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn equality_respects_list_order() {
        assert_ne!(doc(json!({"a": [1, 2]})), doc(json!({"a": [2, 1]})));
    }

    #[test]
    fn differing_lengths_are_not_equal() {
        assert_ne!(doc(json!({"a": 1})), doc(json!({"a": 1, "b": null})));
    }

    #[test]
    fn root_must_be_a_map() {
        let err = MetadataDocument::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, TypeError::Serialization(msg) if msg.contains("list")));

        let err = MetadataDocument::try_from(json!("session")).unwrap_err();
        assert_eq!(err, TypeError::NotADocument { kind: "string".into() });
    }

    #[test]
    fn pretty_output_uses_document_order() {
        let d = MetadataDocument::from_json_str(r#"{"subject_id": "123", "rig_id": "fib-1"}"#).unwrap();
        let rendered = d.to_json_pretty().unwrap();
        assert_eq!(rendered, "{\n  \"subject_id\": \"123\",\n  \"rig_id\": \"fib-1\"\n}");
    }

    #[test]
    fn duplicate_json_keys_keep_the_last_value() {
        let d = MetadataDocument::from_json_str(r#"{"a": 1, "b": 2, "a": 3}"#).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get("a"), Some(&DocumentValue::from(3i64)));
    }
}
