//! Records and their document layout.
//!
//! A record is stored as one document:
//!
//! ```text
//! { "_id": key, "doc" | "str" | "bin": value, "tags": { name: value, ... } }
//! ```
//!
//! Exactly one of `doc`, `str` or `bin` is present. Binary values are
//! hex-encoded. The `tags` object is omitted when a record has no tags.

use serde_json::{Map, Value};

use crate::error::{TypeError, TypeResult};
use crate::tag::{map_to_tags, tags_to_map, Tag, TagMap, TagValue};
use crate::value::StoredValue;

const ID_FIELD: &str = "_id";
const DOC_FIELD: &str = "doc";
const STR_FIELD: &str = "str";
const BIN_FIELD: &str = "bin";
const TAGS_FIELD: &str = "tags";

/// Field path of tag `name` inside a stored document.
pub fn tag_path(name: &str) -> String {
    format!("{TAGS_FIELD}.{name}")
}

/// The unit of storage: a key, a value in one of its shapes, and tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: StoredValue,
    pub tags: TagMap,
}

impl Record {
    /// Build a record from raw caller input.
    pub fn new(key: impl Into<String>, raw_value: &[u8], tags: &[Tag]) -> Self {
        Self {
            key: key.into(),
            value: StoredValue::encode(raw_value),
            tags: tags_to_map(tags),
        }
    }

    /// The raw value bytes.
    pub fn raw_value(&self) -> TypeResult<Vec<u8>> {
        self.value.decode()
    }

    /// The tags in their public form.
    pub fn tag_list(&self) -> Vec<Tag> {
        map_to_tags(&self.tags)
    }

    /// Lay the record out as a document.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut document = Map::new();
        document.insert(ID_FIELD.into(), Value::String(self.key.clone()));
        let (field, value) = match &self.value {
            StoredValue::Structured(object) => (DOC_FIELD, Value::Object(object.clone())),
            StoredValue::Text(text) => (STR_FIELD, Value::String(text.clone())),
            StoredValue::Binary(bytes) => (BIN_FIELD, Value::String(hex::encode(bytes))),
        };
        document.insert(field.into(), value);
        if !self.tags.is_empty() {
            let tags = self
                .tags
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            document.insert(TAGS_FIELD.into(), Value::Object(tags));
        }
        document
    }

    /// Read a record back from a stored document.
    pub fn from_document(document: &Map<String, Value>) -> TypeResult<Self> {
        let key = match document.get(ID_FIELD) {
            Some(Value::String(key)) => key.clone(),
            Some(other) => return Err(corrupt("<unknown>", format!("non-string _id {other}"))),
            None => return Err(corrupt("<unknown>", "missing _id")),
        };

        let shapes: Vec<&str> = [DOC_FIELD, STR_FIELD, BIN_FIELD]
            .into_iter()
            .filter(|field| document.contains_key(*field))
            .collect();
        let value = match (shapes.as_slice(), shapes.first().and_then(|f| document.get(*f))) {
            ([DOC_FIELD], Some(Value::Object(object))) => StoredValue::Structured(object.clone()),
            ([STR_FIELD], Some(Value::String(text))) => StoredValue::Text(text.clone()),
            ([BIN_FIELD], Some(Value::String(encoded))) => StoredValue::Binary(
                hex::decode(encoded)
                    .map_err(|e| corrupt(&key, format!("binary value is not hex: {e}")))?,
            ),
            ([], _) => return Err(corrupt(&key, "no value field")),
            ([_], _) => return Err(corrupt(&key, "value field has unexpected type")),
            _ => return Err(corrupt(&key, format!("multiple value fields: {shapes:?}"))),
        };

        let tags = match document.get(TAGS_FIELD) {
            None | Some(Value::Null) => TagMap::new(),
            Some(Value::Object(raw)) => raw
                .iter()
                .map(|(name, raw_value)| {
                    TagValue::from_json(raw_value)
                        .map(|v| (name.clone(), v))
                        .ok_or_else(|| corrupt(&key, format!("tag {name} has unexpected type")))
                })
                .collect::<TypeResult<TagMap>>()?,
            Some(_) => return Err(corrupt(&key, "tags field is not an object")),
        };

        Ok(Self { key, value, tags })
    }
}

fn corrupt(key: &str, reason: impl Into<String>) -> TypeError {
    TypeError::CorruptRecord {
        key: key.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn document_layout_per_shape() {
        let structured = Record::new("a", br#"{"x":1}"#, &[Tag::new("age", "30")]);
        assert_eq!(
            structured.to_document(),
            doc(json!({"_id": "a", "doc": {"x": 1}, "tags": {"age": 30}}))
        );

        let text = Record::new("b", br#""hi""#, &[]);
        assert_eq!(text.to_document(), doc(json!({"_id": "b", "str": "hi"})));

        let binary = Record::new("c", &[0xde, 0xad], &[]);
        assert_eq!(binary.to_document(), doc(json!({"_id": "c", "bin": "dead"})));
    }

    #[test]
    fn documents_read_back() {
        for record in [
            Record::new("a", br#"{"x":[1,2]}"#, &[Tag::new("t", "v"), Tag::new("n", "5")]),
            Record::new("b", br#""text""#, &[]),
            Record::new("c", b"\x00\x01raw", &[Tag::name_only("flag")]),
            Record::new("d", b"", &[]),
        ] {
            assert_eq!(Record::from_document(&record.to_document()).unwrap(), record);
        }
    }

    #[test]
    fn missing_id_is_corrupt() {
        let err = Record::from_document(&doc(json!({"str": "x"}))).unwrap_err();
        assert!(matches!(err, TypeError::CorruptRecord { .. }));
    }

    #[test]
    fn missing_or_multiple_value_fields_are_corrupt() {
        assert!(Record::from_document(&doc(json!({"_id": "k"}))).is_err());
        assert!(Record::from_document(&doc(json!({"_id": "k", "str": "a", "bin": "00"}))).is_err());
        assert!(Record::from_document(&doc(json!({"_id": "k", "doc": "not an object"}))).is_err());
    }

    #[test]
    fn bad_hex_is_corrupt() {
        let err = Record::from_document(&doc(json!({"_id": "k", "bin": "zz"}))).unwrap_err();
        match err {
            TypeError::CorruptRecord { key, reason } => {
                assert_eq!(key, "k");
                assert!(reason.starts_with("binary value is not hex"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_tag_values_are_corrupt() {
        let raw = doc(json!({"_id": "k", "str": "a", "tags": {"t": [1]}}));
        assert!(Record::from_document(&raw).is_err());
    }
}
