//! Tags and the tag model.
//!
//! Callers hand tags in as an ordered list of [`Tag`] pairs. Records keep
//! them as a [`TagMap`], where a value that parses entirely as a base-10
//! integer is stored as an integer so that sorting on the tag is numeric.
//!
//! Converting back renders integers in their canonical decimal form, so the
//! round trip is lossy for numeric-looking strings: `"007"` comes back as
//! `"7"` and `"+5"` as `"5"`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TypeError, TypeResult};

/// Reserved separator between a tag name and a tag value in query
/// expressions. Neither names nor values may contain it.
pub const TAG_SEPARATOR: char = ':';

/// Field path separator of the document model. Tag names may not contain it.
pub const PATH_SEPARATOR: char = '.';

/// A name/value annotation on a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    /// Create a tag with a name and a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create a tag that carries only a name (empty value).
    pub fn name_only(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }
}

/// The stored form of a tag value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TagValue {
    Integer(i64),
    Text(String),
}

impl TagValue {
    /// Coerce a raw tag value: integers become [`TagValue::Integer`],
    /// everything else is kept verbatim as [`TagValue::Text`].
    pub fn coerce(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => Self::Integer(n),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    /// JSON representation used inside stored documents and filters.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Read a tag value back from its JSON representation.
    ///
    /// Returns `None` for JSON types a tag can never hold.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Text(n.to_string()),
            }),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TagValue {
    fn from(raw: &str) -> Self {
        Self::coerce(raw)
    }
}

/// Unordered tag name → stored value mapping.
pub type TagMap = BTreeMap<String, TagValue>;

/// Convert an ordered tag list into a [`TagMap`]. A later tag with the same
/// name overwrites an earlier one.
pub fn tags_to_map(tags: &[Tag]) -> TagMap {
    tags.iter()
        .map(|tag| (tag.name.clone(), TagValue::coerce(&tag.value)))
        .collect()
}

/// Convert a [`TagMap`] back into the public tag list.
pub fn map_to_tags(map: &TagMap) -> Vec<Tag> {
    map.iter()
        .map(|(name, value)| Tag::new(name.clone(), value.to_string()))
        .collect()
}

/// Reject tag names containing the reserved separator, or a field path
/// separator that would make the tag unreachable by queries and indexes.
pub fn validate_tag_name(name: &str) -> TypeResult<()> {
    if name.contains(TAG_SEPARATOR) {
        return Err(TypeError::InvalidTagName(name.to_string()));
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(TypeError::DottedTagName(name.to_string()));
    }
    Ok(())
}

/// Reject tag values containing the reserved separator.
pub fn validate_tag_value(value: &str) -> TypeResult<()> {
    if value.contains(TAG_SEPARATOR) {
        return Err(TypeError::InvalidTagValue(value.to_string()));
    }
    Ok(())
}

/// Validate both halves of a tag.
pub fn validate_tag(tag: &Tag) -> TypeResult<()> {
    validate_tag_name(&tag.name)?;
    validate_tag_value(&tag.value)
}
