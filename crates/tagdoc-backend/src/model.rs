//! Documents, filters, sort and index specifications.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A schemaless document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Name of the field holding a document's primary key.
pub const ID_FIELD: &str = "_id";

/// Name of the built-in primary-key index.
pub const PRIMARY_INDEX_NAME: &str = "_id_";

/// Resolve a dotted field path (`"tags.age"`) inside a document.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Equality as the database sees it: numbers compare by numeric value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Rank of a JSON type in the cross-type sort order.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting: missing < numbers < strings < objects <
/// arrays < booleans, then by value within a type.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        _ => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// A single predicate on a field path.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// The field is present, with any value.
    Exists(String),
    /// The field equals the value.
    Equals(String, Value),
    /// The field equals one of the values.
    In(String, Vec<Value>),
}

impl Condition {
    /// The field path this condition applies to.
    pub fn path(&self) -> &str {
        match self {
            Self::Exists(path) | Self::Equals(path, _) | Self::In(path, _) => path,
        }
    }

    /// Evaluate the condition against a document.
    pub fn matches(&self, document: &Document) -> bool {
        let field = lookup(document, self.path());
        match self {
            Self::Exists(_) => field.is_some(),
            Self::Equals(_, expected) => field.is_some_and(|v| values_equal(v, expected)),
            Self::In(_, candidates) => {
                field.is_some_and(|v| candidates.iter().any(|c| values_equal(v, c)))
            }
        }
    }
}

/// A conjunction of conditions. The empty filter matches every document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// A filter matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition (logical AND with the existing ones).
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Match the document with primary key `id`.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().and(Condition::Equals(ID_FIELD.into(), Value::String(id.into())))
    }

    /// Match documents whose primary key is one of `ids`.
    pub fn id_in<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = ids.into_iter().map(|id| Value::String(id.into())).collect();
        Self::new().and(Condition::In(ID_FIELD.into(), values))
    }

    /// The conditions of this filter, in insertion order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether every condition holds for `document`.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
    }
}

// ---------------------------------------------------------------------------
// Find options
// ---------------------------------------------------------------------------

/// Sort direction on a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Sort on a single field path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub path: String,
    pub direction: SortDirection,
}

/// Options for a find call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Hint for how many documents the backend fetches per round trip.
    pub batch_size: Option<u32>,
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Result ordering; backend-default ordering when absent.
    pub sort: Option<SortSpec>,
}

// ---------------------------------------------------------------------------
// Writes and indexes
// ---------------------------------------------------------------------------

/// One entry of a bulk write.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteModel {
    /// Replace the document with primary key `id`, inserting it if absent.
    Upsert { id: String, document: Document },
    /// Delete the document with primary key `id`, if present.
    Delete { id: String },
}

/// A secondary index on a single field path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub path: String,
    pub direction: SortDirection,
}

impl IndexSpec {
    /// An ascending index.
    pub fn ascending(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lookup_follows_dotted_paths() {
        let d = doc(json!({"_id": "k", "tags": {"age": 30}}));
        assert_eq!(lookup(&d, "tags.age"), Some(&json!(30)));
        assert_eq!(lookup(&d, "_id"), Some(&json!("k")));
        assert_eq!(lookup(&d, "tags.name"), None);
        assert_eq!(lookup(&d, "_id.x"), None);
    }

    #[test]
    fn filter_conditions_are_conjunctive() {
        let d = doc(json!({"tags": {"a": 1, "b": "x"}}));
        let both = Filter::new()
            .and(Condition::Equals("tags.a".into(), json!(1)))
            .and(Condition::Exists("tags.b".into()));
        assert!(both.matches(&d));

        let miss = both.clone().and(Condition::Exists("tags.c".into()));
        assert!(!miss.matches(&d));
        assert!(Filter::new().matches(&d));
    }

    #[test]
    fn equality_is_type_sensitive() {
        let d = doc(json!({"tags": {"a": 1}}));
        assert!(!Filter::new()
            .and(Condition::Equals("tags.a".into(), json!("1")))
            .matches(&d));
    }

    #[test]
    fn id_in_matches_any() {
        let d = doc(json!({"_id": "y"}));
        assert!(Filter::id_in(["x", "y"]).matches(&d));
        assert!(!Filter::id_in(["x"]).matches(&d));
    }

    #[test]
    fn cross_type_ordering() {
        let n = json!(5);
        let s = json!("a");
        assert_eq!(compare_values(None, Some(&n)), Ordering::Less);
        assert_eq!(compare_values(Some(&n), Some(&s)), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!(10)), Some(&json!(9))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }
}
