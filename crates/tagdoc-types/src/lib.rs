//! Foundation types for tagdoc.
//!
//! tagdoc stores opaque byte values under string keys, annotated with
//! name/value tags, inside a schemaless document database. This crate holds
//! the backend-independent pieces every other tagdoc crate depends on.
//!
//! # Key Types
//!
//! - [`Tag`] -- Public name/value annotation as supplied by callers
//! - [`TagValue`] -- Stored form of a tag value (integer-coerced when possible)
//! - [`TagMap`] -- Unordered name→value mapping kept on each record
//! - [`StoredValue`] -- The three value shapes: structured, text, binary
//! - [`Record`] -- The unit of storage and its document layout
//! - [`StoreConfiguration`] -- Declared set of tag names to index

pub mod config;
pub mod error;
pub mod record;
pub mod tag;
pub mod value;

pub use config::StoreConfiguration;
pub use error::{TypeError, TypeResult};
pub use record::{tag_path, Record};
pub use tag::{
    map_to_tags, tags_to_map, validate_tag, validate_tag_name, validate_tag_value, Tag, TagMap,
    TagValue, PATH_SEPARATOR, TAG_SEPARATOR,
};
pub use value::StoredValue;
