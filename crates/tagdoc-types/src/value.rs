//! The value codec.
//!
//! A stored value takes exactly one of three shapes. Encoding tries them in
//! priority order and the first successful parse wins:
//!
//! 1. a JSON object → [`StoredValue::Structured`]
//! 2. a JSON string literal → [`StoredValue::Text`]
//! 3. anything else → [`StoredValue::Binary`]
//!
//! Decoding re-serialises the structured and text shapes, so a value is
//! reproduced byte-for-byte when it was already in compact JSON form.
//! Object member order and numeric literals are preserved.

use serde_json::{Map, Value};

use crate::error::{TypeError, TypeResult};

/// A record value in one of its three stored shapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredValue {
    Structured(Map<String, Value>),
    Text(String),
    Binary(Vec<u8>),
}

impl StoredValue {
    /// Classify raw bytes into a stored shape.
    pub fn encode(raw: &[u8]) -> Self {
        if let Ok(object) = serde_json::from_slice::<Map<String, Value>>(raw) {
            return Self::Structured(object);
        }
        if let Ok(text) = serde_json::from_slice::<String>(raw) {
            return Self::Text(text);
        }
        Self::Binary(raw.to_vec())
    }

    /// Reproduce the raw bytes for this value.
    pub fn decode(&self) -> TypeResult<Vec<u8>> {
        match self {
            Self::Structured(object) => serde_json::to_vec(object)
                .map_err(|e| TypeError::Serialization(format!("structured value: {e}"))),
            Self::Text(text) => serde_json::to_vec(text)
                .map_err(|e| TypeError::Serialization(format!("text value: {e}"))),
            Self::Binary(bytes) => Ok(bytes.clone()),
        }
    }

    /// Short name of the shape, used in diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}
