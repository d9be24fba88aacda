use serde::{Deserialize, Serialize};

use crate::error::TypeResult;
use crate::tag::validate_tag_name;

/// Declared set of tag names that must be indexed for a store.
///
/// Applying the same configuration twice converges to the same set of
/// indexes; the second application creates and drops nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfiguration {
    /// Tag names to index.
    pub tag_names: Vec<String>,
}

impl StoreConfiguration {
    /// Build a configuration from a list of tag names.
    pub fn new<I, S>(tag_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag_names: tag_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Reject tag names containing the reserved separator.
    pub fn validate(&self) -> TypeResult<()> {
        self.tag_names
            .iter()
            .try_for_each(|name| validate_tag_name(name))
    }

    /// Whether `name` is one of the configured tag names.
    pub fn contains(&self, name: &str) -> bool {
        self.tag_names.iter().any(|t| t == name)
    }
}
