//! Tag query expressions and query options.
//!
//! ```text
//! expr := term ("&&" term)?
//! term := name (":" value)?
//! ```
//!
//! A bare name matches records carrying that tag with any value. A
//! `name:value` term matches the tag's value, integer-coerced the same way
//! tags are on write, so `age:30` finds a tag stored as the integer 30.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tagdoc_backend::{Condition, Filter, FindOptions, SortDirection, SortSpec};
use tagdoc_types::{tag_path, validate_tag_name, TagValue, TAG_SEPARATOR};

use crate::error::{StoreError, StoreResult};

/// Operator joining two terms.
const AND_OPERATOR: &str = "&&";

/// Most terms an expression may join.
const MAX_TERMS: usize = 2;

/// One predicate of a tag query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryTerm {
    /// The tag is present, with any value.
    Exists { name: String },
    /// The tag holds exactly this value.
    Equals { name: String, value: TagValue },
}

impl QueryTerm {
    /// The tag name this term constrains.
    pub fn name(&self) -> &str {
        match self {
            Self::Exists { name } | Self::Equals { name, .. } => name,
        }
    }

    fn parse(term: &str) -> StoreResult<Self> {
        let parts: Vec<&str> = term.split(TAG_SEPARATOR).collect();
        let parsed = match parts.as_slice() {
            [name] => Self::Exists {
                name: (*name).to_string(),
            },
            [name, value] => Self::Equals {
                name: (*name).to_string(),
                value: TagValue::coerce(value),
            },
            _ => return Err(StoreError::InvalidQueryExpression),
        };
        if parsed.name().is_empty() {
            return Err(StoreError::InvalidQueryExpression);
        }
        validate_tag_name(parsed.name())?;
        Ok(parsed)
    }

    fn to_condition(&self) -> Condition {
        match self {
            Self::Exists { name } => Condition::Exists(tag_path(name)),
            Self::Equals { name, value } => Condition::Equals(tag_path(name), value.to_json()),
        }
    }
}

/// A parsed tag query: one or two terms joined by logical AND.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagQuery {
    terms: Vec<QueryTerm>,
}

impl TagQuery {
    /// Parse a query expression.
    pub fn parse(expression: &str) -> StoreResult<Self> {
        if expression.is_empty() {
            return Err(StoreError::InvalidQueryExpression);
        }
        let raw_terms: Vec<&str> = expression.split(AND_OPERATOR).collect();
        if raw_terms.len() > MAX_TERMS {
            return Err(StoreError::InvalidQueryExpression);
        }
        let terms = raw_terms
            .into_iter()
            .map(QueryTerm::parse)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    /// The backend filter selecting records that satisfy every term.
    pub fn to_filter(&self) -> Filter {
        self.terms
            .iter()
            .fold(Filter::new(), |filter, term| filter.and(term.to_condition()))
    }
}

impl FromStr for TagQuery {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Sort results by a tag's value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptions {
    pub tag_name: String,
    #[serde(default)]
    pub order: SortDirection,
}

impl SortOptions {
    pub fn ascending(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            order: SortDirection::Ascending,
        }
    }

    pub fn descending(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            order: SortDirection::Descending,
        }
    }
}

/// Paging and ordering for a query.
///
/// The page size is a fetch-size hint for the backend. Combined with
/// `initial_page` it also skips `initial_page * page_size` results; without
/// a page size the initial page has no effect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub page_size: Option<u32>,
    pub initial_page: u32,
    pub sort: Option<SortOptions>,
}

impl QueryOptions {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_initial_page(mut self, page: u32) -> Self {
        self.initial_page = page;
        self
    }

    pub fn with_sort(mut self, sort: SortOptions) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Reject a sort on a tag name no record can carry.
    pub fn validate(&self) -> StoreResult<()> {
        if let Some(sort) = &self.sort {
            validate_tag_name(&sort.tag_name)?;
        }
        Ok(())
    }

    /// Translate into backend find options.
    pub fn to_find_options(&self) -> FindOptions {
        let page_size = self.page_size.filter(|&size| size > 0);
        let skip = match page_size {
            Some(size) if self.initial_page > 0 => {
                Some(u64::from(self.initial_page) * u64::from(size))
            }
            _ => None,
        };
        FindOptions {
            batch_size: page_size,
            skip,
            sort: self.sort.as_ref().map(|sort| SortSpec {
                path: tag_path(&sort.tag_name),
                direction: sort.order,
            }),
        }
    }
}
