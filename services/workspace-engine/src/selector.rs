//! JSON-condition selectors.
//!
//! Selectors match deployments, environments, resources and versions by
//! name, identifier, kind, tag, id or metadata, and compose with
//! `and`/`or`/`not`:
//!
//! ```json
//! {"type": "and", "conditions": [
//!     {"type": "kind", "operator": "equals", "value": "kubernetes"},
//!     {"type": "metadata", "key": "region", "operator": "starts-with", "value": "us-"}
//! ]}
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use ctrlplane_reconcile::ErrorKind;

use crate::model::{Deployment, DeploymentVersion, Environment, Resource};

/// Maximum nesting of `and`/`or`/`not`.
const MAX_SELECTOR_DEPTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectorError {
    /// A `regex` operand failed to compile.
    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    /// `and`/`or` with no conditions.
    #[error("{0} selector requires at least one condition")]
    EmptyConditions(&'static str),

    /// Nested deeper than the evaluator allows.
    #[error("selector nested deeper than {0} levels")]
    TooDeep(usize),
}

impl SelectorError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

/// `operator` applied with `value` as the right-hand side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub operator: Operator,
    pub value: String,
}

impl Comparison {
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            operator: Operator::Equals,
            value: value.into(),
        }
    }

    fn test(&self, actual: &str) -> bool {
        match self.operator {
            Operator::Equals => actual == self.value,
            Operator::NotEquals => actual != self.value,
            Operator::Contains => actual.contains(&self.value),
            Operator::StartsWith => actual.starts_with(&self.value),
            Operator::EndsWith => actual.ends_with(&self.value),
            Operator::Regex => match Regex::new(&self.value) {
                Ok(re) => re.is_match(actual),
                Err(e) => {
                    warn!(pattern = %self.value, error = %e, "Invalid selector regex");
                    false
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Selector {
    Name(Comparison),
    Identifier(Comparison),
    Kind(Comparison),
    Tag(Comparison),
    Id(Comparison),
    Metadata {
        key: String,
        #[serde(flatten)]
        comparison: Comparison,
    },
    And {
        conditions: Vec<Selector>,
    },
    Or {
        conditions: Vec<Selector>,
    },
    Not {
        condition: Box<Selector>,
    },
}

/// An entity a selector can be evaluated against.
///
/// Returning `None` from a field lookup means the entity has no such
/// field; any comparison against it is false.
pub trait Selectable {
    fn selector_field(&self, field: Field) -> Option<&str>;
    fn metadata_value(&self, key: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Identifier,
    Kind,
    Tag,
    Id,
}

impl Selector {
    pub fn matches<T: Selectable + ?Sized>(&self, entity: &T) -> bool {
        self.matches_at(entity, 0)
    }

    fn matches_at<T: Selectable + ?Sized>(&self, entity: &T, depth: usize) -> bool {
        if depth > MAX_SELECTOR_DEPTH {
            warn!(limit = MAX_SELECTOR_DEPTH, "Selector nested too deep, not matching");
            return false;
        }
        let field = |f: Field, c: &Comparison| entity.selector_field(f).is_some_and(|v| c.test(v));
        match self {
            Self::Name(c) => field(Field::Name, c),
            Self::Identifier(c) => field(Field::Identifier, c),
            Self::Kind(c) => field(Field::Kind, c),
            Self::Tag(c) => field(Field::Tag, c),
            Self::Id(c) => field(Field::Id, c),
            Self::Metadata { key, comparison } => entity
                .metadata_value(key)
                .is_some_and(|v| comparison.test(v)),
            Self::And { conditions } => conditions.iter().all(|s| s.matches_at(entity, depth + 1)),
            Self::Or { conditions } => conditions.iter().any(|s| s.matches_at(entity, depth + 1)),
            Self::Not { condition } => !condition.matches_at(entity, depth + 1),
        }
    }

    /// Checks regexes compile and composites are well formed.
    pub fn validate(&self) -> Result<(), SelectorError> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<(), SelectorError> {
        if depth > MAX_SELECTOR_DEPTH {
            return Err(SelectorError::TooDeep(MAX_SELECTOR_DEPTH));
        }
        let check = |c: &Comparison| match c.operator {
            Operator::Regex => Regex::new(&c.value).map(|_| ()).map_err(|e| {
                SelectorError::InvalidRegex {
                    pattern: c.value.clone(),
                    message: e.to_string(),
                }
            }),
            _ => Ok(()),
        };
        match self {
            Self::Name(c) | Self::Identifier(c) | Self::Kind(c) | Self::Tag(c) | Self::Id(c) => {
                check(c)
            }
            Self::Metadata { comparison, .. } => check(comparison),
            Self::And { conditions } | Self::Or { conditions } => {
                if conditions.is_empty() {
                    let name = if matches!(self, Self::And { .. }) { "and" } else { "or" };
                    return Err(SelectorError::EmptyConditions(name));
                }
                conditions.iter().try_for_each(|s| s.validate_at(depth + 1))
            }
            Self::Not { condition } => condition.validate_at(depth + 1),
        }
    }
}

// =============================================================================
// Selectable entities
// =============================================================================

impl Selectable for Deployment {
    fn selector_field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => Some(&self.name),
            Field::Identifier => Some(&self.slug),
            Field::Id => Some(self.id.as_str()),
            Field::Kind | Field::Tag => None,
        }
    }

    fn metadata_value(&self, _key: &str) -> Option<&str> {
        None
    }
}

impl Selectable for Environment {
    fn selector_field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => Some(&self.name),
            Field::Id => Some(self.id.as_str()),
            Field::Identifier | Field::Kind | Field::Tag => None,
        }
    }

    fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl Selectable for Resource {
    fn selector_field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => Some(&self.name),
            Field::Identifier => Some(&self.identifier),
            Field::Kind => Some(&self.kind),
            Field::Id => Some(self.id.as_str()),
            Field::Tag => None,
        }
    }

    fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl Selectable for DeploymentVersion {
    fn selector_field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => Some(&self.name),
            Field::Tag => Some(&self.tag),
            Field::Id => Some(self.id.as_str()),
            Field::Identifier | Field::Kind => None,
        }
    }

    fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
