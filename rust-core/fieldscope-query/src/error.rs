// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query error types.

use fieldscope_schema::{ConflictReport, FieldTrait, SchemaError};
use thiserror::Error;

/// Errors raised while building, compiling or evaluating a predicate.
///
/// Everything except [`QueryError::UnsupportedEvaluation`] is detected before
/// any document is looked at.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(
        "multi-field predicate spans different nested paths: field '{field}' requires \
         {chain} but field '{other_field}' requires {other_chain}"
    )]
    CrossNestedPath {
        field: String,
        chain: String,
        other_field: String,
        other_chain: String,
    },

    /// `target` is either `field '<path>'` or `index schema root`.
    #[error("unknown named predicate '{name}' on {target} in index '{index}'")]
    UnknownNamedPredicate {
        name: String,
        target: String,
        index: String,
    },

    #[error("named predicate '{predicate}': parameter '{name}' was not bound for this invocation")]
    MissingNamedParameter { predicate: String, name: String },

    #[error("named predicate '{predicate}': parameter '{name}' should be {expected}, found {actual}")]
    MistypedNamedParameter {
        predicate: String,
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("parameter '{0}' is already bound")]
    DuplicateNamedParameter(String),

    #[error("named predicate '{name}' is already registered on {target} in index '{index}'")]
    DuplicateNamedPredicate {
        name: String,
        target: String,
        index: String,
    },

    #[error("{0}")]
    CrossIndexConflict(#[from] ConflictReport),

    #[error("field '{field}' in index '{index}' does not support '{usage}'")]
    UnsupportedTrait {
        field: String,
        usage: FieldTrait,
        index: String,
    },

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("query expands to more than {limit} leaf predicates")]
    TooManyClauses { limit: usize },

    #[error("named predicate '{name}' exceeded the expansion depth of {depth}")]
    NamedPredicateRecursion { name: String, depth: usize },

    #[error("query was compiled for indexes {expected:?} but reused against {actual:?}")]
    ScopeMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("search scope has no target index")]
    EmptyScope,

    #[error("index '{0}' appears more than once in the search scope")]
    DuplicateIndex(String),

    #[error("cannot evaluate: {0}")]
    UnsupportedEvaluation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueryError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        QueryError::InvalidPredicate(reason.into())
    }

    /// The conflict report, for cross-index configuration failures.
    pub fn conflict(&self) -> Option<&ConflictReport> {
        match self {
            QueryError::CrossIndexConflict(report) => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_errors_are_transparent() {
        let err: QueryError = SchemaError::UnknownField {
            index: "a".to_string(),
            path: "x.y".to_string(),
            consumed: "x".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "unknown field 'x' in index 'a' (while resolving 'x.y')"
        );
    }

    #[test]
    fn test_unknown_named_predicate_message() {
        let err = QueryError::UnknownNamedPredicate {
            name: "recent".to_string(),
            target: "index schema root".to_string(),
            index: "books".to_string(),
        };
        assert!(err.to_string().contains("index schema root"));
    }
}
