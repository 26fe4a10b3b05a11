// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema error types.

use thiserror::Error;

use crate::node::NodeKind;

/// Errors raised while building schemas or resolving field paths against them.
///
/// All of these are construction-time failures: they describe a caller or
/// configuration bug and are never worth retrying.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid field path '{path}': {reason}")]
    InvalidFieldPath { path: String, reason: String },

    /// A path segment has no matching child. `consumed` is the sub-path up to
    /// and including the first segment that could not be found.
    #[error("unknown field '{consumed}' in index '{index}' (while resolving '{path}')")]
    UnknownField {
        index: String,
        path: String,
        consumed: String,
    },

    #[error("field '{path}' in index '{index}': expected {expected}, found {actual}")]
    WrongNodeKind {
        index: String,
        path: String,
        expected: NodeKind,
        actual: NodeKind,
    },

    #[error("duplicate field '{path}' in index '{index}'")]
    DuplicateField { index: String, path: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchemaError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidFieldPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the error means "this path does not exist in that index".
    pub fn is_unknown_field(&self) -> bool {
        matches!(self, SchemaError::UnknownField { .. })
    }
}
