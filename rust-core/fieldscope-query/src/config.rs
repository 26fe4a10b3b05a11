// SPDX-License-Identifier: PMPL-1.0-or-later
//! Compiler configuration.
//!
//! Defaults:
//! - optional_conflicts: warn
//! - validate_traits: true
//! - max_clause_count: 1024
//! - max_named_expansion_depth: 32

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// What to do when a clause inside an `or` targets a field whose
/// configuration conflicts across indexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalConflictPolicy {
    /// Record a diagnostic on the compiled query and log a warning.
    #[default]
    Warn,
    /// Fail compilation, as for mandatory clauses.
    Fail,
}

/// Configuration for the query compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub optional_conflicts: OptionalConflictPolicy,
    /// Reject leaves whose field does not expose the trait the predicate needs.
    pub validate_traits: bool,
    /// Upper bound on leaf predicates after named-predicate expansion.
    pub max_clause_count: usize,
    /// Guards named predicates that (transitively) invoke themselves.
    pub max_named_expansion_depth: usize,
}

impl CompilerConfig {
    /// Load from JSON; absent keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            optional_conflicts: OptionalConflictPolicy::Warn,
            validate_traits: true,
            max_clause_count: 1024,
            max_named_expansion_depth: 32,
        }
    }
}
