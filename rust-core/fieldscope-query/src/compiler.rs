// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query compilation.
//!
//! Compiling a predicate against a [`SearchScope`] rewrites it (see
//! [`crate::rewrite`]) and, for multi-index scopes, checks every referenced
//! field for cross-index compatibility with the usage the query makes of it.
//! The result is a [`CompiledQuery`]: immutable, shareable across threads, and
//! bound to the index names it was compiled for.

use std::collections::BTreeSet;
use std::fmt;

use fieldscope_schema::{
    check, CompatibilityRequest, CompatibilityVerdict, ConflictReport, FieldPath, FieldTrait,
    Schema,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ast::PredicateNode;
use crate::config::{CompilerConfig, OptionalConflictPolicy};
use crate::error::QueryError;
use crate::rewrite::{rewrite, ResolvedLeaf};
use crate::scope::SearchScope;

/// A tolerated problem found during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The conflict that would have failed a mandatory clause.
    pub conflict: ConflictReport,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "optional clause ignored: {}", self.conflict)
    }
}

/// A rewritten, validated predicate ready for translation or evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledQuery {
    predicate: PredicateNode,
    leaves: Vec<ResolvedLeaf>,
    indexes: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl CompiledQuery {
    /// Rewritten tree: absolute paths, explicit nesting, no named invocations.
    pub fn predicate(&self) -> &PredicateNode {
        &self.predicate
    }

    /// Field-targeting leaves in depth-first order.
    pub fn leaves(&self) -> &[ResolvedLeaf] {
        &self.leaves
    }

    pub fn indexes(&self) -> &BTreeSet<String> {
        &self.indexes
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_predicate(self) -> PredicateNode {
        self.predicate
    }

    /// Fails unless `scope` targets exactly the indexes this query was compiled for.
    pub fn ensure_scope(&self, scope: &SearchScope) -> Result<(), QueryError> {
        let actual = scope.index_names();
        if actual != self.indexes {
            return Err(QueryError::ScopeMismatch {
                expected: self.indexes.iter().cloned().collect(),
                actual: actual.into_iter().collect(),
            });
        }
        Ok(())
    }

    /// JSON form handed to the physical query translator.
    pub fn to_json(&self) -> Result<String, QueryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Compiles predicates against search scopes.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: CompilerConfig,
}

impl QueryCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(
        &self,
        scope: &SearchScope,
        predicate: &PredicateNode,
    ) -> Result<CompiledQuery, QueryError> {
        let rewritten = rewrite(scope, predicate, &self.config)?;
        let mut diagnostics = Vec::new();

        if scope.is_multi_index() {
            let schemas = scope.schemas();
            for leaf in &rewritten.leaves {
                let request =
                    CompatibilityRequest::new(leaf.usage).with_analysis(leaf.analysis.clone());
                for field in &leaf.fields {
                    self.check_field(field, &request, &schemas, leaf.optional, &mut diagnostics)?;
                }
            }
            let request = CompatibilityRequest::new(FieldTrait::Nested);
            for (path, optional) in &rewritten.scopes {
                self.check_field(path, &request, &schemas, *optional, &mut diagnostics)?;
            }
        }

        debug!(
            leaves = rewritten.leaves.len(),
            indexes = scope.len(),
            diagnostics = diagnostics.len(),
            "Query compiled"
        );
        Ok(CompiledQuery {
            predicate: rewritten.predicate,
            leaves: rewritten.leaves,
            indexes: scope.index_names(),
            diagnostics,
        })
    }

    fn check_field(
        &self,
        field: &FieldPath,
        request: &CompatibilityRequest,
        schemas: &[&Schema],
        optional: bool,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), QueryError> {
        match check(field, request, schemas)? {
            CompatibilityVerdict::Compatible => Ok(()),
            CompatibilityVerdict::CompatibleIgnoring { ignored } => {
                trace!(field = %field, usage = %request.usage, ?ignored, "Ignoring irrelevant differences");
                Ok(())
            }
            CompatibilityVerdict::Conflicting(conflict) => {
                if !optional || self.config.optional_conflicts == OptionalConflictPolicy::Fail {
                    return Err(conflict.into());
                }
                warn!(
                    field = %conflict.field,
                    attribute = %conflict.attribute,
                    left_index = %conflict.left_index,
                    right_index = %conflict.right_index,
                    "Conflicting field configuration in optional clause"
                );
                let diagnostic = Diagnostic { conflict };
                if !diagnostics.contains(&diagnostic) {
                    diagnostics.push(diagnostic);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::PredicateFactory;
    use crate::scope::TargetIndex;
    use fieldscope_schema::{FieldAttribute, FieldType, ValueField};

    fn scope() -> SearchScope {
        let a = Schema::builder("a")
            .value("title", ValueField::text("english"))
            .value("code", ValueField::keyword().sortable())
            .build()
            .unwrap();
        let b = Schema::builder("b")
            .value("title", ValueField::text("french"))
            .value("code", ValueField::keyword())
            .build()
            .unwrap();
        SearchScope::new([TargetIndex::new(a), TargetIndex::new(b)]).unwrap()
    }

    #[test]
    fn test_mandatory_conflict_fails() {
        let f = PredicateFactory::new();
        let query = f.match_field("title").unwrap().matching("rust");
        let err = QueryCompiler::default().compile(&scope(), &query).unwrap_err();
        let report = err.conflict().unwrap();
        assert_eq!(report.attribute, FieldAttribute::Analyzer);
        assert!(err
            .to_string()
            .starts_with("Inconsistent configuration for field 'title' across multiple indexes"));
    }

    #[test]
    fn test_analysis_override_avoids_conflict() {
        let f = PredicateFactory::new();
        let query = f
            .match_field("title")
            .unwrap()
            .skip_analysis()
            .matching("rust");
        let compiled = QueryCompiler::default().compile(&scope(), &query).unwrap();
        assert!(compiled.diagnostics().is_empty());
    }

    #[test]
    fn test_optional_conflict_is_a_diagnostic() {
        let f = PredicateFactory::new();
        let query = f.or([
            f.match_field("title").unwrap().matching("rust"),
            f.ids(["1"]),
        ]);
        let compiled = QueryCompiler::default().compile(&scope(), &query).unwrap();
        assert_eq!(compiled.diagnostics().len(), 1);
        assert!(compiled.diagnostics()[0].to_string().contains("'english' vs. 'french'"));

        let strict = QueryCompiler::new(CompilerConfig {
            optional_conflicts: OptionalConflictPolicy::Fail,
            ..CompilerConfig::default()
        });
        assert!(matches!(
            strict.compile(&scope(), &query),
            Err(QueryError::CrossIndexConflict(_))
        ));
    }

    #[test]
    fn test_match_on_differently_typed_fields_fails() {
        let a = Schema::builder("a")
            .value("code", ValueField::new(FieldType::Long))
            .build()
            .unwrap();
        let b = Schema::builder("b")
            .value("code", ValueField::keyword())
            .build()
            .unwrap();
        let scope = SearchScope::new([TargetIndex::new(a), TargetIndex::new(b)]).unwrap();
        let f = PredicateFactory::new();

        let err = QueryCompiler::default()
            .compile(&scope, &f.match_field("code").unwrap().matching(5i64))
            .unwrap_err();
        assert_eq!(err.conflict().unwrap().attribute, FieldAttribute::FieldType);

        let skipped = f.match_field("code").unwrap().skip_analysis().matching("5");
        assert!(QueryCompiler::default().compile(&scope, &skipped).is_err());
    }

    #[test]
    fn test_irrelevant_difference_compiles() {
        let f = PredicateFactory::new();
        let query = f.exists("code").unwrap();
        assert!(QueryCompiler::default().compile(&scope(), &query).is_ok());
    }

    #[test]
    fn test_scope_guard() {
        let f = PredicateFactory::new();
        let compiled = QueryCompiler::default()
            .compile(&scope(), &f.exists("code").unwrap())
            .unwrap();
        assert!(compiled.ensure_scope(&scope()).is_ok());

        let single = SearchScope::single(TargetIndex::new(
            Schema::builder("a")
                .value("code", ValueField::keyword())
                .build()
                .unwrap(),
        ));
        match compiled.ensure_scope(&single) {
            Err(QueryError::ScopeMismatch { expected, actual }) => {
                assert_eq!(expected, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(actual, vec!["a".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_compiled_query_is_shareable_and_serializable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledQuery>();

        let f = PredicateFactory::new();
        let compiled = QueryCompiler::default()
            .compile(&scope(), &f.exists("code").unwrap())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&compiled.to_json().unwrap()).unwrap();
        assert_eq!(json["indexes"], serde_json::json!(["a", "b"]));
        assert_eq!(json["leaves"][0]["usage"], "predicate:exists");
        assert_eq!(json["predicate"]["leaf"]["kind"], "exists");
    }
}
