// SPDX-License-Identifier: PMPL-1.0-or-later
//! FieldScope Query
//!
//! Predicate construction and compilation for schemas with nested objects.
//! Callers build predicates against field paths without declaring nesting
//! scopes; compilation resolves every path, inserts the scopes each leaf
//! needs, expands named predicates and, for multi-index scopes, verifies that
//! every referenced field is configured compatibly for how it is used.
//!
//! ```text
//! PredicateFactory ──> PredicateNode ──> QueryCompiler::compile(SearchScope)
//!                                              │
//!                                              ├─ rewrite: absolute paths, nesting, named expansion
//!                                              └─ check:   cross-index compatibility per leaf
//!                                              ▼
//!                                        CompiledQuery ──> translator / MemoryCorpus
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod eval;
pub mod factory;
pub mod named;
pub mod params;
pub mod rewrite;
pub mod scope;

pub use ast::{BoolOperator, GeoPoint, LeafPredicate, PredicateKind, PredicateNode, RangeBound};
pub use compiler::{CompiledQuery, Diagnostic, QueryCompiler};
pub use config::{CompilerConfig, OptionalConflictPolicy};
pub use error::QueryError;
pub use eval::{Hit, MemoryCorpus};
pub use factory::{
    MatchStep, NamedStep, PhraseStep, PredicateFactory, RangeStep, SimpleQueryStringStep,
};
pub use named::{named_predicate, NamedPredicateContext, NamedPredicateFactory, NamedPredicateRegistry};
pub use params::{ParamBag, ParamValue};
pub use rewrite::{rewrite, ResolvedLeaf, Rewritten};
pub use scope::{ScopedResolution, SearchScope, TargetIndex};
