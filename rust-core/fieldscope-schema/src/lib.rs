// SPDX-License-Identifier: PMPL-1.0-or-later
//! FieldScope Schema
//!
//! Immutable index schema model for the FieldScope predicate compiler.
//!
//! # Architecture
//!
//! - **FieldPath**: dotted path from a resolution root to a field.
//! - **Schema**: the field tree of one index. Object fields are either
//!   FLATTENED (merged into the parent document) or NESTED (separate hidden
//!   documents that need a query-time scope).
//! - **Traits**: the usages (predicate kinds, sort, projection, aggregation)
//!   each field exposes.
//! - **Resolver**: computes the nesting chain a path requires.
//! - **Compatibility checker**: compares a field across several schemas for
//!   one usage, ignoring attributes that usage does not depend on.

pub mod compat;
pub mod error;
pub mod node;
pub mod path;
pub mod resolve;
pub mod schema;
pub mod traits;

pub use compat::{
    check, CompatibilityRequest, CompatibilityVerdict, ConflictReport, FieldAttribute,
};
pub use error::SchemaError;
pub use node::{
    AnalysisOverride, DistanceMetric, ExistsStrategy, FieldType, NodeKind, ObjectField,
    QueryAnalysis, SchemaNode, StructureKind, ValueField,
};
pub use path::{FieldPath, SEPARATOR};
pub use resolve::{NestingChain, NestingScope, Resolution};
pub use schema::{Schema, SchemaBuilder};
pub use traits::{node_traits, supports, FieldTrait};
