// SPDX-License-Identifier: PMPL-1.0-or-later
//! Cross-index compatibility checking.
//!
//! When a query targets several indexes, each referenced field is resolved in
//! every schema and the resolutions are compared pairwise against the first
//! schema that has the field. Only the attributes the requested usage depends
//! on are compared; other differences are reported as ignored.
//!
//! | Usage                                  | Compared attributes                     |
//! |----------------------------------------|-----------------------------------------|
//! | `predicate:exists`                     | exists strategy                         |
//! | match, phrase, wildcard, regexp, SQS   | field type, search analyzer, normalizer |
//! | range, spatial, knn                    | field type                              |
//! | `sort:field`                           | field type, sortable                    |
//! | `projection:field`                     | field type, projectable                 |
//! | `aggregation:*`                        | field type, aggregable                  |
//! | any usage of an object field           | structure, nested path hierarchy        |
//!
//! A schema that lacks the field contributes nothing and never conflicts.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::error::SchemaError;
use crate::node::{AnalysisOverride, NodeKind, ObjectField, SchemaNode, ValueField};
use crate::path::FieldPath;
use crate::resolve::{self, Resolution};
use crate::schema::Schema;
use crate::traits::FieldTrait;

const NONE: &str = "<none>";

/// A field attribute that can differ between two indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldAttribute {
    NodeKind,
    FieldType,
    Analyzer,
    SearchAnalyzer,
    Normalizer,
    ExistsStrategy,
    Sortable,
    Projectable,
    Aggregable,
    MultiValued,
    Structure,
    NestedPathHierarchy,
    NamedPredicate,
}

impl FieldAttribute {
    pub fn name(self) -> &'static str {
        match self {
            FieldAttribute::NodeKind => "nodeKind",
            FieldAttribute::FieldType => "fieldType",
            FieldAttribute::Analyzer => "analyzer",
            FieldAttribute::SearchAnalyzer => "searchAnalyzer",
            FieldAttribute::Normalizer => "normalizer",
            FieldAttribute::ExistsStrategy => "existsStrategy",
            FieldAttribute::Sortable => "sortable",
            FieldAttribute::Projectable => "projectable",
            FieldAttribute::Aggregable => "aggregable",
            FieldAttribute::MultiValued => "multiValued",
            FieldAttribute::Structure => "structure",
            FieldAttribute::NestedPathHierarchy => "nestedPathHierarchy",
            FieldAttribute::NamedPredicate => "namedPredicate",
        }
    }
}

impl fmt::Display for FieldAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a field is about to be used for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompatibilityRequest {
    pub usage: FieldTrait,
    /// Analysis requested by the predicate invocation; only text predicates use it.
    #[serde(default)]
    pub analysis: AnalysisOverride,
}

impl CompatibilityRequest {
    pub fn new(usage: FieldTrait) -> Self {
        Self {
            usage,
            analysis: AnalysisOverride::None,
        }
    }

    pub fn with_analysis(mut self, analysis: AnalysisOverride) -> Self {
        self.analysis = analysis;
        self
    }
}

/// A relevant attribute differing between two indexes.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error(
    "Inconsistent configuration for field '{field}' across multiple indexes: \
     Attribute '{attribute}' differs: '{left}' vs. '{right}'. \
     Context: indexes ['{left_index}', '{right_index}'], usage '{usage}'"
)]
pub struct ConflictReport {
    pub field: FieldPath,
    pub usage: FieldTrait,
    pub attribute: FieldAttribute,
    pub left: String,
    pub right: String,
    pub left_index: String,
    pub right_index: String,
}

/// Outcome of comparing one field across indexes for one usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum CompatibilityVerdict {
    /// No attribute differs.
    Compatible,
    /// Some attributes differ but the usage does not depend on them.
    CompatibleIgnoring { ignored: Vec<FieldAttribute> },
    Conflicting(ConflictReport),
}

impl CompatibilityVerdict {
    pub fn is_compatible(&self) -> bool {
        !self.is_conflicting()
    }

    pub fn is_conflicting(&self) -> bool {
        matches!(self, CompatibilityVerdict::Conflicting(_))
    }

    pub fn conflict(&self) -> Option<&ConflictReport> {
        match self {
            CompatibilityVerdict::Conflicting(report) => Some(report),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<Self, ConflictReport> {
        match self {
            CompatibilityVerdict::Conflicting(report) => Err(report),
            other => Ok(other),
        }
    }
}

/// Per-schema result of resolving the checked path.
enum Presence<'a> {
    Found(Resolution<'a>),
    /// A prefix of the path is a value field in this index.
    Blocked { index: &'a str, error: SchemaError },
}

impl Presence<'_> {
    fn index(&self) -> &str {
        match self {
            Presence::Found(resolution) => resolution.index,
            Presence::Blocked { index, .. } => index,
        }
    }
}

/// Check that `path` can be used for `request` consistently in all `schemas`.
///
/// Fails only when the path exists in none of the schemas (the first
/// resolution error is returned) or is malformed.
pub fn check(
    path: &FieldPath,
    request: &CompatibilityRequest,
    schemas: &[&Schema],
) -> Result<CompatibilityVerdict, SchemaError> {
    let mut present = Vec::with_capacity(schemas.len());
    let mut first_absent = None;
    for schema in schemas {
        match resolve::resolve(schema, path) {
            Ok(resolution) => present.push(Presence::Found(resolution)),
            Err(error) if error.is_unknown_field() => {
                trace!(index = schema.index_name(), path = %path, "Field absent from index");
                if first_absent.is_none() {
                    first_absent = Some(error);
                }
            }
            Err(error @ SchemaError::WrongNodeKind { .. }) => present.push(Presence::Blocked {
                index: schema.index_name(),
                error,
            }),
            Err(error) => return Err(error),
        }
    }

    if present.iter().all(|p| matches!(p, Presence::Blocked { .. })) {
        return Err(match present.into_iter().next() {
            Some(Presence::Blocked { error, .. }) => error,
            _ => first_absent.unwrap_or_else(|| {
                SchemaError::InvalidSchema(
                    "compatibility check needs at least one schema".to_string(),
                )
            }),
        });
    }

    let mut ignored = BTreeSet::new();
    let (baseline, others) = present.split_at(1);
    let baseline = &baseline[0];
    for other in others {
        let outcome = match (baseline, other) {
            (Presence::Found(left), Presence::Found(right)) => compare(request, left, right),
            (Presence::Blocked { .. }, Presence::Blocked { .. }) => Ok(BTreeSet::new()),
            // One index has an object where the other has a value.
            (Presence::Blocked { .. }, Presence::Found(_)) => Err((
                FieldAttribute::NodeKind,
                NodeKind::Value.to_string(),
                NodeKind::Object.to_string(),
            )),
            (Presence::Found(_), Presence::Blocked { .. }) => Err((
                FieldAttribute::NodeKind,
                NodeKind::Object.to_string(),
                NodeKind::Value.to_string(),
            )),
        };
        match outcome {
            Ok(differing) => ignored.extend(differing),
            Err((attribute, left, right)) => {
                return Ok(CompatibilityVerdict::Conflicting(ConflictReport {
                    field: path.clone(),
                    usage: request.usage,
                    attribute,
                    left,
                    right,
                    left_index: baseline.index().to_string(),
                    right_index: other.index().to_string(),
                }))
            }
        }
    }

    if ignored.is_empty() {
        Ok(CompatibilityVerdict::Compatible)
    } else {
        Ok(CompatibilityVerdict::CompatibleIgnoring {
            ignored: ignored.into_iter().collect(),
        })
    }
}

type Difference = (FieldAttribute, String, String);

/// Compare two resolutions. `Ok` carries the irrelevant differing attributes.
fn compare(
    request: &CompatibilityRequest,
    left: &Resolution<'_>,
    right: &Resolution<'_>,
) -> Result<BTreeSet<FieldAttribute>, Difference> {
    let mut differences = Vec::new();
    if let (SchemaNode::Object(l), SchemaNode::Object(r)) = (left.node, right.node) {
        if l.structure != r.structure {
            return Err((
                FieldAttribute::Structure,
                l.structure.to_string(),
                r.structure.to_string(),
            ));
        }
    }
    if left.chain != right.chain {
        differences.push((
            FieldAttribute::NestedPathHierarchy,
            left.chain.to_string(),
            right.chain.to_string(),
        ));
    }
    let relevant = match (left.node, right.node) {
        (SchemaNode::Value(l), SchemaNode::Value(r)) => {
            value_differences(l, r, &mut differences);
            if let Some(conflict) = analysis_conflict(request, l, r) {
                return Err(conflict);
            }
            value_relevance(request)
        }
        (SchemaNode::Object(l), SchemaNode::Object(r)) => {
            object_differences(l, r, &mut differences);
            &[][..]
        }
        (l, r) => {
            return Err((
                FieldAttribute::NodeKind,
                l.kind().to_string(),
                r.kind().to_string(),
            ))
        }
    };

    let mut ignored = BTreeSet::new();
    for (attribute, l, r) in differences {
        if attribute == FieldAttribute::NestedPathHierarchy || relevant.contains(&attribute) {
            return Err((attribute, l, r));
        }
        ignored.insert(attribute);
    }
    Ok(ignored)
}

/// Attributes a usage of a value field depends on, besides the analysis chain.
fn value_relevance(request: &CompatibilityRequest) -> &'static [FieldAttribute] {
    use FieldAttribute::*;

    match request.usage {
        FieldTrait::Exists => &[ExistsStrategy],
        // The query value must be typed for every field, analyzed or not.
        usage if usage.is_text_family() => {
            if request.analysis.bypasses_field_analysis() {
                &[FieldType]
            } else {
                &[FieldType, Normalizer]
            }
        }
        FieldTrait::Range
        | FieldTrait::Knn
        | FieldTrait::SpatialWithinCircle
        | FieldTrait::SpatialWithinPolygon
        | FieldTrait::SpatialWithinBoundingBox => &[FieldType],
        FieldTrait::SortField => &[FieldType, Sortable],
        FieldTrait::ProjectionField => &[FieldType, Projectable],
        FieldTrait::AggregationTerms | FieldTrait::AggregationRange => &[FieldType, Aggregable],
        FieldTrait::Nested | FieldTrait::Named => &[],
        // Remaining text-family kinds are matched by the guard above.
        _ => &[],
    }
}

/// Text predicates analyze query text with the search analyzer when one is
/// declared, so that is the value compared. An override bypasses both.
fn analysis_conflict(
    request: &CompatibilityRequest,
    left: &ValueField,
    right: &ValueField,
) -> Option<Difference> {
    if !request.usage.is_text_family() || request.analysis.bypasses_field_analysis() {
        return None;
    }
    let l = left.effective_search_analyzer();
    let r = right.effective_search_analyzer();
    if l == r {
        return None;
    }
    let attribute = if left.search_analyzer.is_some() || right.search_analyzer.is_some() {
        FieldAttribute::SearchAnalyzer
    } else {
        FieldAttribute::Analyzer
    };
    Some((attribute, display_opt(l), display_opt(r)))
}

fn value_differences(left: &ValueField, right: &ValueField, out: &mut Vec<Difference>) {
    let mut push = |attribute, l: String, r: String| {
        if l != r {
            out.push((attribute, l, r));
        }
    };
    push(
        FieldAttribute::FieldType,
        left.field_type.to_string(),
        right.field_type.to_string(),
    );
    push(
        FieldAttribute::Analyzer,
        display_opt(left.analyzer.as_deref()),
        display_opt(right.analyzer.as_deref()),
    );
    push(
        FieldAttribute::SearchAnalyzer,
        display_opt(left.search_analyzer.as_deref()),
        display_opt(right.search_analyzer.as_deref()),
    );
    push(
        FieldAttribute::Normalizer,
        display_opt(left.normalizer.as_deref()),
        display_opt(right.normalizer.as_deref()),
    );
    push(
        FieldAttribute::ExistsStrategy,
        left.effective_exists_strategy().to_string(),
        right.effective_exists_strategy().to_string(),
    );
    push(FieldAttribute::Sortable, left.sortable.to_string(), right.sortable.to_string());
    push(
        FieldAttribute::Projectable,
        left.projectable.to_string(),
        right.projectable.to_string(),
    );
    push(
        FieldAttribute::Aggregable,
        left.aggregable.to_string(),
        right.aggregable.to_string(),
    );
    push(
        FieldAttribute::MultiValued,
        left.multi_valued.to_string(),
        right.multi_valued.to_string(),
    );
}

/// Children are not compared: each child is checked on its own when used.
/// Structure is compared before the chain in [`compare`].
fn object_differences(left: &ObjectField, right: &ObjectField, out: &mut Vec<Difference>) {
    if left.multi_valued != right.multi_valued {
        out.push((
            FieldAttribute::MultiValued,
            left.multi_valued.to_string(),
            right.multi_valued.to_string(),
        ));
    }
}

fn display_opt(value: Option<&str>) -> String {
    value.unwrap_or(NONE).to_string()
}
