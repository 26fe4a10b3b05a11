// SPDX-License-Identifier: PMPL-1.0-or-later
//! Field trait registry.
//!
//! A trait names one way a field can be used in a query: a predicate kind
//! (`predicate:match`, `predicate:knn`, ...) or a non-predicate usage
//! (`sort:field`, `projection:field`, ...). Each field exposes a set of traits
//! derived from its type, its analysis configuration and its flags; a query
//! may only use a field through a trait the field exposes.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::node::{FieldType, ObjectField, SchemaNode, ValueField};

/// A capability a field may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldTrait {
    #[serde(rename = "predicate:match")]
    Match,
    #[serde(rename = "predicate:range")]
    Range,
    #[serde(rename = "predicate:phrase")]
    Phrase,
    #[serde(rename = "predicate:exists")]
    Exists,
    #[serde(rename = "predicate:wildcard")]
    Wildcard,
    #[serde(rename = "predicate:regexp")]
    Regexp,
    #[serde(rename = "predicate:simple-query-string")]
    SimpleQueryString,
    #[serde(rename = "predicate:spatial:within-circle")]
    SpatialWithinCircle,
    #[serde(rename = "predicate:spatial:within-polygon")]
    SpatialWithinPolygon,
    #[serde(rename = "predicate:spatial:within-bounding-box")]
    SpatialWithinBoundingBox,
    #[serde(rename = "predicate:knn")]
    Knn,
    #[serde(rename = "predicate:nested")]
    Nested,
    #[serde(rename = "predicate:named")]
    Named,
    #[serde(rename = "sort:field")]
    SortField,
    #[serde(rename = "projection:field")]
    ProjectionField,
    #[serde(rename = "aggregation:terms")]
    AggregationTerms,
    #[serde(rename = "aggregation:range")]
    AggregationRange,
}

impl FieldTrait {
    pub const ALL: [FieldTrait; 17] = [
        FieldTrait::Match,
        FieldTrait::Range,
        FieldTrait::Phrase,
        FieldTrait::Exists,
        FieldTrait::Wildcard,
        FieldTrait::Regexp,
        FieldTrait::SimpleQueryString,
        FieldTrait::SpatialWithinCircle,
        FieldTrait::SpatialWithinPolygon,
        FieldTrait::SpatialWithinBoundingBox,
        FieldTrait::Knn,
        FieldTrait::Nested,
        FieldTrait::Named,
        FieldTrait::SortField,
        FieldTrait::ProjectionField,
        FieldTrait::AggregationTerms,
        FieldTrait::AggregationRange,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldTrait::Match => "predicate:match",
            FieldTrait::Range => "predicate:range",
            FieldTrait::Phrase => "predicate:phrase",
            FieldTrait::Exists => "predicate:exists",
            FieldTrait::Wildcard => "predicate:wildcard",
            FieldTrait::Regexp => "predicate:regexp",
            FieldTrait::SimpleQueryString => "predicate:simple-query-string",
            FieldTrait::SpatialWithinCircle => "predicate:spatial:within-circle",
            FieldTrait::SpatialWithinPolygon => "predicate:spatial:within-polygon",
            FieldTrait::SpatialWithinBoundingBox => "predicate:spatial:within-bounding-box",
            FieldTrait::Knn => "predicate:knn",
            FieldTrait::Nested => "predicate:nested",
            FieldTrait::Named => "predicate:named",
            FieldTrait::SortField => "sort:field",
            FieldTrait::ProjectionField => "projection:field",
            FieldTrait::AggregationTerms => "aggregation:terms",
            FieldTrait::AggregationRange => "aggregation:range",
        }
    }

    pub fn is_predicate(self) -> bool {
        self.name().starts_with("predicate:")
    }

    /// Predicates whose query text goes through the field's analysis chain.
    pub fn is_text_family(self) -> bool {
        matches!(
            self,
            FieldTrait::Match
                | FieldTrait::Phrase
                | FieldTrait::Wildcard
                | FieldTrait::Regexp
                | FieldTrait::SimpleQueryString
        )
    }

    pub fn is_spatial(self) -> bool {
        matches!(
            self,
            FieldTrait::SpatialWithinCircle
                | FieldTrait::SpatialWithinPolygon
                | FieldTrait::SpatialWithinBoundingBox
        )
    }
}

impl fmt::Display for FieldTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldTrait {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldTrait::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| SchemaError::InvalidSchema(format!("unknown field trait: {}", s)))
    }
}

/// Traits a field of this type can expose at most, before flags are applied.
pub fn type_traits(field_type: FieldType) -> BTreeSet<FieldTrait> {
    use FieldTrait::*;

    let mut traits = BTreeSet::from([Exists]);
    match field_type {
        FieldType::String => {
            traits.extend([Match, Range, Phrase, Wildcard, Regexp, SimpleQueryString]);
        }
        FieldType::Integer | FieldType::Long | FieldType::Double | FieldType::Date => {
            traits.extend([Match, Range, SimpleQueryString]);
        }
        FieldType::Boolean => {
            traits.extend([Match, Range]);
        }
        FieldType::GeoPoint => {
            traits.extend([SpatialWithinCircle, SpatialWithinPolygon, SpatialWithinBoundingBox]);
        }
        FieldType::Vector { .. } => {
            traits.insert(Knn);
        }
    }
    traits.extend([SortField, ProjectionField, AggregationTerms]);
    if field_type.is_orderable() {
        traits.insert(AggregationRange);
    }
    traits
}

/// Traits exposed by one value field instance.
pub fn value_traits(field: &ValueField) -> BTreeSet<FieldTrait> {
    use FieldTrait::*;

    type_traits(field.field_type)
        .into_iter()
        .filter(|t| match t {
            // Phrase matching needs positions, i.e. analyzed text.
            Phrase => field.searchable && field.is_analyzed(),
            // Analyzed text is tokenized; ranges over tokens are meaningless.
            Range => field.searchable && !field.is_analyzed(),
            SortField => field.sortable,
            ProjectionField => field.projectable,
            AggregationTerms | AggregationRange => field.aggregable,
            other => other.is_predicate() && field.searchable,
        })
        .collect()
}

/// Traits exposed by an object field.
pub fn object_traits(field: &ObjectField) -> BTreeSet<FieldTrait> {
    let mut traits = BTreeSet::from([FieldTrait::Exists, FieldTrait::Named]);
    if field.is_nested() {
        traits.insert(FieldTrait::Nested);
    }
    traits
}

/// Traits exposed by any schema node.
pub fn node_traits(node: &SchemaNode) -> BTreeSet<FieldTrait> {
    match node {
        SchemaNode::Value(field) => value_traits(field),
        SchemaNode::Object(field) => object_traits(field),
    }
}

/// True if `node` can be used through `usage`.
pub fn supports(node: &SchemaNode, usage: FieldTrait) -> bool {
    node_traits(node).contains(&usage)
}
