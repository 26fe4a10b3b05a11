// SPDX-License-Identifier: PMPL-1.0-or-later
//! Predicate tree.
//!
//! [`PredicateNode`] is a closed tagged union produced by the
//! [`PredicateFactory`](crate::factory::PredicateFactory) and consumed by the
//! compiler. Nodes are immutable values; rewriting builds new trees.
//!
//! Paths in an authored tree are relative: top-level paths start at the index
//! root and paths inside `Nested { path, inner }` start at `path`. A compiled
//! tree uses absolute paths throughout.

use fieldscope_schema::{AnalysisOverride, FieldPath, FieldTrait};
use serde::{Deserialize, Serialize};

use crate::params::{ParamBag, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOperator {
    And,
    Or,
}

/// WGS84 coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// One end of a range predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBound {
    pub value: ParamValue,
    pub inclusive: bool,
}

impl RangeBound {
    pub fn inclusive(value: impl Into<ParamValue>) -> Self {
        Self {
            value: value.into(),
            inclusive: true,
        }
    }

    pub fn exclusive(value: impl Into<ParamValue>) -> Self {
        Self {
            value: value.into(),
            inclusive: false,
        }
    }
}

/// What a leaf predicate tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateKind {
    Match {
        value: ParamValue,
        #[serde(default)]
        analysis: AnalysisOverride,
        /// Maximum edit distance per term; 0 means exact terms.
        #[serde(default)]
        fuzziness: u32,
    },
    Phrase {
        phrase: String,
        #[serde(default)]
        slop: u32,
        #[serde(default)]
        analysis: AnalysisOverride,
    },
    Wildcard {
        pattern: String,
    },
    Regexp {
        pattern: String,
    },
    SimpleQueryString {
        query: String,
        default_operator: BoolOperator,
        #[serde(default)]
        analysis: AnalysisOverride,
    },
    Range {
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
    Exists,
    SpatialWithinCircle {
        center: GeoPoint,
        radius_meters: f64,
    },
    SpatialWithinPolygon {
        points: Vec<GeoPoint>,
    },
    SpatialWithinBoundingBox {
        top_left: GeoPoint,
        bottom_right: GeoPoint,
    },
    Knn {
        vector: Vec<f32>,
        k: usize,
    },
    MatchAll,
    MatchNone,
    Ids {
        ids: Vec<String>,
    },
}

impl PredicateKind {
    /// The field trait this kind requires, or `None` for fieldless kinds.
    pub fn usage(&self) -> Option<FieldTrait> {
        Some(match self {
            PredicateKind::Match { .. } => FieldTrait::Match,
            PredicateKind::Phrase { .. } => FieldTrait::Phrase,
            PredicateKind::Wildcard { .. } => FieldTrait::Wildcard,
            PredicateKind::Regexp { .. } => FieldTrait::Regexp,
            PredicateKind::SimpleQueryString { .. } => FieldTrait::SimpleQueryString,
            PredicateKind::Range { .. } => FieldTrait::Range,
            PredicateKind::Exists => FieldTrait::Exists,
            PredicateKind::SpatialWithinCircle { .. } => FieldTrait::SpatialWithinCircle,
            PredicateKind::SpatialWithinPolygon { .. } => FieldTrait::SpatialWithinPolygon,
            PredicateKind::SpatialWithinBoundingBox { .. } => {
                FieldTrait::SpatialWithinBoundingBox
            }
            PredicateKind::Knn { .. } => FieldTrait::Knn,
            PredicateKind::MatchAll | PredicateKind::MatchNone | PredicateKind::Ids { .. } => {
                return None
            }
        })
    }

    /// Kinds that accept several target fields at once.
    pub fn supports_multi_field(&self) -> bool {
        matches!(
            self,
            PredicateKind::Match { .. }
                | PredicateKind::Phrase { .. }
                | PredicateKind::SimpleQueryString { .. }
                | PredicateKind::Wildcard { .. }
                | PredicateKind::Regexp { .. }
                | PredicateKind::Range { .. }
        )
    }

    /// Analysis requested by the invocation (text kinds only).
    pub fn analysis(&self) -> AnalysisOverride {
        match self {
            PredicateKind::Match { analysis, .. }
            | PredicateKind::Phrase { analysis, .. }
            | PredicateKind::SimpleQueryString { analysis, .. } => analysis.clone(),
            _ => AnalysisOverride::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.usage() {
            Some(usage) => usage.name(),
            None => match self {
                PredicateKind::MatchAll => "match-all",
                PredicateKind::MatchNone => "match-none",
                _ => "ids",
            },
        }
    }
}

/// A predicate on one or more fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafPredicate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldPath>,
    #[serde(flatten)]
    pub kind: PredicateKind,
}

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateNode {
    Leaf(LeafPredicate),
    Bool {
        operator: BoolOperator,
        clauses: Vec<PredicateNode>,
    },
    Not(Box<PredicateNode>),
    /// Evaluate `inner` within single instances of the nested object at `path`.
    Nested {
        path: FieldPath,
        inner: Box<PredicateNode>,
    },
    /// Invocation of a registered named predicate, `"<field path>.<name>"` or `"<name>"`.
    Named {
        name: String,
        #[serde(default)]
        params: ParamBag,
    },
    Boosted {
        inner: Box<PredicateNode>,
        boost: f32,
    },
    ConstantScore(Box<PredicateNode>),
}

impl PredicateNode {
    pub fn leaf(fields: Vec<FieldPath>, kind: PredicateKind) -> Self {
        PredicateNode::Leaf(LeafPredicate { fields, kind })
    }

    pub fn match_all() -> Self {
        Self::leaf(Vec::new(), PredicateKind::MatchAll)
    }

    pub fn match_none() -> Self {
        Self::leaf(Vec::new(), PredicateKind::MatchNone)
    }

    pub fn nested(path: FieldPath, inner: PredicateNode) -> Self {
        PredicateNode::Nested {
            path,
            inner: Box::new(inner),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, PredicateNode::Leaf(_))
    }

    /// Number of leaf predicates in the tree (named invocations count as none).
    pub fn leaf_count(&self) -> usize {
        match self {
            PredicateNode::Leaf(_) => 1,
            PredicateNode::Named { .. } => 0,
            PredicateNode::Bool { clauses, .. } => clauses.iter().map(Self::leaf_count).sum(),
            PredicateNode::Not(inner)
            | PredicateNode::Nested { inner, .. }
            | PredicateNode::Boosted { inner, .. }
            | PredicateNode::ConstantScore(inner) => inner.leaf_count(),
        }
    }

    /// Depth-first visit of every leaf.
    pub fn for_each_leaf<'a>(&'a self, visit: &mut impl FnMut(&'a LeafPredicate)) {
        match self {
            PredicateNode::Leaf(leaf) => visit(leaf),
            PredicateNode::Named { .. } => {}
            PredicateNode::Bool { clauses, .. } => {
                for clause in clauses {
                    clause.for_each_leaf(visit);
                }
            }
            PredicateNode::Not(inner)
            | PredicateNode::Nested { inner, .. }
            | PredicateNode::Boosted { inner, .. }
            | PredicateNode::ConstantScore(inner) => inner.for_each_leaf(visit),
        }
    }
}
