// SPDX-License-Identifier: PMPL-1.0-or-later
//! Fluent predicate construction.
//!
//! ```text
//! let f = PredicateFactory::new();
//! let q = f.and([
//!     f.match_field("title")?.matching("rust"),
//!     f.nested("authors", f.exists("name")?)?,
//!     f.named("authors.prolific").param("min", 3)?.build(),
//! ]);
//! ```
//!
//! Field paths are parsed strictly, so every method that takes one returns a
//! `Result`. A factory created with [`PredicateFactory::with_root`] prefixes
//! every path (and named-predicate name) with its root.

use fieldscope_schema::{AnalysisOverride, FieldPath};

use crate::ast::{BoolOperator, GeoPoint, PredicateKind, PredicateNode, RangeBound};
use crate::error::QueryError;
use crate::params::{ParamBag, ParamValue};

/// Entry point of the fluent predicate API.
#[derive(Debug, Clone, Default)]
pub struct PredicateFactory {
    root: Option<FieldPath>,
}

impl PredicateFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose paths are relative to `path` (itself relative to this factory's root).
    pub fn with_root(&self, path: &str) -> Result<Self, QueryError> {
        Ok(Self {
            root: Some(self.path(path)?),
        })
    }

    pub fn root(&self) -> Option<&FieldPath> {
        self.root.as_ref()
    }

    fn path(&self, raw: &str) -> Result<FieldPath, QueryError> {
        let relative = FieldPath::parse(raw)?;
        Ok(FieldPath::join_under(self.root.as_ref(), &relative))
    }

    fn paths(&self, raw: &[&str]) -> Result<Vec<FieldPath>, QueryError> {
        raw.iter().map(|p| self.path(p)).collect()
    }

    /// Generic leaf constructor; validates the field count against the kind.
    pub fn leaf(&self, fields: &[&str], kind: PredicateKind) -> Result<PredicateNode, QueryError> {
        let fields = self.paths(fields)?;
        validate_leaf(&fields, &kind)?;
        Ok(PredicateNode::leaf(fields, kind))
    }

    pub fn match_all(&self) -> PredicateNode {
        PredicateNode::match_all()
    }

    pub fn match_none(&self) -> PredicateNode {
        PredicateNode::match_none()
    }

    pub fn ids<I, S>(&self, ids: I) -> PredicateNode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PredicateNode::leaf(
            Vec::new(),
            PredicateKind::Ids {
                ids: ids.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn exists(&self, field: &str) -> Result<PredicateNode, QueryError> {
        self.leaf(&[field], PredicateKind::Exists)
    }

    pub fn match_field(&self, field: &str) -> Result<MatchStep, QueryError> {
        Ok(MatchStep {
            fields: vec![self.path(field)?],
            analysis: AnalysisOverride::None,
            fuzziness: 0,
            factory: self.clone(),
        })
    }

    pub fn phrase(&self, field: &str) -> Result<PhraseStep, QueryError> {
        Ok(PhraseStep {
            fields: vec![self.path(field)?],
            slop: 0,
            analysis: AnalysisOverride::None,
            factory: self.clone(),
        })
    }

    pub fn wildcard(&self, field: &str, pattern: &str) -> Result<PredicateNode, QueryError> {
        self.leaf(
            &[field],
            PredicateKind::Wildcard {
                pattern: pattern.to_string(),
            },
        )
    }

    /// Regular expression predicate; the pattern must match a whole term.
    pub fn regexp(&self, field: &str, pattern: &str) -> Result<PredicateNode, QueryError> {
        self.leaf(
            &[field],
            PredicateKind::Regexp {
                pattern: pattern.to_string(),
            },
        )
    }

    pub fn simple_query_string(&self) -> SimpleQueryStringStep {
        SimpleQueryStringStep {
            fields: Vec::new(),
            default_operator: BoolOperator::Or,
            analysis: AnalysisOverride::None,
            factory: self.clone(),
        }
    }

    pub fn range(&self, field: &str) -> Result<RangeStep, QueryError> {
        Ok(RangeStep {
            fields: vec![self.path(field)?],
            lower: None,
            upper: None,
            factory: self.clone(),
        })
    }

    pub fn within_circle(
        &self,
        field: &str,
        center: GeoPoint,
        radius_meters: f64,
    ) -> Result<PredicateNode, QueryError> {
        self.leaf(
            &[field],
            PredicateKind::SpatialWithinCircle {
                center,
                radius_meters,
            },
        )
    }

    pub fn within_polygon(
        &self,
        field: &str,
        points: Vec<GeoPoint>,
    ) -> Result<PredicateNode, QueryError> {
        self.leaf(&[field], PredicateKind::SpatialWithinPolygon { points })
    }

    pub fn within_bounding_box(
        &self,
        field: &str,
        top_left: GeoPoint,
        bottom_right: GeoPoint,
    ) -> Result<PredicateNode, QueryError> {
        self.leaf(
            &[field],
            PredicateKind::SpatialWithinBoundingBox {
                top_left,
                bottom_right,
            },
        )
    }

    pub fn knn(&self, field: &str, vector: Vec<f32>, k: usize) -> Result<PredicateNode, QueryError> {
        self.leaf(&[field], PredicateKind::Knn { vector, k })
    }

    /// Explicit nesting scope. Paths inside `inner` are relative to `path`,
    /// so build `inner` with a plain [`PredicateFactory::new`].
    pub fn nested(&self, path: &str, inner: PredicateNode) -> Result<PredicateNode, QueryError> {
        Ok(PredicateNode::nested(self.path(path)?, inner))
    }

    /// Conjunction; an empty conjunction matches every document.
    pub fn and(&self, clauses: impl IntoIterator<Item = PredicateNode>) -> PredicateNode {
        PredicateNode::Bool {
            operator: BoolOperator::And,
            clauses: clauses.into_iter().collect(),
        }
    }

    /// Disjunction; an empty disjunction matches no document.
    pub fn or(&self, clauses: impl IntoIterator<Item = PredicateNode>) -> PredicateNode {
        PredicateNode::Bool {
            operator: BoolOperator::Or,
            clauses: clauses.into_iter().collect(),
        }
    }

    pub fn not(&self, inner: PredicateNode) -> PredicateNode {
        PredicateNode::Not(Box::new(inner))
    }

    pub fn boost(&self, inner: PredicateNode, boost: f32) -> Result<PredicateNode, QueryError> {
        validate_boost(boost)?;
        Ok(PredicateNode::Boosted {
            inner: Box::new(inner),
            boost,
        })
    }

    pub fn constant_score(&self, inner: PredicateNode) -> PredicateNode {
        PredicateNode::ConstantScore(Box::new(inner))
    }

    /// Invoke a named predicate: `"<field path>.<name>"`, or `"<name>"` for the current root.
    pub fn named(&self, name: &str) -> NamedStep {
        NamedStep {
            name: match &self.root {
                Some(root) => format!("{}.{}", root, name),
                None => name.to_string(),
            },
            params: ParamBag::new(),
        }
    }
}

pub(crate) fn validate_boost(boost: f32) -> Result<(), QueryError> {
    if !boost.is_finite() || boost < 0.0 {
        return Err(QueryError::invalid(format!(
            "boost must be a finite, non-negative number, got {}",
            boost
        )));
    }
    Ok(())
}

/// Checks that do not need a schema.
pub(crate) fn validate_leaf(fields: &[FieldPath], kind: &PredicateKind) -> Result<(), QueryError> {
    match kind.usage() {
        None if !fields.is_empty() => {
            return Err(QueryError::invalid(format!(
                "{} does not target fields",
                kind.name()
            )))
        }
        None => return Ok(()),
        Some(_) if fields.is_empty() => {
            return Err(QueryError::invalid(format!(
                "{} requires at least one field",
                kind.name()
            )))
        }
        Some(_) if fields.len() > 1 && !kind.supports_multi_field() => {
            return Err(QueryError::invalid(format!(
                "{} targets exactly one field, got {}",
                kind.name(),
                fields.len()
            )))
        }
        Some(_) => {}
    }

    match kind {
        PredicateKind::Regexp { pattern } => {
            regex::Regex::new(pattern).map_err(|e| {
                QueryError::invalid(format!("invalid regular expression '{}': {}", pattern, e))
            })?;
        }
        PredicateKind::Range { lower: None, upper: None } => {
            return Err(QueryError::invalid("range requires at least one bound"));
        }
        PredicateKind::SpatialWithinCircle {
            center,
            radius_meters,
        } => {
            if !center.is_valid() || !radius_meters.is_finite() || *radius_meters < 0.0 {
                return Err(QueryError::invalid("invalid circle"));
            }
        }
        PredicateKind::SpatialWithinPolygon { points } => {
            if points.len() < 3 || !points.iter().all(GeoPoint::is_valid) {
                return Err(QueryError::invalid(
                    "polygon requires at least three valid points",
                ));
            }
        }
        PredicateKind::SpatialWithinBoundingBox {
            top_left,
            bottom_right,
        } => {
            if !top_left.is_valid()
                || !bottom_right.is_valid()
                || top_left.lat < bottom_right.lat
            {
                return Err(QueryError::invalid("invalid bounding box"));
            }
        }
        PredicateKind::Knn { vector, k } => {
            if vector.is_empty() || *k == 0 {
                return Err(QueryError::invalid("knn requires a vector and k > 0"));
            }
        }
        _ => {}
    }
    Ok(())
}

/// `match` under construction.
#[derive(Debug, Clone)]
pub struct MatchStep {
    fields: Vec<FieldPath>,
    analysis: AnalysisOverride,
    fuzziness: u32,
    factory: PredicateFactory,
}

impl MatchStep {
    /// Target an additional field.
    pub fn field(mut self, field: &str) -> Result<Self, QueryError> {
        self.fields.push(self.factory.path(field)?);
        Ok(self)
    }

    /// Analyze the query text with `name` instead of the field's analyzer.
    pub fn analyzer(mut self, name: &str) -> Self {
        self.analysis = AnalysisOverride::Analyzer(name.to_string());
        self
    }

    pub fn skip_analysis(mut self) -> Self {
        self.analysis = AnalysisOverride::Skip;
        self
    }

    pub fn fuzzy(mut self, max_edits: u32) -> Self {
        self.fuzziness = max_edits;
        self
    }

    pub fn matching(self, value: impl Into<ParamValue>) -> PredicateNode {
        PredicateNode::leaf(
            self.fields,
            PredicateKind::Match {
                value: value.into(),
                analysis: self.analysis,
                fuzziness: self.fuzziness,
            },
        )
    }
}

/// `phrase` under construction.
#[derive(Debug, Clone)]
pub struct PhraseStep {
    fields: Vec<FieldPath>,
    slop: u32,
    analysis: AnalysisOverride,
    factory: PredicateFactory,
}

impl PhraseStep {
    pub fn field(mut self, field: &str) -> Result<Self, QueryError> {
        self.fields.push(self.factory.path(field)?);
        Ok(self)
    }

    /// Number of extra positions allowed between phrase terms.
    pub fn slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    pub fn analyzer(mut self, name: &str) -> Self {
        self.analysis = AnalysisOverride::Analyzer(name.to_string());
        self
    }

    pub fn skip_analysis(mut self) -> Self {
        self.analysis = AnalysisOverride::Skip;
        self
    }

    pub fn matching(self, phrase: impl Into<String>) -> PredicateNode {
        PredicateNode::leaf(
            self.fields,
            PredicateKind::Phrase {
                phrase: phrase.into(),
                slop: self.slop,
                analysis: self.analysis,
            },
        )
    }
}

/// `simple-query-string` under construction.
#[derive(Debug, Clone)]
pub struct SimpleQueryStringStep {
    fields: Vec<FieldPath>,
    default_operator: BoolOperator,
    analysis: AnalysisOverride,
    factory: PredicateFactory,
}

impl SimpleQueryStringStep {
    pub fn field(mut self, field: &str) -> Result<Self, QueryError> {
        self.fields.push(self.factory.path(field)?);
        Ok(self)
    }

    pub fn default_operator(mut self, operator: BoolOperator) -> Self {
        self.default_operator = operator;
        self
    }

    pub fn analyzer(mut self, name: &str) -> Self {
        self.analysis = AnalysisOverride::Analyzer(name.to_string());
        self
    }

    pub fn skip_analysis(mut self) -> Self {
        self.analysis = AnalysisOverride::Skip;
        self
    }

    /// Finish with the query text; fails if no field was added.
    pub fn matching(self, query: impl Into<String>) -> Result<PredicateNode, QueryError> {
        let kind = PredicateKind::SimpleQueryString {
            query: query.into(),
            default_operator: self.default_operator,
            analysis: self.analysis,
        };
        validate_leaf(&self.fields, &kind)?;
        Ok(PredicateNode::leaf(self.fields, kind))
    }
}

/// `range` under construction.
#[derive(Debug, Clone)]
pub struct RangeStep {
    fields: Vec<FieldPath>,
    lower: Option<RangeBound>,
    upper: Option<RangeBound>,
    factory: PredicateFactory,
}

impl RangeStep {
    pub fn field(mut self, field: &str) -> Result<Self, QueryError> {
        self.fields.push(self.factory.path(field)?);
        Ok(self)
    }

    pub fn at_least(mut self, value: impl Into<ParamValue>) -> Self {
        self.lower = Some(RangeBound::inclusive(value));
        self
    }

    pub fn greater_than(mut self, value: impl Into<ParamValue>) -> Self {
        self.lower = Some(RangeBound::exclusive(value));
        self
    }

    pub fn at_most(mut self, value: impl Into<ParamValue>) -> Self {
        self.upper = Some(RangeBound::inclusive(value));
        self
    }

    pub fn less_than(mut self, value: impl Into<ParamValue>) -> Self {
        self.upper = Some(RangeBound::exclusive(value));
        self
    }

    /// Inclusive on both ends.
    pub fn between(self, lower: impl Into<ParamValue>, upper: impl Into<ParamValue>) -> Self {
        self.at_least(lower).at_most(upper)
    }

    pub fn build(self) -> Result<PredicateNode, QueryError> {
        let kind = PredicateKind::Range {
            lower: self.lower,
            upper: self.upper,
        };
        validate_leaf(&self.fields, &kind)?;
        Ok(PredicateNode::leaf(self.fields, kind))
    }
}

/// Named predicate invocation under construction.
#[derive(Debug, Clone)]
pub struct NamedStep {
    name: String,
    params: ParamBag,
}

impl NamedStep {
    /// Bind a parameter; each name may be bound once.
    pub fn param(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<Self, QueryError> {
        self.params.insert(name, value)?;
        Ok(self)
    }

    pub fn build(self) -> PredicateNode {
        PredicateNode::Named {
            name: self.name,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_with_root_prefixes_paths() {
        let f = PredicateFactory::new().with_root("nested").unwrap();
        let node = f.exists("field").unwrap();
        assert_eq!(
            node,
            PredicateNode::leaf(vec![path("nested.field")], PredicateKind::Exists)
        );
        let deeper = f.with_root("inner").unwrap();
        assert_eq!(deeper.root(), Some(&path("nested.inner")));
        match deeper.named("recent").build() {
            PredicateNode::Named { name, .. } => assert_eq!(name, "nested.inner.recent"),
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_match_step() {
        let f = PredicateFactory::new();
        let node = f
            .match_field("title")
            .unwrap()
            .field("summary")
            .unwrap()
            .analyzer("whitespace")
            .fuzzy(1)
            .matching("rust");
        match node {
            PredicateNode::Leaf(leaf) => {
                assert_eq!(leaf.fields, vec![path("title"), path("summary")]);
                assert_eq!(
                    leaf.kind,
                    PredicateKind::Match {
                        value: ParamValue::from("rust"),
                        analysis: AnalysisOverride::Analyzer("whitespace".to_string()),
                        fuzziness: 1,
                    }
                );
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_paths_rejected() {
        let f = PredicateFactory::new();
        assert!(f.exists("a..b").is_err());
        assert!(f.match_field("").is_err());
        assert!(f.with_root(".x").is_err());
    }

    #[test]
    fn test_leaf_validation() {
        let f = PredicateFactory::new();
        assert!(f.leaf(&["a", "b"], PredicateKind::Exists).is_err());
        assert!(f.leaf(&[], PredicateKind::Exists).is_err());
        assert!(f.leaf(&["a"], PredicateKind::MatchAll).is_err());
        assert!(f.regexp("a", "(").is_err());
        assert!(f.range("a").unwrap().build().is_err());
        assert!(f.knn("v", vec![], 3).is_err());
        assert!(f
            .within_polygon("g", vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)])
            .is_err());
        assert!(f.simple_query_string().matching("x").is_err());
        assert!(f
            .leaf(
                &["a", "b"],
                PredicateKind::Wildcard {
                    pattern: "x*".to_string()
                }
            )
            .is_ok());
    }

    #[test]
    fn test_boost_validation() {
        let f = PredicateFactory::new();
        assert!(f.boost(f.match_all(), 2.5).is_ok());
        assert!(f.boost(f.match_all(), -1.0).is_err());
        assert!(f.boost(f.match_all(), f32::NAN).is_err());
    }

    #[test]
    fn test_named_step_is_write_once() {
        let f = PredicateFactory::new();
        let step = f.named("recent").param("days", 7).unwrap();
        assert!(matches!(
            step.param("days", 8),
            Err(QueryError::DuplicateNamedParameter(_))
        ));
    }

    #[test]
    fn test_empty_bool_shapes() {
        let f = PredicateFactory::new();
        assert_eq!(
            f.and([]),
            PredicateNode::Bool {
                operator: BoolOperator::And,
                clauses: vec![]
            }
        );
        assert_eq!(f.or([]).leaf_count(), 0);
    }
}
