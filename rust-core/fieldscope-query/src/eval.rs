// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-memory reference evaluator.
//!
//! [`MemoryCorpus`] holds JSON documents per index and runs a
//! [`CompiledQuery`] over them with nested-object semantics: a `Nested` scope
//! matches when a single instance of the nested object satisfies its inner
//! predicate, while leaves outside any scope see the pooled values of every
//! instance. It exists to check that differently authored predicates select
//! the same documents, not to be fast.
//!
//! Text analysis is deliberately simple. Every analyzer lowercases and splits
//! on non-alphanumeric characters, every normalizer lowercases, and raw terms
//! are compared verbatim.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use fieldscope_schema::{
    DistanceMetric, FieldPath, FieldType, QueryAnalysis, Schema, SchemaNode, ValueField,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::ast::{BoolOperator, GeoPoint, LeafPredicate, PredicateKind, PredicateNode, RangeBound};
use crate::compiler::CompiledQuery;
use crate::error::QueryError;
use crate::params::ParamValue;
use crate::scope::SearchScope;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A matching document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hit {
    pub index: String,
    pub id: String,
}

impl Hit {
    pub fn new(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
        }
    }
}

/// JSON documents grouped by index name, then by document id.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    documents: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Documents selected by each knn leaf, keyed by depth-first leaf ordinal.
type KnnSelection = HashMap<usize, HashSet<(String, String)>>;

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document; returns the replaced one.
    pub fn add(
        &mut self,
        index: impl Into<String>,
        id: impl Into<String>,
        document: Value,
    ) -> Option<Value> {
        self.documents
            .entry(index.into())
            .or_default()
            .insert(id.into(), document)
    }

    pub fn len(&self) -> usize {
        self.documents.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents of `scope` matching `query`, in scope order then id order.
    ///
    /// Fails if the query was compiled for another set of indexes.
    pub fn search(
        &self,
        scope: &SearchScope,
        query: &CompiledQuery,
    ) -> Result<Vec<Hit>, QueryError> {
        query.ensure_scope(scope)?;
        let knn = self.knn_selection(scope, query.predicate());

        let mut hits = Vec::new();
        for index in scope.indexes() {
            let Some(documents) = self.documents.get(index.name()) else {
                continue;
            };
            for (id, document) in documents {
                let evaluator = Evaluator {
                    schema: index.schema(),
                    index: index.name(),
                    id,
                    knn: &knn,
                };
                let root = Context {
                    value: document,
                    base: None,
                };
                if evaluator.matches(query.predicate(), root, 0)? {
                    hits.push(Hit::new(index.name(), id.as_str()));
                }
            }
        }
        debug!(hits = hits.len(), indexes = scope.len(), "Corpus searched");
        Ok(hits)
    }

    fn knn_selection(&self, scope: &SearchScope, predicate: &PredicateNode) -> KnnSelection {
        let mut selection = KnnSelection::new();
        let mut ordinal = 0;
        predicate.for_each_leaf(&mut |leaf| {
            if let (PredicateKind::Knn { vector, k }, Some(field)) = (&leaf.kind, leaf.fields.first())
            {
                let nearest = self.nearest(scope, field, vector, *k);
                selection.insert(ordinal, nearest);
            }
            ordinal += 1;
        });
        selection
    }

    /// The `k` documents closest to `query` across the whole scope.
    fn nearest(
        &self,
        scope: &SearchScope,
        field: &FieldPath,
        query: &[f32],
        k: usize,
    ) -> HashSet<(String, String)> {
        let mut scored: Vec<(f32, &str, &str)> = Vec::new();
        for index in scope.indexes() {
            let metric = match index.schema().node(field).and_then(SchemaNode::as_value) {
                Some(ValueField {
                    field_type: FieldType::Vector { metric, .. },
                    ..
                }) => *metric,
                _ => continue,
            };
            let Some(documents) = self.documents.get(index.name()) else {
                continue;
            };
            for (id, document) in documents {
                let mut values = Vec::new();
                collect(document, field.segments(), &mut values, true);
                let best = values
                    .into_iter()
                    .filter_map(as_vector)
                    .filter(|v| v.len() == query.len())
                    .map(|v| distance(metric, query, &v))
                    .min_by(f32::total_cmp);
                if let Some(best) = best {
                    scored.push((best, index.name(), id));
                }
            }
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| (a.1, a.2).cmp(&(b.1, b.2))));
        scored
            .into_iter()
            .take(k)
            .map(|(_, index, id)| (index.to_string(), id.to_string()))
            .collect()
    }
}

/// The JSON value a predicate is evaluated against, and its absolute path.
#[derive(Debug, Clone, Copy)]
struct Context<'a> {
    value: &'a Value,
    /// `None` for the document root, otherwise the nested scope of `value`.
    base: Option<&'a FieldPath>,
}

struct Evaluator<'a> {
    schema: &'a Schema,
    index: &'a str,
    id: &'a str,
    knn: &'a KnnSelection,
}

impl<'a> Evaluator<'a> {
    /// `ordinal` is the depth-first ordinal of the first leaf under `node`.
    fn matches(
        &self,
        node: &'a PredicateNode,
        ctx: Context<'a>,
        ordinal: usize,
    ) -> Result<bool, QueryError> {
        match node {
            PredicateNode::Leaf(leaf) => self.leaf(leaf, ctx, ordinal),
            PredicateNode::Bool { operator, clauses } => {
                let mut next = ordinal;
                for clause in clauses {
                    let matched = self.matches(clause, ctx, next)?;
                    next += clause.leaf_count();
                    match operator {
                        BoolOperator::And if !matched => return Ok(false),
                        BoolOperator::Or if matched => return Ok(true),
                        _ => {}
                    }
                }
                Ok(*operator == BoolOperator::And)
            }
            PredicateNode::Not(inner) => Ok(!self.matches(inner, ctx, ordinal)?),
            PredicateNode::Nested { path, inner } => {
                for instance in self.values(path, ctx)? {
                    let scoped = Context {
                        value: instance,
                        base: Some(path),
                    };
                    if instance.is_object() && self.matches(inner, scoped, ordinal)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            PredicateNode::Named { name, .. } => Err(QueryError::UnsupportedEvaluation(format!(
                "named predicate '{}' was not expanded",
                name
            ))),
            PredicateNode::Boosted { inner, .. } | PredicateNode::ConstantScore(inner) => {
                self.matches(inner, ctx, ordinal)
            }
        }
    }

    fn leaf(
        &self,
        leaf: &'a LeafPredicate,
        ctx: Context<'a>,
        ordinal: usize,
    ) -> Result<bool, QueryError> {
        match &leaf.kind {
            PredicateKind::MatchAll => Ok(true),
            PredicateKind::MatchNone => Ok(false),
            PredicateKind::Ids { ids } => Ok(ids.iter().any(|id| id == self.id)),
            PredicateKind::Exists => self.any_field(leaf, ctx, |node, values| {
                Ok(values.iter().any(|v| holds_value(node, v)))
            }),
            PredicateKind::Match {
                value,
                analysis,
                fuzziness,
            } => self.any_value_field(leaf, ctx, |field, values| {
                Ok(match value {
                    ParamValue::String(text) => {
                        let query = analyze(text, &field.query_analysis(analysis));
                        let index = index_analysis(field);
                        values.iter().filter_map(|v| text_of(v)).any(|doc| {
                            analyze(&doc, &index).iter().any(|term| {
                                query.iter().any(|q| term_matches(q, term, *fuzziness))
                            })
                        })
                    }
                    ParamValue::Int(_) | ParamValue::Float(_) => {
                        values.iter().any(|v| v.as_f64() == value.as_f64())
                    }
                    ParamValue::Bool(expected) => values.iter().any(|v| v.as_bool() == Some(*expected)),
                    ParamValue::Vector(_) | ParamValue::Null => false,
                })
            }),
            PredicateKind::Phrase {
                phrase,
                slop,
                analysis,
            } => self.any_value_field(leaf, ctx, |field, values| {
                let query = analyze(phrase, &field.query_analysis(analysis));
                let index = index_analysis(field);
                Ok(values
                    .iter()
                    .filter_map(|v| text_of(v))
                    .any(|doc| phrase_matches(&query, &analyze(&doc, &index), *slop)))
            }),
            PredicateKind::Wildcard { pattern } => {
                let regex = wildcard_regex(pattern)?;
                self.any_term(leaf, ctx, &regex)
            }
            PredicateKind::Regexp { pattern } => {
                let regex = Regex::new(&format!("^(?:{})$", pattern))
                    .map_err(|e| QueryError::invalid(e.to_string()))?;
                self.any_term(leaf, ctx, &regex)
            }
            PredicateKind::SimpleQueryString {
                query,
                default_operator,
                analysis,
            } => {
                let mut targets = Vec::new();
                for field in &leaf.fields {
                    if let Some(value_field) = self.value_field(field) {
                        let index = index_analysis(value_field);
                        let terms: Vec<String> = self
                            .values(field, ctx)?
                            .into_iter()
                            .filter_map(text_of)
                            .flat_map(|doc| analyze(&doc, &index))
                            .collect();
                        targets.push((value_field.query_analysis(analysis), terms));
                    }
                }
                Ok(simple_query_matches(query, *default_operator, &targets))
            }
            PredicateKind::Range { lower, upper } => self.any_field(leaf, ctx, |_, values| {
                Ok(values
                    .iter()
                    .any(|v| within(v, lower.as_ref(), upper.as_ref())))
            }),
            PredicateKind::SpatialWithinCircle {
                center,
                radius_meters,
            } => self.any_point(leaf, ctx, |p| haversine_meters(center, p) <= *radius_meters),
            PredicateKind::SpatialWithinPolygon { points } => {
                self.any_point(leaf, ctx, |p| in_polygon(p, points))
            }
            PredicateKind::SpatialWithinBoundingBox {
                top_left,
                bottom_right,
            } => self.any_point(leaf, ctx, |p| in_bounding_box(p, top_left, bottom_right)),
            PredicateKind::Knn { .. } => {
                let selected = self
                    .knn
                    .get(&ordinal)
                    .is_some_and(|s| s.contains(&(self.index.to_string(), self.id.to_string())));
                if !selected {
                    return Ok(false);
                }
                self.any_field(leaf, ctx, |_, values| Ok(!values.is_empty()))
            }
        }
    }

    fn value_field(&self, path: &FieldPath) -> Option<&'a ValueField> {
        self.schema.node(path).and_then(SchemaNode::as_value)
    }

    /// Values at `path` relative to `ctx`, with arrays flattened.
    fn values(&self, path: &FieldPath, ctx: Context<'a>) -> Result<Vec<&'a Value>, QueryError> {
        let segments = match ctx.base {
            None => path.segments(),
            Some(base) if path.starts_with(base) => &path.segments()[base.len()..],
            Some(base) => {
                return Err(QueryError::UnsupportedEvaluation(format!(
                    "field '{}' is outside of nested scope '{}'",
                    path, base
                )))
            }
        };
        let mut out = Vec::new();
        collect(ctx.value, segments, &mut out, false);
        Ok(out)
    }

    /// True if any target field present in this index satisfies `test`.
    fn any_field<F>(&self, leaf: &LeafPredicate, ctx: Context<'a>, test: F) -> Result<bool, QueryError>
    where
        F: Fn(&'a SchemaNode, &[&'a Value]) -> Result<bool, QueryError>,
    {
        for field in &leaf.fields {
            let Some(node) = self.schema.node(field) else {
                continue;
            };
            let values = self.values(field, ctx)?;
            if test(node, &values)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn any_value_field<F>(
        &self,
        leaf: &LeafPredicate,
        ctx: Context<'a>,
        test: F,
    ) -> Result<bool, QueryError>
    where
        F: Fn(&'a ValueField, &[&'a Value]) -> Result<bool, QueryError>,
    {
        self.any_field(leaf, ctx, |node, values| match node.as_value() {
            Some(field) => test(field, values),
            None => Ok(false),
        })
    }

    fn any_term(&self, leaf: &LeafPredicate, ctx: Context<'a>, regex: &Regex) -> Result<bool, QueryError> {
        self.any_value_field(leaf, ctx, |field, values| {
            let index = index_analysis(field);
            Ok(values
                .iter()
                .filter_map(|v| text_of(v))
                .any(|doc| analyze(&doc, &index).iter().any(|t| regex.is_match(t))))
        })
    }

    fn any_point<F>(&self, leaf: &LeafPredicate, ctx: Context<'a>, test: F) -> Result<bool, QueryError>
    where
        F: Fn(&GeoPoint) -> bool,
    {
        self.any_field(leaf, ctx, |_, values| {
            Ok(values.iter().filter_map(|v| as_point(v)).any(|p| test(&p)))
        })
    }
}

/// Walk `segments` from `value`, descending into arrays at every level.
///
/// With `keep_vectors`, a terminal array of numbers is kept whole.
fn collect<'v>(value: &'v Value, segments: &[String], out: &mut Vec<&'v Value>, keep_vectors: bool) {
    match value {
        Value::Array(items)
            if !(keep_vectors && segments.is_empty() && items.iter().all(Value::is_number)) =>
        {
            for item in items {
                collect(item, segments, out, keep_vectors);
            }
        }
        _ => match segments.split_first() {
            None => out.push(value),
            Some((head, rest)) => {
                if let Some(child) = value.get(head.as_str()) {
                    collect(child, rest, out, keep_vectors);
                }
            }
        },
    }
}

/// True if `value` holds a non-null value for some value field under `node`.
fn holds_value(node: &SchemaNode, value: &Value) -> bool {
    match (node, value) {
        (_, Value::Null) => false,
        (_, Value::Array(items)) => items.iter().any(|item| holds_value(node, item)),
        (SchemaNode::Value(_), _) => true,
        (SchemaNode::Object(object), _) => object
            .children()
            .any(|(name, child)| value.get(name).is_some_and(|v| holds_value(child, v))),
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_point(value: &Value) -> Option<GeoPoint> {
    Some(GeoPoint::new(
        value.get("lat")?.as_f64()?,
        value.get("lon")?.as_f64()?,
    ))
}

fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|x| x as f32))
        .collect()
}

/// Analysis applied to document text at index time.
fn index_analysis(field: &ValueField) -> QueryAnalysis {
    match (&field.analyzer, &field.normalizer) {
        (Some(analyzer), _) => QueryAnalysis::Analyzer(analyzer.clone()),
        (None, Some(normalizer)) => QueryAnalysis::Normalizer(normalizer.clone()),
        (None, None) => QueryAnalysis::Raw,
    }
}

fn analyze(text: &str, analysis: &QueryAnalysis) -> Vec<String> {
    match analysis {
        QueryAnalysis::Analyzer(_) => text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect(),
        QueryAnalysis::Normalizer(_) => vec![text.to_lowercase()],
        QueryAnalysis::Raw => vec![text.to_string()],
    }
}

fn term_matches(query: &str, term: &str, fuzziness: u32) -> bool {
    match fuzziness {
        0 => query == term,
        max => edit_distance(query, term) <= max as usize,
    }
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

/// In-order phrase match allowing `slop` extra positions between terms.
fn phrase_matches(query: &[String], doc: &[String], slop: u32) -> bool {
    let Some((first, rest)) = query.split_first() else {
        return false;
    };
    doc.iter()
        .enumerate()
        .filter(|(_, term)| *term == first)
        .any(|(start, _)| {
            let mut position = start;
            for term in rest {
                match doc[position + 1..].iter().position(|t| t == term) {
                    Some(offset) => position += offset + 1,
                    None => return false,
                }
            }
            position - start - rest.len() <= slop as usize
        })
}

fn wildcard_regex(pattern: &str) -> Result<Regex, QueryError> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| QueryError::invalid(e.to_string()))
}

/// Bag-of-terms query: `+term` is required, `-term` is excluded and plain
/// terms are combined with `operator`.
fn simple_query_matches(
    query: &str,
    operator: BoolOperator,
    targets: &[(QueryAnalysis, Vec<String>)],
) -> bool {
    let found = |raw: &str| {
        targets.iter().any(|(analysis, terms)| {
            let query_terms = analyze(raw, analysis);
            !query_terms.is_empty() && query_terms.iter().all(|q| terms.contains(q))
        })
    };

    let mut required = Vec::new();
    let mut excluded = Vec::new();
    let mut optional = Vec::new();
    for token in query.split_whitespace() {
        if let Some(term) = token.strip_prefix('+') {
            required.push(found(term));
        } else if let Some(term) = token.strip_prefix('-') {
            excluded.push(found(term));
        } else {
            optional.push(found(token));
        }
    }

    if required.is_empty() && excluded.is_empty() && optional.is_empty() {
        return false;
    }
    if !required.iter().all(|m| *m) || excluded.iter().any(|m| *m) {
        return false;
    }
    match operator {
        BoolOperator::And => optional.iter().all(|m| *m),
        BoolOperator::Or => {
            optional.is_empty() || !required.is_empty() || optional.iter().any(|m| *m)
        }
    }
}

fn compare(value: &Value, bound: &ParamValue) -> Option<Ordering> {
    match (value, bound) {
        (Value::Number(n), ParamValue::Int(_) | ParamValue::Float(_)) => {
            n.as_f64()?.partial_cmp(&bound.as_f64()?)
        }
        (Value::String(s), ParamValue::String(b)) => Some(s.as_str().cmp(b.as_str())),
        (Value::Bool(a), ParamValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn within(value: &Value, lower: Option<&RangeBound>, upper: Option<&RangeBound>) -> bool {
    let satisfies = |bound: Option<&RangeBound>, wanted: Ordering| match bound {
        None => true,
        Some(bound) => match compare(value, &bound.value) {
            Some(Ordering::Equal) => bound.inclusive,
            Some(ordering) => ordering == wanted,
            None => false,
        },
    };
    satisfies(lower, Ordering::Greater) && satisfies(upper, Ordering::Less)
}

fn haversine_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_METERS * 2.0 * h.sqrt().asin()
}

/// Ray casting, treating coordinates as planar.
fn in_polygon(point: &GeoPoint, polygon: &[GeoPoint]) -> bool {
    let mut inside = false;
    let mut previous = match polygon.last() {
        Some(last) => last,
        None => return false,
    };
    for current in polygon {
        if (current.lat > point.lat) != (previous.lat > point.lat)
            && point.lon
                < (previous.lon - current.lon) * (point.lat - current.lat)
                    / (previous.lat - current.lat)
                    + current.lon
        {
            inside = !inside;
        }
        previous = current;
    }
    inside
}

fn in_bounding_box(point: &GeoPoint, top_left: &GeoPoint, bottom_right: &GeoPoint) -> bool {
    let lat_ok = point.lat <= top_left.lat && point.lat >= bottom_right.lat;
    let lon_ok = if top_left.lon <= bottom_right.lon {
        point.lon >= top_left.lon && point.lon <= bottom_right.lon
    } else {
        // Crosses the antimeridian.
        point.lon >= top_left.lon || point.lon <= bottom_right.lon
    };
    lat_ok && lon_ok
}

fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => {
            let mut dot = 0.0f32;
            let mut norm_a = 0.0f32;
            let mut norm_b = 0.0f32;
            for (x, y) in a.iter().zip(b.iter()) {
                dot += x * y;
                norm_a += x * x;
                norm_b += y * y;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom > 0.0 {
                1.0 - dot / denom
            } else {
                1.0
            }
        }
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt(),
        // Lower is closer.
        DistanceMetric::DotProduct => -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::QueryCompiler;
    use crate::factory::PredicateFactory;
    use crate::scope::TargetIndex;
    use fieldscope_schema::{ObjectField, ValueField};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder("books")
            .value("title", ValueField::text("english"))
            .value("code", ValueField::keyword().with_normalizer("lowercase"))
            .value("year", ValueField::new(FieldType::Integer))
            .value("location", ValueField::new(FieldType::GeoPoint))
            .value(
                "embedding",
                ValueField::new(FieldType::Vector {
                    dimension: 2,
                    metric: DistanceMetric::Euclidean,
                }),
            )
            .object(
                "authors",
                ObjectField::nested()
                    .value("first", ValueField::keyword())
                    .value("last", ValueField::keyword()),
            )
            .build()
            .unwrap()
    }

    fn fixture() -> (SearchScope, MemoryCorpus) {
        let scope = SearchScope::single(TargetIndex::new(schema()));
        let mut corpus = MemoryCorpus::new();
        corpus.add(
            "books",
            "1",
            json!({
                "title": "The Rust Programming Language",
                "code": "RUST-1",
                "year": 2018,
                "location": {"lat": 48.8566, "lon": 2.3522},
                "embedding": [1.0, 0.0],
                "authors": [
                    {"first": "Steve", "last": "Klabnik"},
                    {"first": "Carol", "last": "Nichols"}
                ]
            }),
        );
        corpus.add(
            "books",
            "2",
            json!({
                "title": "Programming in Lua",
                "code": "LUA-4",
                "year": 2016,
                "location": {"lat": -22.9068, "lon": -43.1729},
                "embedding": [0.0, 1.0],
                "authors": {"first": "Roberto", "last": "Ierusalimschy"}
            }),
        );
        (scope, corpus)
    }

    fn ids(scope: &SearchScope, corpus: &MemoryCorpus, query: &PredicateNode) -> Vec<String> {
        let compiled = QueryCompiler::default().compile(scope, query).unwrap();
        corpus
            .search(scope, &compiled)
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect()
    }

    #[test]
    fn test_nested_scope_requires_single_instance() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        let same_author = f.nested(
            "authors",
            f.and([
                f.match_field("first").unwrap().matching("Steve"),
                f.match_field("last").unwrap().matching("Nichols"),
            ]),
        );
        assert!(ids(&scope, &corpus, &same_author.unwrap()).is_empty());

        let real_author = f.nested(
            "authors",
            f.and([
                f.match_field("first").unwrap().matching("Carol"),
                f.match_field("last").unwrap().matching("Nichols"),
            ]),
        );
        assert_eq!(ids(&scope, &corpus, &real_author.unwrap()), vec!["1"]);
    }

    #[test]
    fn test_text_analysis() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        assert_eq!(
            ids(&scope, &corpus, &f.match_field("title").unwrap().matching("RUST")),
            vec!["1"]
        );
        assert_eq!(
            ids(&scope, &corpus, &f.match_field("code").unwrap().matching("lua-4")),
            vec!["2"]
        );
        assert_eq!(
            ids(
                &scope,
                &corpus,
                &f.match_field("title").unwrap().fuzzy(1).matching("progamming")
            ),
            vec!["1", "2"]
        );
        assert!(ids(
            &scope,
            &corpus,
            &f.match_field("title").unwrap().skip_analysis().matching("Rust")
        )
        .is_empty());
    }

    #[test]
    fn test_phrase_with_slop() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        assert_eq!(
            ids(&scope, &corpus, &f.phrase("title").unwrap().matching("rust programming")),
            vec!["1"]
        );
        assert!(ids(&scope, &corpus, &f.phrase("title").unwrap().matching("rust language")).is_empty());
        assert_eq!(
            ids(
                &scope,
                &corpus,
                &f.phrase("title").unwrap().slop(1).matching("rust language")
            ),
            vec!["1"]
        );
    }

    #[test]
    fn test_patterns_and_simple_query_string() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        assert_eq!(ids(&scope, &corpus, &f.wildcard("code", "lua-?").unwrap()), vec!["2"]);
        assert_eq!(ids(&scope, &corpus, &f.regexp("title", "lan.*").unwrap()), vec!["1"]);

        let sqs = f
            .simple_query_string()
            .field("title")
            .unwrap()
            .matching("programming -lua")
            .unwrap();
        assert_eq!(ids(&scope, &corpus, &sqs), vec!["1"]);
    }

    #[test]
    fn test_range_and_exists() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        let recent = f.range("year").unwrap().at_least(2017).build().unwrap();
        assert_eq!(ids(&scope, &corpus, &recent), vec!["1"]);
        let exclusive = f.range("year").unwrap().greater_than(2016).less_than(2018).build().unwrap();
        assert!(ids(&scope, &corpus, &exclusive).is_empty());
        assert_eq!(ids(&scope, &corpus, &f.exists("authors").unwrap()), vec!["1", "2"]);
    }

    #[test]
    fn test_exists_on_object_needs_a_value_beneath() {
        let schema = Schema::builder("docs")
            .object("flat", ObjectField::flattened().value("z", ValueField::keyword()))
            .object(
                "n",
                ObjectField::nested()
                    .value("x", ValueField::keyword())
                    .object("inner", ObjectField::flattened().value("y", ValueField::keyword())),
            )
            .build()
            .unwrap();
        let scope = SearchScope::single(TargetIndex::new(schema));
        let mut corpus = MemoryCorpus::new();
        corpus.add("docs", "empty_flat", json!({"flat": {}}));
        corpus.add("docs", "null_child", json!({"flat": {"z": null}}));
        corpus.add("docs", "empty_nested", json!({"n": [{}]}));
        corpus.add("docs", "empty_inner", json!({"n": [{"inner": {"y": null}}]}));
        corpus.add("docs", "undeclared_child", json!({"flat": {"other": "v"}}));
        corpus.add(
            "docs",
            "full",
            json!({"flat": {"z": "v"}, "n": [{}, {"inner": {"y": "w"}}]}),
        );

        let f = PredicateFactory::new();
        assert_eq!(ids(&scope, &corpus, &f.exists("flat").unwrap()), vec!["full"]);
        assert_eq!(ids(&scope, &corpus, &f.exists("n").unwrap()), vec!["full"]);
        assert_eq!(ids(&scope, &corpus, &f.exists("n.inner").unwrap()), vec!["full"]);
    }

    #[test]
    fn test_spatial() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        let near_paris = f
            .within_circle("location", GeoPoint::new(48.85, 2.35), 5_000.0)
            .unwrap();
        assert_eq!(ids(&scope, &corpus, &near_paris), vec!["1"]);

        let southern = f
            .within_bounding_box("location", GeoPoint::new(0.0, -60.0), GeoPoint::new(-40.0, -30.0))
            .unwrap();
        assert_eq!(ids(&scope, &corpus, &southern), vec!["2"]);

        let europe = f
            .within_polygon(
                "location",
                vec![
                    GeoPoint::new(40.0, -10.0),
                    GeoPoint::new(60.0, -10.0),
                    GeoPoint::new(60.0, 20.0),
                    GeoPoint::new(40.0, 20.0),
                ],
            )
            .unwrap();
        assert_eq!(ids(&scope, &corpus, &europe), vec!["1"]);
    }

    #[test]
    fn test_knn_top_k() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        let query = f.knn("embedding", vec![0.9, 0.1], 1).unwrap();
        assert_eq!(ids(&scope, &corpus, &query), vec!["1"]);
        let both = f.knn("embedding", vec![0.9, 0.1], 5).unwrap();
        assert_eq!(ids(&scope, &corpus, &both), vec!["1", "2"]);
    }

    #[test]
    fn test_knn_leaves_keep_their_own_selection() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        let near_first = f.knn("embedding", vec![0.9, 0.1], 1).unwrap();
        let near_second = f.knn("embedding", vec![0.1, 0.9], 1).unwrap();

        let either = f.or([f.ids(["1"]), near_second.clone()]);
        assert_eq!(ids(&scope, &corpus, &either), vec!["1", "2"]);

        let both = f.and([near_first.clone(), near_second.clone()]);
        assert!(ids(&scope, &corpus, &both).is_empty());

        let after_short_circuit = f.or([f.and([f.ids(["2"]), near_first]), near_second]);
        assert_eq!(ids(&scope, &corpus, &after_short_circuit), vec!["2"]);
    }

    #[test]
    fn test_empty_boolean_clauses() {
        let (scope, corpus) = fixture();
        let f = PredicateFactory::new();
        assert_eq!(ids(&scope, &corpus, &f.and([])), vec!["1", "2"]);
        assert!(ids(&scope, &corpus, &f.or([])).is_empty());
        assert_eq!(ids(&scope, &corpus, &f.not(f.ids(["1"]))), vec!["2"]);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        let doc: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let q = |terms: &[&str]| terms.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(phrase_matches(&q(&["b", "c"]), &doc, 0));
        assert!(!phrase_matches(&q(&["a", "c"]), &doc, 0));
        assert!(phrase_matches(&q(&["a", "c"]), &doc, 1));
        assert!(!phrase_matches(&q(&["c", "a"]), &doc, 5));
        assert!(wildcard_regex("a.b*").unwrap().is_match("a.bcd"));
        assert!(!wildcard_regex("a.b*").unwrap().is_match("axbcd"));
    }
}
