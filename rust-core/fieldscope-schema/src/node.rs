// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema nodes: value fields and object fields.
//!
//! A schema is a tree. Inner nodes are [`ObjectField`]s whose
//! [`StructureKind`] decides whether their instances are flattened into the
//! parent document or indexed as separate nested documents. Leaves are
//! [`ValueField`]s carrying a type tag, analysis resources (opaque names) and
//! capability flags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Distance function used to compare vectors in knn predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::DotProduct => write!(f, "dot_product"),
        }
    }
}

/// Declared type tag of a value field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    /// ISO-8601 date, compared lexicographically.
    Date,
    GeoPoint,
    Vector {
        dimension: usize,
        metric: DistanceMetric,
    },
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Long | FieldType::Double)
    }

    /// Types that support range predicates and range aggregations.
    pub fn is_orderable(self) -> bool {
        self.is_numeric() || matches!(self, FieldType::String | FieldType::Date)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Integer => write!(f, "Integer"),
            FieldType::Long => write!(f, "Long"),
            FieldType::Double => write!(f, "Double"),
            FieldType::Boolean => write!(f, "Boolean"),
            FieldType::Date => write!(f, "Date"),
            FieldType::GeoPoint => write!(f, "GeoPoint"),
            FieldType::Vector { dimension, metric } => {
                write!(f, "Vector({}, {})", dimension, metric)
            }
        }
    }
}

/// How instances of an object field are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StructureKind {
    /// Children are merged into the enclosing document; no query-time scope.
    Flattened,
    /// Each instance is a separate hidden document; predicates need a scope.
    Nested,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureKind::Flattened => write!(f, "FLATTENED"),
            StructureKind::Nested => write!(f, "NESTED"),
        }
    }
}

/// Underlying mechanism an `exists` predicate uses for a value field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistsStrategy {
    DocValues,
    Norms,
}

impl fmt::Display for ExistsStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistsStrategy::DocValues => write!(f, "docValues"),
            ExistsStrategy::Norms => write!(f, "norms"),
        }
    }
}

/// Value field vs. object field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Value,
    Object,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Value => write!(f, "value field"),
            NodeKind::Object => write!(f, "object field"),
        }
    }
}

/// Per-invocation control over text analysis, supplied by a predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOverride {
    /// Use whatever the field declares.
    #[default]
    None,
    /// Analyze the query text with this analyzer instead.
    Analyzer(String),
    /// Do not analyze the query text at all.
    Skip,
}

impl AnalysisOverride {
    /// True when the per-field analysis configuration is bypassed.
    pub fn bypasses_field_analysis(&self) -> bool {
        !matches!(self, AnalysisOverride::None)
    }
}

/// The analysis actually applied to query text for one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryAnalysis {
    Analyzer(String),
    Normalizer(String),
    /// Terms are used verbatim.
    Raw,
}

/// A leaf of the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueField {
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    /// Overrides `analyzer` for query text only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalizer: Option<String>,
    #[serde(default = "default_searchable")]
    pub searchable: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub projectable: bool,
    #[serde(default)]
    pub aggregable: bool,
    #[serde(default)]
    pub multi_valued: bool,
    /// Explicit exists strategy; derived from the field when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists_strategy: Option<ExistsStrategy>,
}

fn default_searchable() -> bool {
    true
}

impl ValueField {
    /// A searchable, single-valued field with no analysis and no doc-value flags.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            analyzer: None,
            search_analyzer: None,
            normalizer: None,
            searchable: true,
            sortable: false,
            projectable: false,
            aggregable: false,
            multi_valued: false,
            exists_strategy: None,
        }
    }

    /// Shorthand for an analyzed full-text string field.
    pub fn text(analyzer: impl Into<String>) -> Self {
        Self::new(FieldType::String).with_analyzer(analyzer)
    }

    /// Shorthand for a non-analyzed string field.
    pub fn keyword() -> Self {
        Self::new(FieldType::String)
    }

    pub fn with_analyzer(mut self, name: impl Into<String>) -> Self {
        self.analyzer = Some(name.into());
        self
    }

    pub fn with_search_analyzer(mut self, name: impl Into<String>) -> Self {
        self.search_analyzer = Some(name.into());
        self
    }

    pub fn with_normalizer(mut self, name: impl Into<String>) -> Self {
        self.normalizer = Some(name.into());
        self
    }

    pub fn with_exists_strategy(mut self, strategy: ExistsStrategy) -> Self {
        self.exists_strategy = Some(strategy);
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn projectable(mut self) -> Self {
        self.projectable = true;
        self
    }

    pub fn aggregable(mut self) -> Self {
        self.aggregable = true;
        self
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub fn not_searchable(mut self) -> Self {
        self.searchable = false;
        self
    }

    /// True for string fields with an analyzer (full-text fields).
    pub fn is_analyzed(&self) -> bool {
        self.field_type == FieldType::String && self.analyzer.is_some()
    }

    /// The exists strategy: explicit setting, else norms for analyzed text and
    /// doc values for everything else.
    pub fn effective_exists_strategy(&self) -> ExistsStrategy {
        match self.exists_strategy {
            Some(strategy) => strategy,
            None if self.is_analyzed() => ExistsStrategy::Norms,
            None => ExistsStrategy::DocValues,
        }
    }

    /// Analyzer used on query text when no override is given.
    pub fn effective_search_analyzer(&self) -> Option<&str> {
        self.search_analyzer
            .as_deref()
            .or(self.analyzer.as_deref())
    }

    /// Pick the analysis applied to query text for this field.
    ///
    /// Precedence: explicit override, search analyzer, analyzer, normalizer.
    /// [`AnalysisOverride::Skip`] bypasses all of them.
    pub fn query_analysis(&self, requested: &AnalysisOverride) -> QueryAnalysis {
        match requested {
            AnalysisOverride::Skip => QueryAnalysis::Raw,
            AnalysisOverride::Analyzer(name) => QueryAnalysis::Analyzer(name.clone()),
            AnalysisOverride::None => {
                if let Some(name) = self.effective_search_analyzer() {
                    QueryAnalysis::Analyzer(name.to_string())
                } else if let Some(name) = &self.normalizer {
                    QueryAnalysis::Normalizer(name.clone())
                } else {
                    QueryAnalysis::Raw
                }
            }
        }
    }
}

/// An inner node of the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectField {
    pub structure: StructureKind,
    #[serde(default)]
    pub multi_valued: bool,
    /// Children in declaration order.
    #[serde(default, with = "ordered_children")]
    pub children: Vec<(String, SchemaNode)>,
}

impl ObjectField {
    pub fn new(structure: StructureKind) -> Self {
        Self {
            structure,
            multi_valued: false,
            children: Vec::new(),
        }
    }

    pub fn nested() -> Self {
        Self::new(StructureKind::Nested)
    }

    pub fn flattened() -> Self {
        Self::new(StructureKind::Flattened)
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// Add a value field child.
    pub fn value(mut self, name: impl Into<String>, field: ValueField) -> Self {
        self.children.push((name.into(), SchemaNode::Value(field)));
        self
    }

    /// Add an object field child.
    pub fn object(mut self, name: impl Into<String>, field: ObjectField) -> Self {
        self.children.push((name.into(), SchemaNode::Object(field)));
        self
    }

    pub fn child(&self, name: &str) -> Option<&SchemaNode> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, node)| node)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn is_nested(&self) -> bool {
        self.structure == StructureKind::Nested
    }
}

/// Either a value field or an object field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaNode {
    Value(ValueField),
    Object(ObjectField),
}

impl SchemaNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            SchemaNode::Value(_) => NodeKind::Value,
            SchemaNode::Object(_) => NodeKind::Object,
        }
    }

    pub fn as_value(&self) -> Option<&ValueField> {
        match self {
            SchemaNode::Value(field) => Some(field),
            SchemaNode::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectField> {
        match self {
            SchemaNode::Object(field) => Some(field),
            SchemaNode::Value(_) => None,
        }
    }

    pub fn multi_valued(&self) -> bool {
        match self {
            SchemaNode::Value(field) => field.multi_valued,
            SchemaNode::Object(field) => field.multi_valued,
        }
    }
}

/// Serializes object children as a JSON map while keeping declaration order
/// (and any duplicate keys, which schema validation then rejects).
pub(crate) mod ordered_children {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::SchemaNode;

    pub fn serialize<S>(children: &[(String, SchemaNode)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(children.len()))?;
        for (name, node) in children {
            map.serialize_entry(name, node)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, SchemaNode)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ChildrenVisitor;

        impl<'de> Visitor<'de> for ChildrenVisitor {
            type Value = Vec<(String, SchemaNode)>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of child field names to schema nodes")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut children = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, node)) = map.next_entry::<String, SchemaNode>()? {
                    children.push((name, node));
                }
                Ok(children)
            }
        }

        deserializer.deserialize_map(ChildrenVisitor)
    }
}
