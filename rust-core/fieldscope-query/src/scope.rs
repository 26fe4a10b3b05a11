// SPDX-License-Identifier: PMPL-1.0-or-later
//! Search scopes: the set of indexes a query targets.

use std::collections::BTreeSet;
use std::sync::Arc;

use fieldscope_schema::{
    ConflictReport, FieldAttribute, FieldPath, FieldTrait, NestingChain, NodeKind, Resolution,
    Schema, SchemaError, SchemaNode, StructureKind,
};
use tracing::debug;

use crate::error::QueryError;
use crate::named::{NamedPredicateFactory, NamedPredicateRegistry};

/// One index of a search scope: its schema and its named predicates.
#[derive(Debug, Clone)]
pub struct TargetIndex {
    schema: Arc<Schema>,
    named: NamedPredicateRegistry,
}

impl TargetIndex {
    pub fn new(schema: Schema) -> Self {
        Self::shared(Arc::new(schema))
    }

    /// Share one schema between several scopes.
    pub fn shared(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            named: NamedPredicateRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.schema.index_name()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn named(&self) -> &NamedPredicateRegistry {
        &self.named
    }

    /// Register a named predicate on the object field at `node` (`None` = index root).
    pub fn register_named(
        mut self,
        node: Option<&str>,
        name: &str,
        factory: Arc<dyn NamedPredicateFactory>,
    ) -> Result<Self, QueryError> {
        FieldPath::single(name)?;
        let node = node.map(FieldPath::parse).transpose()?;
        if let Some(path) = &node {
            let resolution = self.schema.resolve(path)?;
            if !matches!(resolution.node, SchemaNode::Object(_)) {
                return Err(QueryError::UnsupportedTrait {
                    field: path.to_string(),
                    usage: FieldTrait::Named,
                    index: self.name().to_string(),
                });
            }
        }
        let target = describe_node(node.as_ref());
        if !self.named.insert(node, name, factory) {
            return Err(QueryError::DuplicateNamedPredicate {
                name: name.to_string(),
                target,
                index: self.name().to_string(),
            });
        }
        Ok(self)
    }
}

pub(crate) fn describe_node(node: Option<&FieldPath>) -> String {
    match node {
        Some(path) => format!("field '{}'", path),
        None => "index schema root".to_string(),
    }
}

/// A path resolved across every index of a scope.
#[derive(Debug, Clone)]
pub struct ScopedResolution<'a> {
    /// Absolute path.
    pub path: FieldPath,
    /// Nesting chain, identical in every index that has the path.
    pub chain: NestingChain,
    pub kind: NodeKind,
    /// One resolution per index that has the path, in scope order.
    pub found: Vec<Resolution<'a>>,
}

/// The indexes a query runs against.
#[derive(Debug, Clone)]
pub struct SearchScope {
    indexes: Vec<TargetIndex>,
}

impl SearchScope {
    /// Fails on an empty scope or a repeated index name.
    pub fn new(indexes: impl IntoIterator<Item = TargetIndex>) -> Result<Self, QueryError> {
        let indexes: Vec<TargetIndex> = indexes.into_iter().collect();
        if indexes.is_empty() {
            return Err(QueryError::EmptyScope);
        }
        let mut seen = BTreeSet::new();
        for index in &indexes {
            if !seen.insert(index.name()) {
                return Err(QueryError::DuplicateIndex(index.name().to_string()));
            }
        }
        debug!(indexes = indexes.len(), "Search scope created");
        Ok(Self { indexes })
    }

    pub fn single(index: TargetIndex) -> Self {
        Self {
            indexes: vec![index],
        }
    }

    pub fn indexes(&self) -> &[TargetIndex] {
        &self.indexes
    }

    pub fn index_names(&self) -> BTreeSet<String> {
        self.indexes.iter().map(|i| i.name().to_string()).collect()
    }

    pub fn schemas(&self) -> Vec<&Schema> {
        self.indexes.iter().map(TargetIndex::schema).collect()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn is_multi_index(&self) -> bool {
        self.indexes.len() > 1
    }

    /// Resolve `path` (relative to `root`) in every index.
    ///
    /// Indexes lacking the path are skipped. Fails when no index has it, or
    /// when two indexes disagree on node kind or nesting chain, since no
    /// single rewritten tree could serve both.
    pub fn resolve(
        &self,
        root: Option<&FieldPath>,
        path: &FieldPath,
        usage: FieldTrait,
    ) -> Result<ScopedResolution<'_>, QueryError> {
        let mut found: Vec<Resolution<'_>> = Vec::new();
        let mut blocked: Option<(&str, SchemaError)> = None;
        let mut first_error = None;

        for index in &self.indexes {
            match index.schema().resolve_from(root, path) {
                Ok(resolution) => found.push(resolution),
                Err(error) if error.is_unknown_field() => {
                    first_error.get_or_insert(error);
                }
                Err(error @ SchemaError::WrongNodeKind { .. }) => {
                    if blocked.is_none() {
                        blocked = Some((index.name(), error));
                    }
                }
                Err(error) => return Err(error.into()),
            }
        }

        let absolute = FieldPath::join_under(root, path);
        let Some(first) = found.first() else {
            return Err(match (blocked, first_error) {
                (Some((_, error)), _) | (None, Some(error)) => error.into(),
                (None, None) => QueryError::EmptyScope,
            });
        };

        if let Some((index, _)) = blocked {
            return Err(ConflictReport {
                field: absolute,
                usage,
                attribute: FieldAttribute::NodeKind,
                left: NodeKind::Object.to_string(),
                right: NodeKind::Value.to_string(),
                left_index: first.index.to_string(),
                right_index: index.to_string(),
            }
            .into());
        }

        for other in &found[1..] {
            let conflict = if first.kind() != other.kind() {
                Some((
                    FieldAttribute::NodeKind,
                    first.kind().to_string(),
                    other.kind().to_string(),
                ))
            } else if let Some((l, r)) = object_structures(first.node, other.node) {
                Some((FieldAttribute::Structure, l.to_string(), r.to_string()))
            } else if first.chain != other.chain {
                Some((
                    FieldAttribute::NestedPathHierarchy,
                    first.chain.to_string(),
                    other.chain.to_string(),
                ))
            } else {
                None
            };
            if let Some((attribute, left, right)) = conflict {
                return Err(ConflictReport {
                    field: absolute,
                    usage,
                    attribute,
                    left,
                    right,
                    left_index: first.index.to_string(),
                    right_index: other.index.to_string(),
                }
                .into());
            }
        }

        Ok(ScopedResolution {
            path: first.path.clone(),
            chain: first.chain.clone(),
            kind: first.kind(),
            found,
        })
    }
}

/// Differing structure kinds when both nodes are objects.
fn object_structures(left: &SchemaNode, right: &SchemaNode) -> Option<(StructureKind, StructureKind)> {
    match (left, right) {
        (SchemaNode::Object(l), SchemaNode::Object(r)) if l.structure != r.structure => {
            Some((l.structure, r.structure))
        }
        _ => None,
    }
}
