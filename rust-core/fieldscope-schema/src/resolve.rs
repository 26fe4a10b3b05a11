// SPDX-License-Identifier: PMPL-1.0-or-later
//! Path resolution.
//!
//! Walks a [`FieldPath`] segment by segment from the index root (or from a
//! given root scope) and records every NESTED object field crossed on the way.
//! Flattened object fields are traversed without contributing a scope, so a
//! flattened hop between two nested hops is invisible to scoping.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::SchemaError;
use crate::node::{NodeKind, ObjectField, SchemaNode, StructureKind};
use crate::path::FieldPath;
use crate::schema::Schema;

/// A nested object field a predicate must be evaluated within.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NestingScope {
    /// Absolute path of the object field.
    pub path: FieldPath,
    pub structure: StructureKind,
}

/// Nesting scopes required by a path, outermost first.
///
/// Invariant: every scope is a strict ancestor of the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestingChain(Vec<NestingScope>);

impl NestingChain {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn scopes(&self) -> &[NestingScope] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn innermost(&self) -> Option<&NestingScope> {
        self.0.last()
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.0.iter().map(|scope| &scope.path)
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.paths().any(|p| p == path)
    }

    /// Scopes not already satisfied by an open scope.
    ///
    /// `open` is the innermost scope the caller is already evaluating within;
    /// it and all of its ancestors are satisfied.
    pub fn after(&self, open: Option<&FieldPath>) -> &[NestingScope] {
        match open {
            None => &self.0,
            Some(open) => {
                let satisfied = self
                    .0
                    .iter()
                    .take_while(|scope| open.starts_with(&scope.path))
                    .count();
                &self.0[satisfied..]
            }
        }
    }

    fn push(&mut self, scope: NestingScope) {
        self.0.push(scope);
    }
}

impl fmt::Display for NestingChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<String> = self.paths().map(ToString::to_string).collect();
        write!(f, "[{}]", paths.join(", "))
    }
}

/// Outcome of resolving a path against one schema.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    /// Name of the index the path was resolved in.
    pub index: &'a str,
    /// Absolute path of the terminal node.
    pub path: FieldPath,
    /// Nested scopes crossed, including the terminal node if it is a nested object.
    pub chain: NestingChain,
    pub node: &'a SchemaNode,
}

impl Resolution<'_> {
    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }
}

/// Resolve an absolute path from the schema root.
pub fn resolve<'a>(schema: &'a Schema, path: &FieldPath) -> Result<Resolution<'a>, SchemaError> {
    resolve_from(schema, None, path)
}

/// Resolve `path` relative to `root`, or from the schema root when `root` is `None`.
///
/// The root must itself resolve to an object field. The returned chain
/// includes the nested scopes above the root, so it is always absolute.
pub fn resolve_from<'a>(
    schema: &'a Schema,
    root: Option<&FieldPath>,
    path: &FieldPath,
) -> Result<Resolution<'a>, SchemaError> {
    let absolute = FieldPath::join_under(root, path);
    let start = match root {
        None => Cursor::at_root(schema),
        Some(root) => {
            let scope = descend(schema, Cursor::at_root(schema), root, &absolute)?;
            match scope.node {
                SchemaNode::Object(object) => Cursor {
                    object,
                    chain: scope.chain,
                    consumed: Some(scope.path),
                },
                SchemaNode::Value(_) => {
                    return Err(SchemaError::WrongNodeKind {
                        index: schema.index_name().to_string(),
                        path: root.to_string(),
                        expected: NodeKind::Object,
                        actual: NodeKind::Value,
                    })
                }
            }
        }
    };
    let resolution = descend(schema, start, path, &absolute)?;
    trace!(
        index = resolution.index,
        path = %resolution.path,
        chain = %resolution.chain,
        "Resolved field path"
    );
    Ok(resolution)
}

/// Position of a traversal: the current object and what was crossed to reach it.
struct Cursor<'a> {
    object: &'a ObjectField,
    chain: NestingChain,
    consumed: Option<FieldPath>,
}

impl<'a> Cursor<'a> {
    fn at_root(schema: &'a Schema) -> Self {
        Self {
            object: schema.root(),
            chain: NestingChain::new(),
            consumed: None,
        }
    }
}

/// Follow `relative` down from `cursor`; `full` is only used in errors.
fn descend<'a>(
    schema: &'a Schema,
    cursor: Cursor<'a>,
    relative: &FieldPath,
    full: &FieldPath,
) -> Result<Resolution<'a>, SchemaError> {
    let index = schema.index_name();
    let Cursor {
        mut object,
        mut chain,
        mut consumed,
    } = cursor;
    let mut terminal = None;
    let last = relative.len() - 1;

    for (i, segment) in relative.segments().iter().enumerate() {
        let current = extend(consumed.as_ref(), segment);
        let node = object.child(segment).ok_or_else(|| SchemaError::UnknownField {
            index: index.to_string(),
            path: full.to_string(),
            consumed: current.to_string(),
        })?;
        match node {
            SchemaNode::Object(child) => {
                if child.is_nested() {
                    chain.push(NestingScope {
                        path: current.clone(),
                        structure: StructureKind::Nested,
                    });
                }
                object = child;
            }
            SchemaNode::Value(_) if i < last => {
                return Err(SchemaError::WrongNodeKind {
                    index: index.to_string(),
                    path: current.to_string(),
                    expected: NodeKind::Object,
                    actual: NodeKind::Value,
                })
            }
            SchemaNode::Value(_) => {}
        }
        terminal = Some(node);
        consumed = Some(current);
    }

    match (terminal, consumed) {
        (Some(node), Some(path)) => Ok(Resolution {
            index,
            path,
            chain,
            node,
        }),
        _ => Err(SchemaError::invalid_path(full.to_string(), "path has no segments")),
    }
}

fn extend(base: Option<&FieldPath>, segment: &str) -> FieldPath {
    match base {
        Some(base) => base.child(segment),
        None => FieldPath::from_validated(segment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FieldType, ValueField};

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    fn chain_paths(resolution: &Resolution<'_>) -> Vec<String> {
        resolution.chain.paths().map(ToString::to_string).collect()
    }

    /// `nested` (NESTED) -> `nested` (NESTED) -> `field1`, plus
    /// `nested` -> `flattened` (FLATTENED) -> `nested2` (NESTED) -> `x`.
    fn schema() -> Schema {
        Schema::builder("a")
            .value("string", ValueField::keyword())
            .object(
                "nested",
                ObjectField::nested()
                    .value("field0", ValueField::keyword())
                    .object(
                        "nested",
                        ObjectField::nested().value("field1", ValueField::keyword()),
                    )
                    .object(
                        "flattened",
                        ObjectField::flattened()
                            .value("y", ValueField::new(FieldType::Integer))
                            .object(
                                "nested2",
                                ObjectField::nested().value("x", ValueField::keyword()),
                            ),
                    ),
            )
            .object(
                "flat",
                ObjectField::flattened()
                    .object("flat", ObjectField::flattened().value("z", ValueField::keyword())),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_root_field_has_empty_chain() {
        let schema = schema();
        let r = schema.resolve(&path("string")).unwrap();
        assert!(r.chain.is_empty());
        assert_eq!(r.kind(), NodeKind::Value);
        assert_eq!(r.index, "a");
    }

    #[test]
    fn test_two_level_nested_chain() {
        let schema = schema();
        let r = schema.resolve(&path("nested.nested.field1")).unwrap();
        assert_eq!(chain_paths(&r), vec!["nested", "nested.nested"]);
        assert_eq!(
            r.node.as_value().map(|v| v.field_type),
            Some(FieldType::String)
        );
    }

    #[test]
    fn test_flattened_hop_between_nested_hops_is_skipped() {
        let schema = schema();
        let r = schema
            .resolve(&path("nested.flattened.nested2.x"))
            .unwrap();
        assert_eq!(chain_paths(&r), vec!["nested", "nested.flattened.nested2"]);

        let flat = schema.resolve(&path("nested.flattened.y")).unwrap();
        assert_eq!(chain_paths(&flat), vec!["nested"]);
    }

    #[test]
    fn test_consecutive_flattened_hops_contribute_nothing() {
        let schema = schema();
        let r = schema.resolve(&path("flat.flat.z")).unwrap();
        assert!(r.chain.is_empty());
    }

    #[test]
    fn test_nested_object_includes_itself() {
        let schema = schema();
        let r = schema.resolve(&path("nested.nested")).unwrap();
        assert_eq!(r.kind(), NodeKind::Object);
        assert_eq!(chain_paths(&r), vec!["nested", "nested.nested"]);

        let flat = schema.resolve(&path("nested.flattened")).unwrap();
        assert_eq!(chain_paths(&flat), vec!["nested"]);
    }

    #[test]
    fn test_unknown_field_reports_consumed_sub_path() {
        let schema = schema();
        match schema.resolve(&path("nested.missing.field1")) {
            Err(SchemaError::UnknownField {
                index,
                path,
                consumed,
            }) => {
                assert_eq!(index, "a");
                assert_eq!(path, "nested.missing.field1");
                assert_eq!(consumed, "nested.missing");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_traversing_value_field_is_wrong_kind() {
        let schema = schema();
        let err = schema.resolve(&path("string.sub")).unwrap_err();
        assert!(matches!(err, SchemaError::WrongNodeKind { .. }));
    }

    #[test]
    fn test_resolve_from_root_scope() {
        let schema = schema();
        let root = path("nested");
        let r = schema
            .resolve_from(Some(&root), &path("nested.field1"))
            .unwrap();
        assert_eq!(r.path, path("nested.nested.field1"));
        assert_eq!(chain_paths(&r), vec!["nested", "nested.nested"]);

        let deep_root = path("nested.flattened");
        let r = schema.resolve_from(Some(&deep_root), &path("y")).unwrap();
        assert_eq!(r.path, path("nested.flattened.y"));
        assert_eq!(chain_paths(&r), vec!["nested"]);
    }

    #[test]
    fn test_resolve_from_rejects_value_root_and_unknown_relative() {
        let schema = schema();
        let err = schema
            .resolve_from(Some(&path("string")), &path("x"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::WrongNodeKind { .. }));

        match schema.resolve_from(Some(&path("nested")), &path("nope")) {
            Err(SchemaError::UnknownField { consumed, .. }) => assert_eq!(consumed, "nested.nope"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_chain_after_open_scope() {
        let schema = schema();
        let r = schema.resolve(&path("nested.nested.field1")).unwrap();
        assert_eq!(r.chain.after(None).len(), 2);
        assert_eq!(r.chain.after(Some(&path("nested"))).len(), 1);
        assert_eq!(r.chain.after(Some(&path("nested.nested"))).len(), 0);
        // A flattened root under a nested scope satisfies the nested ancestor.
        assert_eq!(r.chain.after(Some(&path("nested.flattened"))).len(), 1);
    }

    #[test]
    fn test_chain_display() {
        let schema = schema();
        let r = schema.resolve(&path("nested.nested.field1")).unwrap();
        assert_eq!(r.chain.to_string(), "[nested, nested.nested]");
    }
}
