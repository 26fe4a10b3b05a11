// SPDX-License-Identifier: PMPL-1.0-or-later
//! Implicit nesting rewriter.
//!
//! Turns an authored predicate tree (relative paths, optional explicit
//! `Nested` scopes, named invocations) into its resolved form: absolute paths,
//! named invocations expanded, and every leaf wrapped in exactly the nested
//! scopes its fields require that are not already open around it.
//!
//! Wrappers stay leaf-local: two sibling leaves under the same nested object
//! each get their own `Nested` node. Merging them is left to the physical
//! query translator.

use std::sync::Arc;

use fieldscope_schema::{
    supports, AnalysisOverride, ConflictReport, FieldAttribute, FieldPath, FieldTrait,
    NestingChain, NestingScope, NodeKind,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ast::{BoolOperator, LeafPredicate, PredicateNode};
use crate::config::CompilerConfig;
use crate::error::QueryError;
use crate::factory::{validate_boost, validate_leaf};
use crate::named::{NamedPredicateContext, NamedPredicateFactory};
use crate::params::ParamBag;
use crate::scope::{describe_node, ScopedResolution, SearchScope};

/// A leaf predicate after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLeaf {
    /// Absolute paths of the target fields.
    pub fields: Vec<FieldPath>,
    pub usage: FieldTrait,
    #[serde(default)]
    pub analysis: AnalysisOverride,
    /// Full nesting chain shared by all target fields.
    pub chain: NestingChain,
    /// True when the leaf sits inside an `or`.
    pub optional: bool,
}

/// Output of [`rewrite`].
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub predicate: PredicateNode,
    pub leaves: Vec<ResolvedLeaf>,
    /// Explicit nested scopes, with their optionality.
    pub(crate) scopes: Vec<(FieldPath, bool)>,
}

/// Rewrite `node` against every index of `scope`.
pub fn rewrite(
    scope: &SearchScope,
    node: &PredicateNode,
    config: &CompilerConfig,
) -> Result<Rewritten, QueryError> {
    let mut rewriter = NestingRewriter {
        scope,
        config,
        leaves: Vec::new(),
        scopes: Vec::new(),
        clauses: 0,
    };
    let predicate = rewriter.node(node, &Frame::top())?;
    debug!(
        leaves = rewriter.leaves.len(),
        explicit_scopes = rewriter.scopes.len(),
        indexes = scope.len(),
        "Predicate rewritten"
    );
    Ok(Rewritten {
        predicate,
        leaves: rewriter.leaves,
        scopes: rewriter.scopes,
    })
}

/// Where a subtree is being rewritten.
#[derive(Debug, Clone)]
struct Frame {
    /// Absolute path relative paths resolve against (`None` = index root).
    root: Option<FieldPath>,
    /// Innermost nested scope already wrapped around this subtree.
    open: Option<FieldPath>,
    optional: bool,
    depth: usize,
}

impl Frame {
    fn top() -> Self {
        Self {
            root: None,
            open: None,
            optional: false,
            depth: 0,
        }
    }
}

struct NestingRewriter<'a> {
    scope: &'a SearchScope,
    config: &'a CompilerConfig,
    leaves: Vec<ResolvedLeaf>,
    scopes: Vec<(FieldPath, bool)>,
    clauses: usize,
}

impl NestingRewriter<'_> {
    fn node(&mut self, node: &PredicateNode, frame: &Frame) -> Result<PredicateNode, QueryError> {
        match node {
            PredicateNode::Leaf(leaf) => self.leaf(leaf, frame),
            PredicateNode::Bool { operator, clauses } => {
                let clause_frame = Frame {
                    optional: frame.optional || *operator == BoolOperator::Or,
                    ..frame.clone()
                };
                let clauses = clauses
                    .iter()
                    .map(|clause| self.node(clause, &clause_frame))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PredicateNode::Bool {
                    operator: *operator,
                    clauses,
                })
            }
            PredicateNode::Not(inner) => Ok(PredicateNode::Not(Box::new(self.node(inner, frame)?))),
            PredicateNode::Nested { path, inner } => self.explicit_nested(path, inner, frame),
            PredicateNode::Named { name, params } => self.named(name, params, frame),
            PredicateNode::Boosted { inner, boost } => {
                validate_boost(*boost)?;
                Ok(PredicateNode::Boosted {
                    inner: Box::new(self.node(inner, frame)?),
                    boost: *boost,
                })
            }
            PredicateNode::ConstantScore(inner) => Ok(PredicateNode::ConstantScore(Box::new(
                self.node(inner, frame)?,
            ))),
        }
    }

    fn leaf(&mut self, leaf: &LeafPredicate, frame: &Frame) -> Result<PredicateNode, QueryError> {
        self.clauses += 1;
        if self.clauses > self.config.max_clause_count {
            return Err(QueryError::TooManyClauses {
                limit: self.config.max_clause_count,
            });
        }
        validate_leaf(&leaf.fields, &leaf.kind)?;
        let Some(usage) = leaf.kind.usage() else {
            return Ok(PredicateNode::Leaf(leaf.clone()));
        };

        let mut fields = Vec::with_capacity(leaf.fields.len());
        let mut first: Option<(FieldPath, NestingChain)> = None;
        for field in &leaf.fields {
            let resolved = self.scope.resolve(frame.root.as_ref(), field, usage)?;
            if self.config.validate_traits {
                require_trait(&resolved, usage)?;
            }
            if let Some((first_path, first_chain)) = first.as_ref() {
                if *first_chain != resolved.chain {
                    return Err(QueryError::CrossNestedPath {
                        field: resolved.path.to_string(),
                        chain: resolved.chain.to_string(),
                        other_field: first_path.to_string(),
                        other_chain: first_chain.to_string(),
                    });
                }
            }
            if first.is_none() {
                first = Some((resolved.path.clone(), resolved.chain.clone()));
            }
            fields.push(resolved.path);
        }
        let chain = first.map(|(_, chain)| chain).unwrap_or_default();

        let wrapped = wrap(
            PredicateNode::leaf(fields.clone(), leaf.kind.clone()),
            chain.after(frame.open.as_ref()),
        );
        self.leaves.push(ResolvedLeaf {
            fields,
            usage,
            analysis: leaf.kind.analysis(),
            chain,
            optional: frame.optional,
        });
        Ok(wrapped)
    }

    fn explicit_nested(
        &mut self,
        path: &FieldPath,
        inner: &PredicateNode,
        frame: &Frame,
    ) -> Result<PredicateNode, QueryError> {
        let resolved = self.scope.resolve(frame.root.as_ref(), path, FieldTrait::Nested)?;
        // A scope on anything but a nested object has no meaning, whatever the config says.
        require_trait(&resolved, FieldTrait::Nested)?;
        let residual = resolved.chain.after(frame.open.as_ref()).to_vec();
        self.scopes.push((resolved.path.clone(), frame.optional));

        let inner_frame = Frame {
            root: Some(resolved.path.clone()),
            open: Some(resolved.path.clone()),
            ..frame.clone()
        };
        let inner = self.node(inner, &inner_frame)?;
        Ok(wrap(inner, &residual))
    }

    fn named(
        &mut self,
        name: &str,
        params: &ParamBag,
        frame: &Frame,
    ) -> Result<PredicateNode, QueryError> {
        if frame.depth >= self.config.max_named_expansion_depth {
            return Err(QueryError::NamedPredicateRecursion {
                name: name.to_string(),
                depth: self.config.max_named_expansion_depth,
            });
        }
        let full = FieldPath::parse(name)?;
        let (node, residual) = match full.parent() {
            None => (frame.root.clone(), Vec::new()),
            Some(prefix) => {
                let resolved = self
                    .scope
                    .resolve(frame.root.as_ref(), &prefix, FieldTrait::Named)?;
                if resolved.kind != NodeKind::Object {
                    require_trait(&resolved, FieldTrait::Named)?;
                }
                let residual = resolved.chain.after(frame.open.as_ref()).to_vec();
                (Some(resolved.path), residual)
            }
        };

        let factory = self.lookup(node.as_ref(), full.last(), &full)?;
        let produced = factory.create(&NamedPredicateContext::new(name, params))?;

        let inner_frame = Frame {
            open: residual
                .last()
                .map(|scope| scope.path.clone())
                .or_else(|| frame.open.clone()),
            root: node,
            optional: frame.optional,
            depth: frame.depth + 1,
        };
        let expanded = self.node(&produced, &inner_frame)?;
        trace!(name, depth = inner_frame.depth, "Expanded named predicate");
        Ok(wrap(expanded, &residual))
    }

    /// Find the factory for `name` on `node` in every index that has the node.
    /// All of them must share the same factory.
    fn lookup(
        &self,
        node: Option<&FieldPath>,
        name: &str,
        full: &FieldPath,
    ) -> Result<Arc<dyn NamedPredicateFactory>, QueryError> {
        let mut chosen: Option<(&str, &Arc<dyn NamedPredicateFactory>)> = None;
        let mut missing: Option<&str> = None;
        let mut first_candidate: Option<&str> = None;

        for index in self.scope.indexes() {
            if let Some(path) = node {
                if index.schema().node(path).is_none() {
                    continue;
                }
            }
            first_candidate.get_or_insert(index.name());
            match (index.named().get(node, name), chosen) {
                (Some(factory), None) => chosen = Some((index.name(), factory)),
                (Some(factory), Some((first_index, first))) => {
                    if !Arc::ptr_eq(first, factory) {
                        return Err(named_conflict(
                            full,
                            first_index,
                            index.name(),
                            "registered (different factory)",
                        ));
                    }
                }
                (None, _) => {
                    missing.get_or_insert(index.name());
                }
            }
        }

        match (chosen, missing) {
            (Some((_, factory)), None) => Ok(Arc::clone(factory)),
            (Some((first_index, _)), Some(missing_index)) => Err(named_conflict(
                full,
                first_index,
                missing_index,
                "not registered",
            )),
            (None, _) => Err(QueryError::UnknownNamedPredicate {
                name: name.to_string(),
                target: describe_node(node),
                index: first_candidate.unwrap_or_default().to_string(),
            }),
        }
    }
}

fn named_conflict(full: &FieldPath, left: &str, right: &str, right_value: &str) -> QueryError {
    QueryError::CrossIndexConflict(ConflictReport {
        field: full.clone(),
        usage: FieldTrait::Named,
        attribute: FieldAttribute::NamedPredicate,
        left: "registered".to_string(),
        right: right_value.to_string(),
        left_index: left.to_string(),
        right_index: right.to_string(),
    })
}

fn require_trait(resolved: &ScopedResolution<'_>, usage: FieldTrait) -> Result<(), QueryError> {
    match resolved.found.iter().find(|r| !supports(r.node, usage)) {
        Some(r) => Err(QueryError::UnsupportedTrait {
            field: r.path.to_string(),
            usage,
            index: r.index.to_string(),
        }),
        None => Ok(()),
    }
}

/// Wrap `node` in `scopes`, outermost first.
fn wrap(node: PredicateNode, scopes: &[NestingScope]) -> PredicateNode {
    scopes.iter().rev().fold(node, |inner, scope| {
        trace!(scope = %scope.path, "Inserted nesting scope");
        PredicateNode::nested(scope.path.clone(), inner)
    })
}
