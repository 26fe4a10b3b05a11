// SPDX-License-Identifier: PMPL-1.0-or-later
//! Named predicates.
//!
//! A named predicate is a user-supplied factory registered on an object field
//! (or on the index root) under a name. Queries invoke it as
//! `"<field path>.<name>"` with a [`ParamBag`]; the compiler expands the
//! invocation by calling the factory and rewriting what it returns relative to
//! the field it was registered on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fieldscope_schema::FieldPath;

use crate::ast::PredicateNode;
use crate::error::QueryError;
use crate::factory::PredicateFactory;
use crate::params::{ParamBag, ParamValue};

/// Produces the predicate a named invocation expands to.
pub trait NamedPredicateFactory: Send + Sync {
    fn create(&self, context: &NamedPredicateContext<'_>) -> Result<PredicateNode, QueryError>;
}

impl<F> NamedPredicateFactory for F
where
    F: Fn(&NamedPredicateContext<'_>) -> Result<PredicateNode, QueryError> + Send + Sync,
{
    fn create(&self, context: &NamedPredicateContext<'_>) -> Result<PredicateNode, QueryError> {
        self(context)
    }
}

/// Wrap a closure as a shareable factory.
///
/// Registering the same `Arc` in several indexes marks the predicate as
/// identical across them.
pub fn named_predicate<F>(factory: F) -> Arc<dyn NamedPredicateFactory>
where
    F: Fn(&NamedPredicateContext<'_>) -> Result<PredicateNode, QueryError> + Send + Sync + 'static,
{
    Arc::new(factory)
}

/// What a factory sees when invoked.
#[derive(Debug)]
pub struct NamedPredicateContext<'a> {
    name: &'a str,
    params: &'a ParamBag,
    factory: PredicateFactory,
}

impl<'a> NamedPredicateContext<'a> {
    pub(crate) fn new(name: &'a str, params: &'a ParamBag) -> Self {
        Self {
            name,
            params,
            factory: PredicateFactory::new(),
        }
    }

    /// Name the predicate was invoked with, including its field path.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Builds sub-predicates with paths relative to the field the predicate
    /// is registered on.
    pub fn predicate(&self) -> &PredicateFactory {
        &self.factory
    }

    pub fn params(&self) -> &ParamBag {
        self.params
    }

    /// A bound parameter; fails if the invocation did not bind it.
    pub fn param(&self, name: &str) -> Result<&ParamValue, QueryError> {
        self.params
            .get(name)
            .ok_or_else(|| QueryError::MissingNamedParameter {
                predicate: self.name.to_string(),
                name: name.to_string(),
            })
    }

    /// A parameter that may be absent.
    pub fn param_optional(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn param_str(&self, name: &str) -> Result<&str, QueryError> {
        let value = self.param(name)?;
        value.as_str().ok_or_else(|| self.mistyped(name, "string", value))
    }

    pub fn param_i64(&self, name: &str) -> Result<i64, QueryError> {
        let value = self.param(name)?;
        value.as_i64().ok_or_else(|| self.mistyped(name, "int", value))
    }

    pub fn param_f64(&self, name: &str) -> Result<f64, QueryError> {
        let value = self.param(name)?;
        value.as_f64().ok_or_else(|| self.mistyped(name, "number", value))
    }

    pub fn param_bool(&self, name: &str) -> Result<bool, QueryError> {
        let value = self.param(name)?;
        value.as_bool().ok_or_else(|| self.mistyped(name, "bool", value))
    }

    fn mistyped(&self, name: &str, expected: &'static str, actual: &ParamValue) -> QueryError {
        QueryError::MistypedNamedParameter {
            predicate: self.name.to_string(),
            name: name.to_string(),
            expected,
            actual: actual.type_name(),
        }
    }
}

/// Factories of one index, keyed by the object field they are registered on
/// (`None` = index root) and then by name.
#[derive(Clone, Default)]
pub struct NamedPredicateRegistry {
    by_node: BTreeMap<Option<FieldPath>, BTreeMap<String, Arc<dyn NamedPredicateFactory>>>,
}

impl NamedPredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register without schema checks; [`crate::scope::TargetIndex::register_named`]
    /// validates the node first.
    pub(crate) fn insert(
        &mut self,
        node: Option<FieldPath>,
        name: &str,
        factory: Arc<dyn NamedPredicateFactory>,
    ) -> bool {
        let names = self.by_node.entry(node).or_default();
        if names.contains_key(name) {
            return false;
        }
        names.insert(name.to_string(), factory);
        true
    }

    pub fn get(&self, node: Option<&FieldPath>, name: &str) -> Option<&Arc<dyn NamedPredicateFactory>> {
        self.by_node.get(&node.cloned())?.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_node.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(node, name)` pairs in registration-key order.
    pub fn names(&self) -> impl Iterator<Item = (Option<&FieldPath>, &str)> {
        self.by_node.iter().flat_map(|(node, names)| {
            names.keys().map(move |name| (node.as_ref(), name.as_str()))
        })
    }
}

impl fmt::Debug for NamedPredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .names()
            .map(|(node, name)| match node {
                Some(node) => format!("{}.{}", node, name),
                None => name.to_string(),
            })
            .collect();
        f.debug_struct("NamedPredicateRegistry")
            .field("names", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PredicateKind;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_context_accessors() {
        let mut params = ParamBag::new();
        params.insert("city", "Paris").unwrap();
        params.insert("limit", 3).unwrap();
        let ctx = NamedPredicateContext::new("authors.from", &params);

        assert_eq!(ctx.param_str("city").unwrap(), "Paris");
        assert_eq!(ctx.param_i64("limit").unwrap(), 3);
        assert_eq!(ctx.param_f64("limit").unwrap(), 3.0);
        assert!(ctx.param_optional("missing").is_none());

        match ctx.param("missing") {
            Err(QueryError::MissingNamedParameter { predicate, name }) => {
                assert_eq!(predicate, "authors.from");
                assert_eq!(name, "missing");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            ctx.param_bool("city"),
            Err(QueryError::MistypedNamedParameter {
                expected: "bool",
                actual: "string",
                ..
            })
        ));
    }

    #[test]
    fn test_closure_factory() {
        let factory = named_predicate(|ctx: &NamedPredicateContext<'_>| {
            ctx.predicate()
                .match_field("city")
                .map(|m| m.matching(ctx.param_str("city").unwrap_or("nowhere")))
        });
        let params = ParamBag::new();
        let ctx = NamedPredicateContext::new("from", &params);
        let node = factory.create(&ctx).unwrap();
        match node {
            PredicateNode::Leaf(leaf) => {
                assert_eq!(leaf.fields, vec![path("city")]);
                assert!(matches!(leaf.kind, PredicateKind::Match { .. }));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_registry_keys() {
        let mut registry = NamedPredicateRegistry::new();
        let factory = named_predicate(|ctx: &NamedPredicateContext<'_>| Ok(ctx.predicate().match_all()));
        assert!(registry.insert(None, "all", factory.clone()));
        assert!(registry.insert(Some(path("authors")), "all", factory.clone()));
        assert!(!registry.insert(None, "all", factory));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(None, "all").is_some());
        assert!(registry.get(Some(&path("authors")), "all").is_some());
        assert!(registry.get(Some(&path("other")), "all").is_none());
        assert!(format!("{:?}", registry).contains("authors.all"));
    }
}
