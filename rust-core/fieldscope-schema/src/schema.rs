// SPDX-License-Identifier: PMPL-1.0-or-later
//! Index schemas.
//!
//! A [`Schema`] is the immutable field/object tree of one index. It is built
//! once at index-setup time (through [`SchemaBuilder`] or
//! [`Schema::from_json`]), validated, and then only read.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SchemaError;
use crate::node::{FieldType, ObjectField, SchemaNode, StructureKind, ValueField};
use crate::path::{validate_segment, FieldPath};
use crate::resolve::{self, Resolution};

/// The field tree of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Index name, used in diagnostics.
    index: String,
    /// Implicit root object; its children are the top-level fields.
    #[serde(rename = "fields", with = "root_fields")]
    root: ObjectField,
}

impl Schema {
    pub fn builder(index: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            index: index.into(),
            root: ObjectField::flattened(),
        }
    }

    /// Load and validate a schema from its JSON definition.
    ///
    /// ```json
    /// { "index": "books",
    ///   "fields": {
    ///     "title":   { "kind": "value", "type": "string", "analyzer": "english" },
    ///     "authors": { "kind": "object", "structure": "NESTED",
    ///                  "children": { "name": { "kind": "value", "type": "string" } } } } }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// The implicit root object (always flattened, single-valued).
    pub fn root(&self) -> &ObjectField {
        &self.root
    }

    /// Look up a node by absolute path without computing nesting scopes.
    pub fn node(&self, path: &FieldPath) -> Option<&SchemaNode> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let mut node = self.root.child(first)?;
        for segment in segments {
            node = node.as_object()?.child(segment)?;
        }
        Some(node)
    }

    /// Resolve an absolute path. See [`resolve::resolve`].
    pub fn resolve(&self, path: &FieldPath) -> Result<Resolution<'_>, SchemaError> {
        resolve::resolve(self, path)
    }

    /// Resolve `path` relative to `root` (`None` = index root).
    pub fn resolve_from(
        &self,
        root: Option<&FieldPath>,
        path: &FieldPath,
    ) -> Result<Resolution<'_>, SchemaError> {
        resolve::resolve_from(self, root, path)
    }

    /// Depth-first walk over every node with its absolute path.
    pub fn walk(&self) -> Vec<(FieldPath, &SchemaNode)> {
        let mut out = Vec::new();
        walk_object(&self.root, None, &mut out);
        out
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.index.trim().is_empty() {
            return Err(SchemaError::InvalidSchema(
                "index name must not be empty".to_string(),
            ));
        }
        if self.root.structure != StructureKind::Flattened || self.root.multi_valued {
            return Err(SchemaError::InvalidSchema(format!(
                "index '{}': the root object must be flattened and single-valued",
                self.index
            )));
        }
        validate_object(&self.index, &self.root, None)?;
        debug!(index = %self.index, fields = self.walk().len(), "Schema validated");
        Ok(())
    }
}

fn walk_object<'a>(
    object: &'a ObjectField,
    parent: Option<&FieldPath>,
    out: &mut Vec<(FieldPath, &'a SchemaNode)>,
) {
    for (name, node) in object.children() {
        let path = match parent {
            Some(parent) => parent.child(name),
            None => FieldPath::from_validated(name),
        };
        if let SchemaNode::Object(child) = node {
            out.push((path.clone(), node));
            walk_object(child, Some(&path), out);
        } else {
            out.push((path, node));
        }
    }
}

fn validate_object(
    index: &str,
    object: &ObjectField,
    parent: Option<&FieldPath>,
) -> Result<(), SchemaError> {
    let mut seen = std::collections::HashSet::new();
    for (name, node) in object.children() {
        let display = match parent {
            Some(parent) => format!("{}.{}", parent, name),
            None => name.to_string(),
        };
        validate_segment(name).map_err(|reason| SchemaError::InvalidFieldPath {
            path: display.clone(),
            reason: reason.to_string(),
        })?;
        if !seen.insert(name) {
            return Err(SchemaError::DuplicateField {
                index: index.to_string(),
                path: display,
            });
        }
        let path = match parent {
            Some(parent) => parent.child(name),
            None => FieldPath::from_validated(name),
        };
        match node {
            SchemaNode::Value(field) => validate_value(index, &path, field)?,
            SchemaNode::Object(child) => validate_object(index, child, Some(&path))?,
        }
    }
    Ok(())
}

fn validate_value(index: &str, path: &FieldPath, field: &ValueField) -> Result<(), SchemaError> {
    if let FieldType::Vector { dimension: 0, .. } = field.field_type {
        return Err(SchemaError::InvalidSchema(format!(
            "index '{}': vector field '{}' must have a positive dimension",
            index, path
        )));
    }
    let has_analysis = field.analyzer.is_some()
        || field.search_analyzer.is_some()
        || field.normalizer.is_some();
    if has_analysis && field.field_type != FieldType::String {
        return Err(SchemaError::InvalidSchema(format!(
            "index '{}': field '{}' of type {} cannot declare analysis resources",
            index, path, field.field_type
        )));
    }
    if field.analyzer.is_some() && field.normalizer.is_some() {
        return Err(SchemaError::InvalidSchema(format!(
            "index '{}': field '{}' declares both an analyzer and a normalizer",
            index, path
        )));
    }
    if field.search_analyzer.is_some() && field.analyzer.is_none() {
        return Err(SchemaError::InvalidSchema(format!(
            "index '{}': field '{}' declares a search analyzer without an analyzer",
            index, path
        )));
    }
    Ok(())
}

/// Fluent construction of a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    index: String,
    root: ObjectField,
}

impl SchemaBuilder {
    /// Add a top-level value field.
    pub fn value(mut self, name: impl Into<String>, field: ValueField) -> Self {
        self.root = self.root.value(name, field);
        self
    }

    /// Add a top-level object field.
    pub fn object(mut self, name: impl Into<String>, field: ObjectField) -> Self {
        self.root = self.root.object(name, field);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let schema = Schema {
            index: self.index,
            root: self.root,
        };
        schema.validate()?;
        Ok(schema)
    }
}

/// The root object is stored as a plain `fields` map in JSON.
mod root_fields {
    use serde::{Deserializer, Serializer};

    use crate::node::{ordered_children, ObjectField};

    pub fn serialize<S>(root: &ObjectField, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ordered_children::serialize(&root.children, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ObjectField, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut root = ObjectField::flattened();
        root.children = ordered_children::deserialize(deserializer)?;
        Ok(root)
    }
}
