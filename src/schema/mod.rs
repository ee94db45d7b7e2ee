//! Runtime schema descriptor for a configuration namespace.
//!
//! The schema is a tree of groups and typed leaves. Building it produces a
//! flattened index (`path -> ValueKind`) so that every `get`, `set` and
//! listener registration can be validated in O(1). Access to a path the
//! schema does not declare fails fast with [`SchemaError::UnknownPath`].
//!
//! # Example
//! ```rust
//! use live_config::{ConfigSchema, ValueKind};
//!
//! let schema = ConfigSchema::builder()
//!     .leaf("enabled", ValueKind::Boolean)
//!     .group("limits", |g| {
//!         g.leaf("max_connections", ValueKind::Number)
//!             .leaf("allowed_hosts", ValueKind::StringArray)
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.kind_of("limits.max_connections").unwrap(), ValueKind::Number);
//! assert!(schema.kind_of("limits.unknown").is_err());
//! ```

pub mod key_path;
mod value;

pub use key_path::KeyPathCodec;
pub use value::*;

#[cfg(test)]
mod schema_test;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use crate::SchemaError;

/// Node of the schema tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    /// Nested group of named children
    Group(BTreeMap<String, SchemaNode>),
    /// Typed value
    Leaf(ValueKind),
}

#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    root: BTreeMap<String, SchemaNode>,
    leaves: HashMap<String, ValueKind>,
    groups: HashSet<String>,
}

impl ConfigSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Builds the schema from an explicit node tree, validating every
    /// segment name.
    pub fn from_nodes(root: BTreeMap<String, SchemaNode>) -> Result<Self, SchemaError> {
        let mut leaves = HashMap::new();
        let mut groups = HashSet::new();
        index_nodes(None, &root, &mut leaves, &mut groups)?;
        Ok(Self {
            root,
            leaves,
            groups,
        })
    }

    pub fn root(&self) -> &BTreeMap<String, SchemaNode> {
        &self.root
    }

    /// Resolves the kind of the leaf at `path`.
    pub fn kind_of(
        &self,
        path: &str,
    ) -> Result<ValueKind, SchemaError> {
        if path.is_empty() {
            return Err(SchemaError::EmptyPath);
        }
        if let Some(kind) = self.leaves.get(path) {
            return Ok(*kind);
        }
        if self.groups.contains(path) {
            return Err(SchemaError::NotALeaf(path.to_string()));
        }
        Err(SchemaError::UnknownPath(path.to_string()))
    }

    /// Checks that `value` may be stored at `path`.
    ///
    /// `None` (the absent marker) is valid for every leaf.
    pub fn validate_value(
        &self,
        path: &str,
        value: Option<&ConfigValue>,
    ) -> Result<ValueKind, SchemaError> {
        let expected = self.kind_of(path)?;
        if let Some(value) = value {
            let actual = value.kind();
            if actual != expected {
                return Err(SchemaError::TypeMismatch {
                    path: path.to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(expected)
    }

    pub fn contains_leaf(
        &self,
        path: &str,
    ) -> bool {
        self.leaves.contains_key(path)
    }

    /// All leaf paths, sorted
    pub fn leaf_paths(&self) -> Vec<(&str, ValueKind)> {
        let mut paths: Vec<(&str, ValueKind)> =
            self.leaves.iter().map(|(p, k)| (p.as_str(), *k)).collect();
        paths.sort_by(|a, b| a.0.cmp(b.0));
        paths
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

fn index_nodes(
    prefix: Option<&str>,
    nodes: &BTreeMap<String, SchemaNode>,
    leaves: &mut HashMap<String, ValueKind>,
    groups: &mut HashSet<String>,
) -> Result<(), SchemaError> {
    for (name, node) in nodes {
        let path = match prefix {
            Some(prefix) => format!("{prefix}{}{name}", key_path::PATH_SEPARATOR),
            None => name.clone(),
        };
        key_path::validate_segment(&path, name)?;

        match node {
            SchemaNode::Leaf(kind) => {
                leaves.insert(path, *kind);
            }
            SchemaNode::Group(children) => {
                index_nodes(Some(&path), children, leaves, groups)?;
                groups.insert(path);
            }
        }
    }
    Ok(())
}

/// Fluent builder for [`ConfigSchema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    nodes: BTreeMap<String, SchemaNode>,
    error: Option<SchemaError>,
}

impl SchemaBuilder {
    pub fn leaf(
        self,
        name: impl Into<String>,
        kind: ValueKind,
    ) -> Self {
        self.insert(name.into(), SchemaNode::Leaf(kind))
    }

    pub fn group<F>(
        self,
        name: impl Into<String>,
        build: F,
    ) -> Self
    where
        F: FnOnce(SchemaBuilder) -> SchemaBuilder,
    {
        let child = build(SchemaBuilder::default());
        match child.error {
            Some(e) => self.fail(e),
            None => self.insert(name.into(), SchemaNode::Group(child.nodes)),
        }
    }

    pub fn build(self) -> Result<ConfigSchema, SchemaError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        ConfigSchema::from_nodes(self.nodes)
    }

    fn insert(
        mut self,
        name: String,
        node: SchemaNode,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.nodes.contains_key(&name) {
            return self.fail(SchemaError::DuplicateSegment(name));
        }
        self.nodes.insert(name, node);
        self
    }

    fn fail(
        mut self,
        error: SchemaError,
    ) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}
