//! Nested configuration patches.
//!
//! A patch is an ordered tree of groups and leaves. Flattening walks it
//! depth-first and yields one `(path, value)` pair per leaf, in insertion
//! order. A leaf holding `None` deletes the key.
//!
//! ```text
//! ConfigPatch::new()
//!     .group("app", |g| g.set("port", 8080).unset("name"))
//!     .set("debug", true)
//!
//! flatten() -> [("app.port", Some(8080)), ("app.name", None), ("debug", Some(true))]
//! ```

use crate::key_path::join_path;
use crate::ConfigValue;
use crate::SchemaError;

#[derive(Debug, Clone, PartialEq)]
pub enum PatchNode {
    Group(Vec<(String, PatchNode)>),
    /// `None` deletes the key
    Leaf(Option<ConfigValue>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    nodes: Vec<(String, PatchNode)>,
}

impl ConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        self,
        name: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Self {
        self.node(name, PatchNode::Leaf(Some(value.into())))
    }

    /// Marks a leaf for deletion.
    pub fn unset(
        self,
        name: impl Into<String>,
    ) -> Self {
        self.node(name, PatchNode::Leaf(None))
    }

    pub fn group<F>(
        self,
        name: impl Into<String>,
        build: F,
    ) -> Self
    where
        F: FnOnce(ConfigPatch) -> ConfigPatch,
    {
        let child = build(ConfigPatch::new());
        self.node(name, PatchNode::Group(child.nodes))
    }

    /// Inserts a node. A node already present under `name` is replaced in
    /// place, keeping its position.
    pub fn node(
        mut self,
        name: impl Into<String>,
        node: PatchNode,
    ) -> Self {
        let name = name.into();
        match self.nodes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = node,
            None => self.nodes.push((name, node)),
        }
        self
    }

    pub fn nodes(&self) -> &[(String, PatchNode)] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flattens the tree into `(path, value)` pairs in insertion order.
    ///
    /// Empty groups contribute nothing. Fails on a segment that cannot be
    /// part of a path.
    pub fn flatten(&self) -> Result<Vec<(String, Option<ConfigValue>)>, SchemaError> {
        let mut leaves = Vec::new();
        let mut prefix = Vec::new();
        flatten_into(&self.nodes, &mut prefix, &mut leaves)?;
        Ok(leaves)
    }
}

fn flatten_into<'a>(
    nodes: &'a [(String, PatchNode)],
    prefix: &mut Vec<&'a str>,
    leaves: &mut Vec<(String, Option<ConfigValue>)>,
) -> Result<(), SchemaError> {
    for (name, node) in nodes {
        prefix.push(name);
        match node {
            PatchNode::Group(children) => flatten_into(children, prefix, leaves)?,
            PatchNode::Leaf(value) => leaves.push((join_path(prefix.iter())?, value.clone())),
        }
        prefix.pop();
    }
    Ok(())
}
