//! Tree node as rendered by the browsing UI.

use keytree_common::Record;
use serde::{Deserialize, Serialize};

/// One element of the path tree.
///
/// A node is *real* when a store record has exactly this key, and
/// *synthetic* when it only exists because other keys share its path.
/// Synthetic nodes carry no value, revisions or TTL. `dir` is true iff
/// `nodes` is non-empty, so a real node can also be a directory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub dir: bool,
    #[serde(default)]
    pub ttl: i64,
    #[serde(rename = "createdIndex", skip_serializing_if = "Option::is_none")]
    pub created_index: Option<i64>,
    #[serde(rename = "modifiedIndex", skip_serializing_if = "Option::is_none")]
    pub modified_index: Option<i64>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Node {
    /// A node inferred from path segmentation only
    pub fn synthetic(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// A leaf node for a store record
    #[must_use]
    pub fn from_record(record: &Record, ttl: i64) -> Self {
        let mut node = Self::synthetic(record.key.clone());
        node.populate(record, ttl);
        node
    }

    /// Copy the record's value and metadata onto this node
    pub fn populate(&mut self, record: &Record, ttl: i64) {
        self.value = Some(record.value.clone());
        self.ttl = ttl;
        self.created_index = Some(record.create_revision);
        self.modified_index = Some(record.mod_revision);
    }

    /// Append a child and mark this node as a directory
    pub fn push_child(&mut self, child: Self) {
        self.nodes.push(child);
        self.dir = true;
    }

    /// Whether a store record backs this node
    #[must_use]
    pub const fn is_real(&self) -> bool {
        self.value.is_some()
    }

    /// Whether this node has children
    #[must_use]
    pub fn is_directory(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Depth-first, pre-order traversal including `self`
    pub fn iter(&self) -> impl Iterator<Item = &Self> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.nodes.iter().rev());
            Some(node)
        })
    }

    /// Find a node by full key
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&Self> {
        self.iter().find(|n| n.key == key)
    }

    /// Total number of nodes in this subtree
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// `(key, value)` of every real node in this subtree, in traversal order
    #[must_use]
    pub fn flatten(&self) -> Vec<(String, String)> {
        self.iter()
            .filter_map(|n| n.value.as_ref().map(|v| (n.key.clone(), v.clone())))
            .collect()
    }
}
