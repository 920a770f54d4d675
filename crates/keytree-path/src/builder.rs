//! Path-tree reconstruction.
//!
//! Two passes over the range result:
//!
//! 1. Walk every descendant key segment by segment, creating one arena slot
//!    per distinct intermediate path (dedup through a path -> slot index).
//!    Each slot remembers its parent slot and nesting level.
//! 2. Link bottom-up, deepest level first: every node is moved into its
//!    parent, so a parent is always complete before it is moved itself.
//!
//! Children end up in first-appearance order of their paths, which for an
//! ascending range result is the store's key order.

use crate::lease::LeaseTable;
use crate::node::Node;
use crate::path::KeyPath;
use keytree_common::{Error, Record, Result};
use std::collections::HashMap;
use tracing::debug;

/// Builds the [`Node`] tree for one query key.
#[derive(Clone, Debug)]
pub struct PathTreeBuilder {
    path: KeyPath,
}

impl PathTreeBuilder {
    /// Create a builder for a separator
    pub fn new(separator: impl Into<String>) -> Result<Self> {
        Ok(Self {
            path: KeyPath::new(separator)?,
        })
    }

    /// Path helpers for this builder's separator
    #[must_use]
    pub const fn path(&self) -> &KeyPath {
        &self.path
    }

    /// Assemble the tree rooted at `key`.
    ///
    /// `parent` is the record stored at `key` itself, if any. `descendants`
    /// is the prefix-range result for `key`, ascending by key. TTLs are read
    /// from `leases`.
    pub fn build(
        &self,
        key: &str,
        parent: Option<&Record>,
        descendants: &[Record],
        leases: &LeaseTable,
    ) -> Result<Node> {
        self.path.validate_query_key(key)?;

        let mut root = Node::synthetic(key);
        if let Some(record) = parent {
            if record.key != key {
                return Err(Error::malformed_key(
                    &record.key,
                    format!("parent record does not match query key {key:?}"),
                ));
            }
            root.populate(record, leases.ttl(record.lease));
        }

        let mut arena = Arena::new(root, self.path.level(key));
        for record in descendants {
            self.insert_record(&mut arena, key, record, leases)?;
        }

        let node_count = arena.slots.len();
        let max_level = arena.max_level;
        let root = arena.link()?;
        debug!(
            "Built path tree for {}: {} records, {} nodes, depth {}",
            key,
            descendants.len(),
            node_count,
            max_level
        );
        Ok(root)
    }

    /// First pass for one record: create or reuse every path between the
    /// query key and the record's key.
    fn insert_record(
        &self,
        arena: &mut Arena,
        key: &str,
        record: &Record,
        leases: &LeaseTable,
    ) -> Result<()> {
        let separator = self.path.separator();
        if self.path.is_root(&record.key) || record.key == key {
            return Ok(());
        }

        let prefix = self.path.descendant_prefix(key);
        let relative = record.key.strip_prefix(prefix.as_str()).ok_or_else(|| {
            Error::malformed_key(&record.key, format!("key is outside prefix {prefix:?}"))
        })?;

        let mut parent = Arena::ROOT;
        let mut current = String::with_capacity(record.key.len());
        for (i, segment) in relative.split(separator).enumerate() {
            if i == 0 {
                current.push_str(&prefix);
            } else {
                current.push_str(separator);
            }
            current.push_str(segment);

            // An empty first segment under the root spells the root again
            if current == key {
                continue;
            }
            parent = arena.get_or_insert(&current, parent);
        }

        if parent != Arena::ROOT {
            arena.populate(parent, record, leases.ttl(record.lease));
        }
        Ok(())
    }
}

struct Slot {
    node: Option<Node>,
    parent: usize,
    level: usize,
}

/// Scratch space for one build: nodes keyed by path, grouped by level.
struct Arena {
    slots: Vec<Slot>,
    by_path: HashMap<String, usize>,
    levels: Vec<Vec<usize>>,
    root_level: usize,
    max_level: usize,
}

impl Arena {
    const ROOT: usize = 0;

    fn new(root: Node, root_level: usize) -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(root.key.clone(), Self::ROOT);
        Self {
            slots: vec![Slot {
                node: Some(root),
                parent: Self::ROOT,
                level: root_level,
            }],
            by_path,
            levels: vec![vec![Self::ROOT]],
            root_level,
            max_level: root_level,
        }
    }

    fn get_or_insert(&mut self, path: &str, parent: usize) -> usize {
        if let Some(&idx) = self.by_path.get(path) {
            return idx;
        }

        let idx = self.slots.len();
        let level = self.slots[parent].level + 1;
        self.slots.push(Slot {
            node: Some(Node::synthetic(path)),
            parent,
            level,
        });
        self.by_path.insert(path.to_string(), idx);

        let depth = level - self.root_level;
        if self.levels.len() <= depth {
            self.levels.resize_with(depth + 1, Vec::new);
        }
        self.levels[depth].push(idx);
        self.max_level = self.max_level.max(level);
        idx
    }

    fn populate(&mut self, idx: usize, record: &Record, ttl: i64) {
        if let Some(node) = self.slots[idx].node.as_mut() {
            node.populate(record, ttl);
        }
    }

    /// Second pass: move every node into its parent, deepest level first.
    fn link(mut self) -> Result<Node> {
        for depth in (1..self.levels.len()).rev() {
            for &idx in &self.levels[depth] {
                let child = self.slots[idx]
                    .node
                    .take()
                    .ok_or_else(|| Error::internal("path tree node linked twice"))?;
                let parent = self.slots[idx].parent;
                self.slots[parent]
                    .node
                    .as_mut()
                    .ok_or_else(|| Error::internal("path tree parent linked before child"))?
                    .push_child(child);
            }
        }

        self.slots[Self::ROOT]
            .node
            .take()
            .ok_or_else(|| Error::internal("path tree root missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn builder() -> PathTreeBuilder {
        PathTreeBuilder::new("/").unwrap()
    }

    fn records(pairs: &[(&str, &str)]) -> Vec<Record> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (k, v))| {
                let rev = i64::try_from(i).unwrap() + 2;
                Record::new(*k, *v).with_revisions(rev, rev)
            })
            .collect()
    }

    fn child_keys(node: &Node) -> Vec<&str> {
        node.nodes.iter().map(|n| n.key.as_str()).collect()
    }

    #[test]
    fn test_absent_parent_with_nested_descendants() {
        let descendants = records(&[("/foo/a", "1"), ("/foo/b/c", "2")]);
        let root = builder()
            .build("/foo", None, &descendants, &LeaseTable::new())
            .unwrap();

        assert_eq!(root.key, "/foo");
        assert!(root.dir);
        assert!(root.value.is_none());
        assert_eq!(child_keys(&root), vec!["/foo/a", "/foo/b"]);

        let a = &root.nodes[0];
        assert_eq!(a.value.as_deref(), Some("1"));
        assert!(!a.dir);
        assert!(a.nodes.is_empty());

        let b = &root.nodes[1];
        assert!(b.dir);
        assert!(b.value.is_none());
        assert!(b.created_index.is_none());
        assert_eq!(child_keys(b), vec!["/foo/b/c"]);
        assert_eq!(b.nodes[0].value.as_deref(), Some("2"));
        assert!(!b.nodes[0].dir);
    }

    #[test]
    fn test_parent_without_descendants_is_leaf() {
        let parent = Record::new("/x", "v").with_revisions(5, 6);
        let root = builder()
            .build("/x", Some(&parent), &[], &LeaseTable::new())
            .unwrap();

        assert_eq!(root.key, "/x");
        assert_eq!(root.value.as_deref(), Some("v"));
        assert!(!root.dir);
        assert!(root.nodes.is_empty());
        assert_eq!(root.created_index, Some(5));
        assert_eq!(root.modified_index, Some(6));
    }

    #[test]
    fn test_missing_parent_and_descendants() {
        let root = builder()
            .build("/nothing", None, &[], &LeaseTable::new())
            .unwrap();
        assert_eq!(root, Node::synthetic("/nothing"));
    }

    #[test]
    fn test_root_query_lists_top_level_paths() {
        let descendants = records(&[
            ("/", "sentinel"),
            ("/a/x", "1"),
            ("/b", "2"),
            ("/c/d/e", "3"),
        ]);
        let root = builder()
            .build("/", None, &descendants, &LeaseTable::new())
            .unwrap();

        assert_eq!(root.key, "/");
        assert!(root.value.is_none());
        assert_eq!(child_keys(&root), vec!["/a", "/b", "/c"]);
        assert_eq!(root.iter().filter(|n| n.key == "/").count(), 1);
    }

    #[test]
    fn test_unrelated_top_level_groups_are_not_cross_linked() {
        let descendants = records(&[("/a/x", "1"), ("/b/y", "2")]);
        let root = builder()
            .build("/", None, &descendants, &LeaseTable::new())
            .unwrap();

        let a = root.find("/a").unwrap();
        let b = root.find("/b").unwrap();
        assert_eq!(child_keys(a), vec!["/a/x"]);
        assert_eq!(child_keys(b), vec!["/b/y"]);
    }

    #[test]
    fn test_shared_ancestors_are_deduplicated() {
        let descendants = records(&[
            ("/app/db/host", "h"),
            ("/app/db/port", "5432"),
            ("/app/db/replica/1", "r1"),
            ("/app/db/replica/2", "r2"),
        ]);
        let root = builder()
            .build("/app", None, &descendants, &LeaseTable::new())
            .unwrap();

        let mut seen = HashSet::new();
        for node in root.iter() {
            assert!(seen.insert(node.key.clone()), "duplicate node {}", node.key);
        }
        assert_eq!(child_keys(&root), vec!["/app/db"]);
        let db = &root.nodes[0];
        assert_eq!(
            child_keys(db),
            vec!["/app/db/host", "/app/db/port", "/app/db/replica"]
        );
        assert_eq!(db.nodes[2].nodes.len(), 2);
    }

    #[test]
    fn test_value_and_directory_on_one_node() {
        let descendants = records(&[("/foo/bar", "v"), ("/foo/bar/baz", "w")]);
        let root = builder()
            .build("/foo", None, &descendants, &LeaseTable::new())
            .unwrap();

        let bar = root.find("/foo/bar").unwrap();
        assert_eq!(bar.value.as_deref(), Some("v"));
        assert!(bar.dir);
        assert_eq!(child_keys(bar), vec!["/foo/bar/baz"]);
    }

    #[test]
    fn test_value_and_directory_with_present_parent() {
        let parent = Record::new("/foo", "root-value");
        let descendants = records(&[("/foo/a", "1")]);
        let root = builder()
            .build("/foo", Some(&parent), &descendants, &LeaseTable::new())
            .unwrap();

        assert_eq!(root.value.as_deref(), Some("root-value"));
        assert!(root.dir);
    }

    #[test]
    fn test_prefix_closure_and_directory_inference() {
        let descendants = records(&[
            ("/k/a", "1"),
            ("/k/a-b", "2"),
            ("/k/a/b/c", "3"),
            ("/k/b", "4"),
            ("/k/b/c", "5"),
            ("/k/z/y/x/w", "6"),
        ]);
        let b = builder();
        let root = b
            .build("/k", None, &descendants, &LeaseTable::new())
            .unwrap();

        for node in root.iter() {
            assert_eq!(node.dir, !node.nodes.is_empty(), "dir flag of {}", node.key);
            for child in &node.nodes {
                assert_eq!(b.path().parent(&child.key), Some(node.key.as_str()));
            }
        }
    }

    #[test]
    fn test_flatten_round_trips_record_set() {
        let parent = Record::new("/r", "p");
        let descendants = records(&[
            ("/r/a", "1"),
            ("/r/a/b", "2"),
            ("/r/c/d/e", "3"),
            ("/r/c/f", "4"),
        ]);
        let root = builder()
            .build("/r", Some(&parent), &descendants, &LeaseTable::new())
            .unwrap();

        let flattened: HashSet<(String, String)> = root.flatten().into_iter().collect();
        let expected: HashSet<(String, String)> = std::iter::once(&parent)
            .chain(&descendants)
            .map(|r| (r.key.clone(), r.value.clone()))
            .collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn test_ttl_comes_from_lease_table() {
        let parent = Record::new("/t", "p").with_lease(1);
        let descendants = vec![
            Record::new("/t/a", "1").with_lease(2),
            Record::new("/t/b", "2").with_lease(3),
            Record::new("/t/c", "3"),
        ];
        let leases: LeaseTable = [(1, 100), (2, 20), (3, -1)].into_iter().collect();
        let root = builder()
            .build("/t", Some(&parent), &descendants, &leases)
            .unwrap();

        assert_eq!(root.ttl, 100);
        assert_eq!(root.find("/t/a").unwrap().ttl, 20);
        assert_eq!(root.find("/t/b").unwrap().ttl, 0);
        assert_eq!(root.find("/t/c").unwrap().ttl, 0);
    }

    #[test]
    fn test_alternative_separator() {
        let b = PathTreeBuilder::new(".").unwrap();
        let descendants = records(&[("app.db.host", "h"), ("app.db.port", "p"), ("app.name", "n")]);
        let root = b
            .build("app", None, &descendants, &LeaseTable::new())
            .unwrap();

        assert_eq!(child_keys(&root), vec!["app.db", "app.name"]);
        assert_eq!(child_keys(&root.nodes[0]), vec!["app.db.host", "app.db.port"]);
    }

    #[test]
    fn test_query_key_in_descendants_is_ignored() {
        let parent = Record::new("/q", "real");
        let descendants = vec![Record::new("/q", "stale"), Record::new("/q/a", "1")];
        let root = builder()
            .build("/q", Some(&parent), &descendants, &LeaseTable::new())
            .unwrap();

        assert_eq!(root.value.as_deref(), Some("real"));
        assert_eq!(child_keys(&root), vec!["/q/a"]);
    }

    #[test]
    fn test_empty_segment_under_root_folds_into_root() {
        let descendants = records(&[("//x", "1"), ("/a", "2")]);
        let root = builder()
            .build("/", None, &descendants, &LeaseTable::new())
            .unwrap();

        assert_eq!(child_keys(&root), vec!["//x", "/a"]);
        assert_eq!(root.iter().filter(|n| n.key == "/").count(), 1);
    }

    #[test]
    fn test_record_outside_prefix_is_malformed() {
        let descendants = records(&[("/other/a", "1")]);
        let result = builder().build("/foo", None, &descendants, &LeaseTable::new());
        assert!(matches!(result, Err(Error::MalformedKey { .. })));
    }

    #[test]
    fn test_sibling_prefix_is_not_a_descendant() {
        // "/foobar" starts with "/foo" but not with "/foo/"
        let descendants = records(&[("/foobar", "1")]);
        let result = builder().build("/foo", None, &descendants, &LeaseTable::new());
        assert!(matches!(result, Err(Error::MalformedKey { .. })));
    }

    #[test]
    fn test_mismatched_parent_record_is_malformed() {
        let parent = Record::new("/other", "v");
        let result = builder().build("/foo", Some(&parent), &[], &LeaseTable::new());
        assert!(matches!(result, Err(Error::MalformedKey { .. })));
    }

    #[test]
    fn test_malformed_query_keys() {
        let b = builder();
        assert!(b.build("", None, &[], &LeaseTable::new()).is_err());
        assert!(b.build("/foo/", None, &[], &LeaseTable::new()).is_err());
    }

    #[test]
    fn test_unsorted_input_still_attaches_values() {
        // Deeper key first: "/u/a" is created synthetic, then filled in
        let descendants = vec![Record::new("/u/a/b", "2"), Record::new("/u/a", "1")];
        let root = builder()
            .build("/u", None, &descendants, &LeaseTable::new())
            .unwrap();

        let a = root.find("/u/a").unwrap();
        assert_eq!(a.value.as_deref(), Some("1"));
        assert!(a.dir);
    }
}
