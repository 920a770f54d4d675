//! Range fetching for path-tree queries

use crate::traits::KvStore;
use keytree_common::{Record, Result};
use keytree_path::KeyPath;
use tracing::debug;

/// Records read from the store for one query key
#[derive(Clone, Debug, Default)]
pub struct FetchedRange {
    /// Record stored at the query key itself
    pub parent: Option<Record>,
    /// Every record strictly below the query key, ascending by key
    pub descendants: Vec<Record>,
}

impl FetchedRange {
    /// Whether neither the key nor anything below it exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_none() && self.descendants.is_empty()
    }
}

/// Issues the two reads a path-tree query needs.
#[derive(Clone, Debug)]
pub struct RangeFetcher {
    path: KeyPath,
}

impl RangeFetcher {
    pub const fn new(path: KeyPath) -> Self {
        Self { path }
    }

    /// Exact lookup of `key` and prefix range below it, run concurrently.
    ///
    /// For the root key the range is the bare separator, so it covers every
    /// key starting with it; the exact lookup still runs.
    pub async fn fetch(&self, store: &dyn KvStore, key: &str) -> Result<FetchedRange> {
        self.path.validate_query_key(key)?;
        let prefix = self.path.descendant_prefix(key);

        let (parent, mut descendants) = tokio::try_join!(store.get(key), store.range(&prefix))?;

        // Adapters promise ascending order; the builder relies on it for
        // sibling order, so don't trust it blindly.
        if !descendants.is_sorted_by(|a, b| a.key <= b.key) {
            descendants.sort_by(|a, b| a.key.cmp(&b.key));
        }

        debug!(
            "Fetched {} from {}: parent {}, {} descendants",
            key,
            store.name(),
            parent.is_some(),
            descendants.len()
        );
        Ok(FetchedRange {
            parent,
            descendants,
        })
    }
}
