//! Browsing operations over the connected store.

use keytree_common::config::parse_endpoints;
use keytree_common::{Error, NO_LEASE, Result};
use keytree_path::{LeaseTable, Node, PathTreeBuilder};
use keytree_store::{
    ConnectStatus, ConnectionManager, RangeFetcher, lease_remaining, resolve_leases,
};

/// Shared state for the browsing API handlers
pub struct AppState {
    pub connections: ConnectionManager,
    builder: PathTreeBuilder,
    fetcher: RangeFetcher,
    lease_concurrency: usize,
}

impl AppState {
    /// Wrap a connection manager, taking the separator and lookup
    /// concurrency from its store configuration.
    pub fn new(connections: ConnectionManager) -> Result<Self> {
        let config = connections.config();
        let builder = PathTreeBuilder::new(config.separator.clone())?;
        let fetcher = RangeFetcher::new(builder.path().clone());
        let lease_concurrency = config.lease_lookup_concurrency;
        Ok(Self {
            connections,
            builder,
            fetcher,
            lease_concurrency,
        })
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        self.builder.path().separator()
    }

    /// Connect to a comma-separated endpoint list, or the configured one
    pub async fn connect(&self, endpoints: Option<&str>) -> Result<ConnectStatus> {
        self.connections
            .connect(endpoints.map(parse_endpoints))
            .await
    }

    /// Tree rooted at `key`: fetch, resolve every lease, build.
    pub async fn get_path(&self, key: &str) -> Result<Node> {
        let store = self.connections.store().await?;
        let fetched = self.fetcher.fetch(store.as_ref(), key).await?;

        let leases =
            LeaseTable::distinct_leases(fetched.parent.iter().chain(&fetched.descendants));
        let table = resolve_leases(store.as_ref(), leases, self.lease_concurrency).await;

        self.builder
            .build(key, fetched.parent.as_ref(), &fetched.descendants, &table)
    }

    /// The single record stored at `key`
    pub async fn get_node(&self, key: &str) -> Result<Node> {
        require_key(key)?;
        let store = self.connections.store().await?;
        let record = store.get(key).await?.ok_or_else(|| Error::not_found(key))?;
        let ttl = lease_remaining(store.as_ref(), record.lease).await;
        Ok(Node::from_record(&record, ttl))
    }

    /// Every record whose key starts with `key`, as direct children of a
    /// synthetic node. The prefix is raw: `/foo` also lists `/foobar`.
    pub async fn list_prefix(&self, key: &str) -> Result<Node> {
        require_key(key)?;
        let store = self.connections.store().await?;
        let records = store.range(key).await?;
        let table = resolve_leases(
            store.as_ref(),
            LeaseTable::distinct_leases(&records),
            self.lease_concurrency,
        )
        .await;

        let mut listing = Node::synthetic(key);
        for record in &records {
            listing.push_child(Node::from_record(record, table.ttl(record.lease)));
        }
        Ok(listing)
    }

    /// Write `value` at `key`, optionally under a fresh lease of `ttl`
    /// seconds, and return the record as stored.
    pub async fn put(&self, key: &str, value: &str, ttl: Option<&str>) -> Result<Node> {
        require_key(key)?;
        let ttl = parse_ttl(ttl)?;
        let store = self.connections.store().await?;

        let lease = match ttl {
            Some(secs) => store.grant_lease(secs).await?,
            None => NO_LEASE,
        };
        store.put(key, value, lease).await?;

        let record = store.get(key).await?.ok_or_else(|| Error::not_found(key))?;
        let ttl = lease_remaining(store.as_ref(), record.lease).await;
        Ok(Node::from_record(&record, ttl))
    }

    /// Delete `key`, and with `recursive` everything below it. Returns the
    /// number of deleted keys.
    pub async fn delete(&self, key: &str, recursive: bool) -> Result<u64> {
        require_key(key)?;
        let store = self.connections.store().await?;

        let mut deleted = store.delete(key).await?;
        if recursive {
            let prefix = self.builder.path().descendant_prefix(key);
            deleted += store.delete_prefix(&prefix).await?;
        }
        Ok(deleted)
    }
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("key is required"));
    }
    Ok(())
}

/// Blank and `0` mean no lease
fn parse_ttl(raw: Option<&str>) -> Result<Option<i64>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let secs: i64 = raw
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid ttl {raw:?}")))?;
    match secs {
        0 => Ok(None),
        s if s < 0 => Err(Error::invalid_argument(format!("invalid ttl {raw:?}"))),
        s => Ok(Some(s)),
    }
}
