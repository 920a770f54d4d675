//! In-process store.
//!
//! Mirrors the etcd semantics keytree relies on: ascending key order,
//! a global revision bumped by every write, and leases whose expiry deletes
//! the attached keys. Handles opened from the same store share its data,
//! the way several clients share one etcd cluster.

use crate::traits::KvStore;
use async_trait::async_trait;
use keytree_common::{Error, LeaseId, NO_LEASE, Record, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    lease: LeaseId,
    create_revision: i64,
    mod_revision: i64,
    version: i64,
}

#[derive(Clone, Copy, Debug)]
struct Lease {
    deadline: Instant,
}

#[derive(Debug)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Lease>,
    revision: i64,
    next_lease: LeaseId,
}

impl Inner {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            leases: HashMap::new(),
            revision: 1,
            next_lease: 1,
        }
    }

    /// Drop expired leases together with their keys
    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return;
        }

        for id in &expired {
            self.leases.remove(id);
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| !expired.contains(&e.lease));
        if self.entries.len() != before {
            self.revision += 1;
        }
    }

    fn record(key: &str, entry: &Entry) -> Record {
        Record {
            key: key.to_string(),
            value: entry.value.clone(),
            lease: entry.lease,
            create_revision: entry.create_revision,
            mod_revision: entry.mod_revision,
            version: entry.version,
        }
    }
}

/// In-process [`KvStore`]
pub struct MemoryStore {
    data: Arc<Mutex<Inner>>,
    endpoints: Vec<String>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Inner::new())),
            endpoints: Vec::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Open another handle onto the same data
    #[must_use]
    pub fn reopen(&self, endpoints: Vec<String>) -> Self {
        Self {
            data: Arc::clone(&self.data),
            endpoints,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether `close` has been called on this handle
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live keys
    #[must_use]
    pub fn len(&self) -> usize {
        let mut inner = self.data.lock();
        inner.purge_expired(Instant::now());
        inner.entries.len()
    }

    /// Whether the store holds no live keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<parking_lot::MutexGuard<'_, Inner>> {
        if self.is_closed() {
            return Err(Error::NotConnected);
        }
        let mut inner = self.data.lock();
        inner.purge_expired(Instant::now());
        Ok(inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let inner = self.lock()?;
        Ok(inner.entries.get(key).map(|e| Inner::record(key, e)))
    }

    async fn range(&self, prefix: &str) -> Result<Vec<Record>> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| Inner::record(k, e))
            .collect())
    }

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<()> {
        let mut inner = self.lock()?;
        if lease != NO_LEASE && !inner.leases.contains_key(&lease) {
            return Err(Error::invalid_argument(format!(
                "requested lease {lease} not found"
            )));
        }

        inner.revision += 1;
        let revision = inner.revision;
        inner
            .entries
            .entry(key.to_string())
            .and_modify(|e| {
                e.value = value.to_string();
                e.lease = lease;
                e.mod_revision = revision;
                e.version += 1;
            })
            .or_insert_with(|| Entry {
                value: value.to_string(),
                lease,
                create_revision: revision,
                mod_revision: revision,
                version: 1,
            });
        Ok(())
    }

    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId> {
        let secs = u64::try_from(ttl_secs)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| Error::invalid_argument(format!("invalid lease ttl {ttl_secs}")))?;

        let mut inner = self.lock()?;
        let id = inner.next_lease;
        inner.next_lease += 1;
        inner.leases.insert(
            id,
            Lease {
                deadline: Instant::now() + Duration::from_secs(secs),
            },
        );
        Ok(id)
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut inner = self.lock()?;
        if inner.entries.remove(key).is_some() {
            inner.revision += 1;
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut inner = self.lock()?;
        let keys: Vec<String> = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            inner.entries.remove(key);
        }
        if !keys.is_empty() {
            inner.revision += 1;
        }
        Ok(keys.len() as u64)
    }

    async fn lease_time_to_live(&self, lease: LeaseId) -> Result<i64> {
        let inner = self.lock()?;
        Ok(inner.leases.get(&lease).map_or(-1, |l| {
            let remaining = l.deadline.saturating_duration_since(Instant::now());
            i64::try_from(remaining.as_secs()).unwrap_or(i64::MAX)
        }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_revisions() {
        let store = MemoryStore::new();
        store.put("/a", "1", NO_LEASE).await.unwrap();
        store.put("/a", "2", NO_LEASE).await.unwrap();

        let record = store.get("/a").await.unwrap().unwrap();
        assert_eq!(record.value, "2");
        assert_eq!(record.version, 2);
        assert!(record.mod_revision > record.create_revision);
        assert!(store.get("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_is_prefix_scoped_and_sorted() {
        let store = MemoryStore::new();
        for key in ["/foo/b", "/foo/a/c", "/foobar", "/foo/a", "/bar"] {
            store.put(key, "v", NO_LEASE).await.unwrap();
        }

        let keys: Vec<String> = store
            .range("/foo/")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["/foo/a", "/foo/a/c", "/foo/b"]);
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = MemoryStore::new();
        for key in ["/foo", "/foo/a", "/foo/b/c", "/foobar"] {
            store.put(key, "v", NO_LEASE).await.unwrap();
        }

        assert_eq!(store.delete_prefix("/foo/").await.unwrap(), 2);
        assert_eq!(store.delete("/foo").await.unwrap(), 1);
        assert_eq!(store.delete("/foo").await.unwrap(), 0);
        assert_eq!(store.len(), 1);
        assert!(store.get("/foobar").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_removes_keys() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(10).await.unwrap();
        store.put("/tmp", "v", lease).await.unwrap();

        assert_eq!(store.lease_time_to_live(lease).await.unwrap(), 10);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.lease_time_to_live(lease).await.unwrap(), 6);

        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(store.get("/tmp").await.unwrap().is_none());
        assert_eq!(store.lease_time_to_live(lease).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_put_with_unknown_lease_fails() {
        let store = MemoryStore::new();
        let result = store.put("/a", "v", 42).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(store.grant_lease(0).await.is_err());
    }

    #[tokio::test]
    async fn test_reopened_handles_share_data() {
        let store = MemoryStore::new();
        store.put("/shared", "v", NO_LEASE).await.unwrap();

        let other = store.reopen(vec!["memory-b".to_string()]);
        assert_eq!(other.endpoints(), vec!["memory-b"]);
        assert!(other.get("/shared").await.unwrap().is_some());

        store.close().await;
        assert!(matches!(store.get("/shared").await, Err(Error::NotConnected)));
        assert!(other.get("/shared").await.unwrap().is_some());
    }
}
