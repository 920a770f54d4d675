//! Store trait definition

use async_trait::async_trait;
use keytree_common::{LeaseId, Record, Result};

/// A flat, ordered key-value store with leases.
///
/// Implementations must be safe for concurrent use: one handle is shared by
/// every in-flight request.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &str;

    /// Endpoints this handle was opened against
    fn endpoints(&self) -> Vec<String>;

    /// Exact-key lookup
    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// All records whose key starts with `prefix`, ascending by key
    async fn range(&self, prefix: &str) -> Result<Vec<Record>>;

    /// Write `value` at `key`, attached to `lease` (`NO_LEASE` for none)
    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<()>;

    /// Grant a lease expiring after `ttl_secs` seconds
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId>;

    /// Delete one key, returning the number of deleted keys
    async fn delete(&self, key: &str) -> Result<u64>;

    /// Delete every key starting with `prefix`, returning the count
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Remaining TTL of a lease as the store reports it; negative when the
    /// lease is unknown, expired or has no expiry
    async fn lease_time_to_live(&self, lease: LeaseId) -> Result<i64>;

    /// Release the handle. Later calls on a closed handle fail.
    async fn close(&self) {}
}
