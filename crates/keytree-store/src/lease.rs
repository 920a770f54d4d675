//! Lease TTL resolution

use crate::traits::KvStore;
use futures::StreamExt;
use keytree_common::{LeaseId, NO_LEASE};
use keytree_path::LeaseTable;
use tracing::debug;

/// Remaining seconds of `lease`, or 0 when there is nothing to report.
///
/// No lease, an unknown or expired lease, a lease without expiry and a
/// failed lookup all read as 0.
pub async fn lease_remaining(store: &dyn KvStore, lease: LeaseId) -> i64 {
    if lease == NO_LEASE {
        return 0;
    }
    match store.lease_time_to_live(lease).await {
        Ok(ttl) if ttl > 0 => ttl,
        Ok(_) => 0,
        Err(e) => {
            debug!("Lease {} lookup failed: {}", lease, e);
            0
        }
    }
}

/// Look up every lease in `leases`, at most `concurrency` at a time
pub async fn resolve_leases(
    store: &dyn KvStore,
    leases: Vec<LeaseId>,
    concurrency: usize,
) -> LeaseTable {
    if leases.is_empty() {
        return LeaseTable::new();
    }

    let lookups = leases.len();
    let resolved: Vec<(LeaseId, i64)> = futures::stream::iter(leases)
        .map(|lease| async move { (lease, lease_remaining(store, lease).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    debug!("Resolved {} leases", lookups);
    resolved.into_iter().collect()
}
