//! Pre-resolved lease TTLs for one tree build.

use keytree_common::{LeaseId, NO_LEASE, Record};
use std::collections::{BTreeSet, HashMap};

/// Remaining TTL (seconds) per lease, collected before the build starts
#[derive(Clone, Debug, Default)]
pub struct LeaseTable {
    ttls: HashMap<LeaseId, i64>,
}

impl LeaseTable {
    /// Create an empty table; every lookup yields 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the TTL of a lease. Negative values ("no expiry") are stored as 0.
    pub fn insert(&mut self, lease: LeaseId, ttl_secs: i64) {
        if lease != NO_LEASE {
            self.ttls.insert(lease, ttl_secs.max(0));
        }
    }

    /// TTL for `lease`, 0 when the key has no lease or the lease is unknown
    #[must_use]
    pub fn ttl(&self, lease: LeaseId) -> i64 {
        self.ttls.get(&lease).copied().unwrap_or(0)
    }

    /// Number of resolved leases
    #[must_use]
    pub fn len(&self) -> usize {
        self.ttls.len()
    }

    /// Whether no lease has been resolved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ttls.is_empty()
    }

    /// The distinct non-zero leases referenced by `records`, in ascending order
    pub fn distinct_leases<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<LeaseId> {
        records
            .into_iter()
            .filter(|r| r.has_lease())
            .map(|r| r.lease)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl FromIterator<(LeaseId, i64)> for LeaseTable {
    fn from_iter<I: IntoIterator<Item = (LeaseId, i64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (lease, ttl) in iter {
            table.insert(lease, ttl);
        }
        table
    }
}
