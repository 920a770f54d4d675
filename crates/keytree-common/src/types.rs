//! Core types shared between the store adapters and the path-tree builder.

use serde::{Deserialize, Serialize};

/// Lease identifier as reported by the store (0 means the key has no lease)
pub type LeaseId = i64;

/// The "no lease" lease ID
pub const NO_LEASE: LeaseId = 0;

/// Default path separator
pub const DEFAULT_SEPARATOR: &str = "/";

/// A flat key-value entry as returned by a single store query
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Full key
    pub key: String,
    /// Value (UTF-8, lossily decoded if the store holds raw bytes)
    pub value: String,
    /// Attached lease, `NO_LEASE` if none
    pub lease: LeaseId,
    /// Revision at which the key was created
    pub create_revision: i64,
    /// Revision of the last modification
    pub mod_revision: i64,
    /// Number of modifications since creation
    pub version: i64,
}

impl Record {
    /// Create a record without lease or revision information
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Set the lease
    #[must_use]
    pub const fn with_lease(mut self, lease: LeaseId) -> Self {
        self.lease = lease;
        self
    }

    /// Set the create and mod revisions
    #[must_use]
    pub const fn with_revisions(mut self, create_revision: i64, mod_revision: i64) -> Self {
        self.create_revision = create_revision;
        self.mod_revision = mod_revision;
        self
    }

    /// Whether a lease is attached
    #[must_use]
    pub const fn has_lease(&self) -> bool {
        self.lease != NO_LEASE
    }
}
