//! keytree Store - backing store access
//!
//! This crate defines the [`KvStore`] seam, the etcd v3 adapter that talks
//! to etcd's JSON gateway, an in-process store for development and tests,
//! and the per-request pieces built on top of them: the [`RangeFetcher`],
//! lease TTL resolution and the process-wide [`ConnectionManager`].

pub mod connection;
pub mod etcd;
pub mod fetcher;
pub mod lease;
pub mod memory;
pub mod traits;

// Re-exports
pub use connection::{ConnectStatus, ConnectionManager, StoreOpener};
pub use etcd::EtcdStore;
pub use fetcher::{FetchedRange, RangeFetcher};
pub use lease::{lease_remaining, resolve_leases};
pub use memory::MemoryStore;
pub use traits::KvStore;
