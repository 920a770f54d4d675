//! Process-wide store handle
//!
//! Holds at most one open [`KvStore`]. Handlers share it read-only; a
//! connect request for a different endpoint set opens a new handle and
//! closes the old one before installing the replacement.

use crate::etcd::EtcdStore;
use crate::memory::MemoryStore;
use crate::traits::KvStore;
use keytree_common::config::{StoreBackend, StoreConfig};
use keytree_common::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Opens a store handle for a configuration
pub type StoreOpener = Arc<dyn Fn(&StoreConfig) -> Result<Arc<dyn KvStore>> + Send + Sync>;

/// Outcome of [`ConnectionManager::connect`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectStatus {
    /// A new handle was opened
    Connected,
    /// The requested endpoints are already connected
    Running,
}

impl ConnectStatus {
    /// Body returned to the browsing UI
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "ok",
            Self::Running => "running",
        }
    }
}

struct Active {
    endpoints: BTreeSet<String>,
    store: Arc<dyn KvStore>,
}

/// Owns the connected store handle
pub struct ConnectionManager {
    config: StoreConfig,
    opener: StoreOpener,
    current: RwLock<Option<Active>>,
}

impl ConnectionManager {
    /// Create a manager that opens handles with `opener`
    pub fn new(config: StoreConfig, opener: StoreOpener) -> Self {
        Self {
            config,
            opener,
            current: RwLock::new(None),
        }
    }

    /// Create a manager for the configured backend.
    ///
    /// With the memory backend every handle shares one in-process store, so
    /// switching endpoints keeps the data.
    pub fn for_config(config: StoreConfig) -> Self {
        let opener: StoreOpener = match config.backend {
            StoreBackend::Etcd => Arc::new(|cfg: &StoreConfig| {
                Ok(Arc::new(EtcdStore::connect(cfg)?) as Arc<dyn KvStore>)
            }),
            StoreBackend::Memory => {
                let shared = MemoryStore::new();
                Arc::new(move |cfg: &StoreConfig| {
                    Ok(Arc::new(shared.reopen(cfg.endpoints.clone())) as Arc<dyn KvStore>)
                })
            }
        };
        Self::new(config, opener)
    }

    /// Base store configuration
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Configured path separator
    pub fn separator(&self) -> &str {
        &self.config.separator
    }

    /// Connect to `endpoints`, or to the configured ones when `None` or empty.
    ///
    /// Endpoint sets are compared ignoring order and duplicates. If opening
    /// the new handle fails the previous one stays installed.
    pub async fn connect(&self, endpoints: Option<Vec<String>>) -> Result<ConnectStatus> {
        let endpoints = endpoints
            .filter(|eps| !eps.is_empty())
            .unwrap_or_else(|| self.config.endpoints.clone());
        let wanted: BTreeSet<String> = endpoints.iter().cloned().collect();

        let mut current = self.current.write().await;
        if current.as_ref().is_some_and(|active| active.endpoints == wanted) {
            return Ok(ConnectStatus::Running);
        }

        let config = self.config.clone().with_endpoints(endpoints);
        config.validate()?;
        let store = (self.opener)(&config)?;

        if let Some(old) = current.take() {
            info!(
                "Closing {} store connection to {:?}",
                old.store.name(),
                old.endpoints
            );
            old.store.close().await;
        }

        info!(
            "Connected to {} store at {:?}",
            store.name(),
            config.endpoints
        );
        *current = Some(Active {
            endpoints: wanted,
            store,
        });
        Ok(ConnectStatus::Connected)
    }

    /// Current store handle
    pub async fn store(&self) -> Result<Arc<dyn KvStore>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.store))
            .ok_or(Error::NotConnected)
    }

    /// Endpoints of the current handle, sorted
    pub async fn connected_endpoints(&self) -> Option<Vec<String>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|active| active.endpoints.iter().cloned().collect())
    }

    /// Close and drop the current handle, if any
    pub async fn disconnect(&self) {
        let old = self.current.write().await.take();
        if let Some(old) = old {
            warn!(
                "Disconnecting {} store at {:?}",
                old.store.name(),
                old.endpoints
            );
            old.store.close().await;
        }
    }
}
