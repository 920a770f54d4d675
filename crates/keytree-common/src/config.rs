//! Configuration types for keytree
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `KEYTREE__SECTION__FIELD` environment variables. The gateway applies its
//! command-line flags on top of the loaded value.

use crate::error::{Error, Result};
use crate::types::DEFAULT_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "KEYTREE";

/// Root configuration for keytree
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Backing store configuration
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from an optional file plus the environment.
    ///
    /// A missing `path` means defaults + environment only; a `path` that
    /// does not exist is an error. The result is not validated: callers
    /// apply their own overrides first, then call [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("store.endpoints"),
        );

        let loaded: Self = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::configuration(e.to_string()))?;
        Ok(loaded)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.store.validate()
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the browsing API
    pub listen: SocketAddr,
    /// Directory holding the browsing UI's static assets
    pub assets_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            assets_dir: PathBuf::from("./assets"),
        }
    }
}

/// Which store adapter to open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// etcd v3 via its JSON gateway
    #[default]
    Etcd,
    /// In-process store (development and tests)
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "etcd" => Ok(Self::Etcd),
            "memory" => Ok(Self::Memory),
            other => Err(Error::configuration(format!(
                "unknown store backend '{other}' (expected 'etcd' or 'memory')"
            ))),
        }
    }
}

/// Backing store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store adapter
    pub backend: StoreBackend,
    /// Store endpoints (`host:port`, scheme added from the TLS setting)
    pub endpoints: Vec<String>,
    /// Path separator used to infer directories
    pub separator: String,
    /// Connect timeout (milliseconds)
    pub dial_timeout_ms: u64,
    /// Per-query timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// Maximum concurrent lease lookups per request
    pub lease_lookup_concurrency: usize,
    /// TLS material; `None` means plain HTTP
    pub tls: Option<TlsConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Etcd,
            endpoints: vec!["127.0.0.1:2379".to_string()],
            separator: DEFAULT_SEPARATOR.to_string(),
            dial_timeout_ms: 5000,
            request_timeout_ms: 5000,
            lease_lookup_concurrency: 16,
            tls: None,
        }
    }
}

impl StoreConfig {
    /// Check the store section for unusable values
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_empty() {
            return Err(Error::configuration("separator must not be empty"));
        }
        if self.backend == StoreBackend::Etcd && self.endpoints.is_empty() {
            return Err(Error::configuration(
                "at least one store endpoint is required",
            ));
        }
        if self.lease_lookup_concurrency == 0 {
            return Err(Error::configuration(
                "lease_lookup_concurrency must be at least 1",
            ));
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(())
    }

    /// Replace the endpoint list, keeping everything else
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Whether the store is reached over TLS
    #[must_use]
    pub const fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }
}

/// TLS material for reaching the store
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// CA bundle (PEM) used to verify the store
    pub ca_cert: Option<PathBuf>,
    /// Client certificate (PEM)
    pub cert: Option<PathBuf>,
    /// Client private key (PEM)
    pub key: Option<PathBuf>,
    /// Skip server certificate verification
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    fn validate(&self) -> Result<()> {
        match (&self.cert, &self.key) {
            (Some(_), None) => Err(Error::configuration(
                "tls client certificate given without a key",
            )),
            (None, Some(_)) => Err(Error::configuration(
                "tls client key given without a certificate",
            )),
            _ => Ok(()),
        }
    }
}

/// Split a comma-separated endpoint list, dropping blanks
#[must_use]
pub fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
