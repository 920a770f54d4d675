//! keytree Gateway
//!
//! Browses an etcd v3 keyspace as a directory tree over HTTP.

use anyhow::Result;
use clap::Parser;
use keytree_common::Config;
use keytree_common::config::{StoreBackend, TlsConfig, parse_endpoints};
use keytree_gateway::router;
use keytree_gateway::service::AppState;
use keytree_store::ConnectionManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "keytree-gateway")]
#[command(about = "Directory-style browser API for etcd v3")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "KEYTREE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the browsing API
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Comma-separated store endpoints
    #[arg(long)]
    endpoints: Option<String>,

    /// Key separator used to infer directories
    #[arg(long)]
    separator: Option<String>,

    /// Store backend: etcd or memory
    #[arg(long)]
    backend: Option<StoreBackend>,

    /// Reach the store over TLS
    #[arg(long, default_value_t = false)]
    tls: bool,

    /// CA bundle for verifying the store
    #[arg(long)]
    cacert: Option<PathBuf>,

    /// Client certificate
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client private key
    #[arg(long)]
    key: Option<PathBuf>,

    /// Skip store certificate verification
    #[arg(long, default_value_t = false)]
    insecure_skip_verify: bool,

    /// Directory holding the browsing UI's static assets
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(assets) = &self.assets {
            config.server.assets_dir.clone_from(assets);
        }
        if let Some(endpoints) = &self.endpoints {
            config.store.endpoints = parse_endpoints(endpoints);
        }
        if let Some(separator) = &self.separator {
            config.store.separator.clone_from(separator);
        }
        if let Some(backend) = self.backend {
            config.store.backend = backend;
        }

        let wants_tls = self.tls
            || self.cacert.is_some()
            || self.cert.is_some()
            || self.key.is_some()
            || self.insecure_skip_verify;
        if wants_tls {
            let tls = config.store.tls.get_or_insert_with(TlsConfig::default);
            if self.cacert.is_some() {
                tls.ca_cert.clone_from(&self.cacert);
            }
            if self.cert.is_some() {
                tls.cert.clone_from(&self.cert);
            }
            if self.key.is_some() {
                tls.key.clone_from(&self.key);
            }
            tls.insecure_skip_verify |= self.insecure_skip_verify;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    args.apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!("Starting keytree gateway");
    info!("Store backend: {:?}", config.store.backend);
    info!("Store endpoints: {}", config.store.endpoints.join(","));
    info!("Separator: {:?}", config.store.separator);

    let connections = ConnectionManager::for_config(config.store.clone());
    // The UI can retry through /v3/connect, so a failed first connect is not fatal
    if let Err(e) = connections.connect(None).await {
        warn!("Initial store connection failed: {}", e);
    }

    let state = Arc::new(AppState::new(connections)?);
    let app = router(Arc::clone(&state), &config.server.assets_dir);

    let addr = config.server.listen;
    info!("Listening on {}", addr);
    info!("Serving assets from {}", config.server.assets_dir.display());

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;

    state.connections.disconnect().await;
    Ok(())
}
