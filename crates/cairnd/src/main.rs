//! cairnd — the cairn shared-file-depot daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use cairn_core::config::CairnConfig;
use cairn_services::{server, ConnectionRegistry, FileStore, UserDirectory};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CairnConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CairnConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CairnConfig::default()
    });

    // Optional host:port argument overrides the configured listen address.
    let listen = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("{}:{}", config.network.listen_addr, config.network.port));

    let store = Arc::new(FileStore::new(&config.storage.root).with_context(|| {
        format!("failed to open file store at {}", config.storage.root.display())
    })?);
    tracing::info!(root = %config.storage.root.display(), "file store ready");

    // Shared state, injected into every session.
    let users = Arc::new(UserDirectory::new());
    let registry = Arc::new(ConnectionRegistry::new(users.clone()));

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(addr = %listener.local_addr()?, "cairnd listening");

    server::run(listener, store, registry, users).await
}
