//! Asset server - TTL-cached asset delivery with gzip response caching
//!
//! Serves generated assets from a disk cache whose expiration metadata
//! lives entirely in filenames, compressing responses through a
//! checksum-gated in-memory gzip cache.

mod error;
mod server;
mod types;

use crate::error::{AssetServerError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::AssetServerConfig;
use gzip_cache::GzipCache;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};
use ttl_file_cache::{DurationSpec, TtlFileCache};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("asset_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting asset server...");

    // Load configuration from environment
    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Asset root: {:?}", config.asset_root);
    info!("Namespace: {}", config.namespace);
    info!("Expiration: {}", config.expiration);

    // Create caches
    let ttl_cache =
        TtlFileCache::new(config.namespace, config.cache_dir).strict(config.strict_cache);
    ttl_cache.init().await?;

    let gzip_cache = GzipCache::new();

    // Create shared state
    let state: SharedState = Arc::new(ServerState::new(
        ttl_cache,
        gzip_cache,
        config.asset_root,
        config.expiration,
    ));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| AssetServerError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> Result<AssetServerConfig> {
    let defaults = AssetServerConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let asset_root = std::env::var("ASSET_ROOT")
        .map(PathBuf::from)
        .unwrap_or(defaults.asset_root);

    let namespace = std::env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace);

    let expiration = match std::env::var("CACHE_EXPIRATION") {
        Ok(token) => DurationSpec::parse(&token).ok_or_else(|| {
            AssetServerError::Config(format!("invalid CACHE_EXPIRATION: {}", token))
        })?,
        Err(_) => defaults.expiration,
    };

    let strict_cache = std::env::var("CACHE_STRICT")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(defaults.strict_cache);

    Ok(AssetServerConfig {
        port,
        cache_dir,
        asset_root,
        namespace,
        expiration,
        strict_cache,
    })
}
