//! Core types for the asset server

use serde::Serialize;
use std::path::PathBuf;
use ttl_file_cache::DurationSpec;

/// Configuration for the asset server
#[derive(Debug, Clone)]
pub struct AssetServerConfig {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub asset_root: PathBuf,
    pub namespace: String,
    pub expiration: DurationSpec,
    /// Reject malformed cache filenames instead of regenerating over them
    pub strict_cache: bool,
}

impl Default for AssetServerConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            cache_dir: PathBuf::from("./cache/assets"),
            asset_root: PathBuf::from("./assets"),
            namespace: "assets".to_string(),
            expiration: DurationSpec::parse("30D").unwrap(),
            strict_cache: false,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub gzip_entries: usize,
}

/// Map an asset filename to a Content-Type header value
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("html") => "text/html",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
