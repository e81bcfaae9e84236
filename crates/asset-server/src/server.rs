//! HTTP server serving assets through the TTL and gzip caches
//!
//! Provides /health and /assets/{name} endpoints. Asset responses go
//! through the TTL disk cache (regenerating from the asset root on
//! expiry) and, when the client accepts it, the gzip response cache.

use crate::error::Result;
use crate::types::{content_type_for, HealthResponse};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use gzip_cache::GzipCache;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use ttl_file_cache::{CacheError, DurationSpec, TtlFileCache};

/// Shared state for the HTTP server
pub struct ServerState {
    pub ttl_cache: TtlFileCache,
    pub gzip_cache: GzipCache,
    pub asset_root: PathBuf,
    pub expiration: DurationSpec,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        ttl_cache: TtlFileCache,
        gzip_cache: GzipCache,
        asset_root: PathBuf,
        expiration: DurationSpec,
    ) -> Self {
        Self {
            ttl_cache,
            gzip_cache,
            asset_root,
            expiration,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/assets/{name}", get(get_asset))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        gzip_entries: state.gzip_cache.len().await,
    })
}

/// A usable asset name: one plain filename, no path traversal.
///
/// The route captures a single segment, but percent-encoded separators
/// decode after matching, so `..%2Fsecret` arrives here as `../secret`.
fn is_valid_asset_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Serve an asset, regenerating the cached copy when it has expired
async fn get_asset(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_valid_asset_name(&name) {
        warn!(name = %name, "Rejected asset name");
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Asset not found".to_string(),
            }),
        )
            .into_response();
    }

    match load_asset(&state, &name).await {
        Ok((content, from_cache)) => deliver(&state, &name, content, from_cache, &headers).await,
        Err(e) => {
            warn!(name = %name, error = %e, "Failed to load asset");
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Asset not found".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Fetch an asset's bytes, using the TTL cache when fresh.
///
/// Returns the content and whether it came from the cache. On expiry or
/// absence the source asset is re-read and stored, evicting the previous
/// cache file.
async fn load_asset(state: &ServerState, name: &str) -> Result<(Vec<u8>, bool)> {
    let expiration = state.ttl_cache.check_expiration(name).await?;

    let mut previous = expiration.record;
    if !expiration.expired {
        if let Some(record) = &previous {
            match state.ttl_cache.read(record).await {
                Ok(content) => return Ok((content, true)),
                Err(CacheError::NotFound(file)) => {
                    // Vanished between lookup and read; fall through and
                    // regenerate without asking store to evict it
                    warn!(file = %file, "Cached file vanished before read");
                    previous = None;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let content = fs::read(state.asset_root.join(name)).await?;
    state
        .ttl_cache
        .store(previous.as_ref(), &content, name, &state.expiration)
        .await?;

    Ok((content, false))
}

/// Send content, compressed through the gzip cache when the client
/// declares support, untouched otherwise. A compressor failure degrades
/// to the uncompressed bytes rather than failing the request.
async fn deliver(
    state: &ServerState,
    name: &str,
    content: Vec<u8>,
    from_cache: bool,
    headers: &HeaderMap,
) -> Response {
    let cache_header = if from_cache { "HIT" } else { "MISS" };
    let accept_encoding = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if gzip_cache::accepts_gzip(accept_encoding) {
        match state.gzip_cache.get_or_compress(name, &content).await {
            Ok((compressed, _)) => {
                return Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, content_type_for(name))
                    .header(header::CONTENT_ENCODING, "gzip")
                    .header(header::VARY, "Accept-Encoding")
                    .header(header::CONTENT_LENGTH, compressed.len())
                    .header("X-Cache", cache_header)
                    .body(Body::from(compressed))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Compression failed, serving uncompressed");
            }
        }
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(name))
        .header(header::CONTENT_LENGTH, content.len())
        .header("X-Cache", cache_header)
        .body(Body::from(content))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
