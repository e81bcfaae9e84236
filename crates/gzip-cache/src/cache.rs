//! In-memory compressed-body cache gated on content checksums

use crate::error::{GzipError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;

/// One memoized compressed payload
#[derive(Debug, Clone)]
struct GzipEntry {
    content: Vec<u8>,
    checksum: String,
}

/// A process-local cache of gzip-compressed bodies, keyed by logical
/// name and validated against the uncompressed content's checksum.
///
/// Concurrent callers racing on a stale key may both invoke the
/// compressor; both produce the same entry and the last write wins, so
/// the redundancy is wasted work rather than corruption.
pub struct GzipCache {
    entries: RwLock<HashMap<String, GzipEntry>>,
    /// Compressor binary; the flag set matches `gzip -9 -c -f -n`
    program: String,
}

impl Default for GzipCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GzipCache {
    /// Create an empty cache driving the system `gzip` binary
    pub fn new() -> Self {
        Self::with_program("gzip")
    }

    /// Create an empty cache driving a specific compressor binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            program: program.into(),
        }
    }

    /// SHA-256 hex digest of the raw content bytes
    pub fn checksum(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    /// Return the cached compressed bytes for `key` if the stored
    /// checksum still matches `content`; otherwise compress `content`,
    /// replace the entry, and return the fresh bytes.
    ///
    /// The boolean is `true` when the cached bytes were served.
    pub async fn get_or_compress(&self, key: &str, content: &[u8]) -> Result<(Vec<u8>, bool)> {
        let checksum = Self::checksum(content);

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.checksum == checksum {
                    debug!(key = %key, "Serving cached compressed body");
                    return Ok((entry.content.clone(), true));
                }
                debug!(key = %key, "Checksum changed, recompressing");
            }
        }

        let compressed = self.compress(content).await?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            GzipEntry {
                content: compressed.clone(),
                checksum,
            },
        );
        debug!(key = %key, size = compressed.len(), "Cached compressed body");

        Ok((compressed, false))
    }

    /// Compress `content` by piping it through the external compressor.
    ///
    /// All output is collected before returning; any stderr output or a
    /// non-zero exit reports [`GzipError::Compressor`].
    pub async fn compress(&self, content: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(["-9", "-c", "-f", "-n"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GzipError::Compressor("compressor stdin unavailable".to_string()))?;

        // Feed stdin from a separate task so a payload larger than the
        // pipe buffer cannot deadlock against the unread stdout
        let input = content.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await?;

        if !output.status.success() || !output.stderr.is_empty() {
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GzipError::Compressor(if message.is_empty() {
                format!("compressor exited with {}", output.status)
            } else {
                message
            }));
        }

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err.into()),
            Err(err) => return Err(GzipError::Compressor(err.to_string())),
        }

        Ok(output.stdout)
    }

    /// Drop the entry for `key`, if any
    pub async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Drop every entry
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Number of memoized entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Whether an `Accept-Encoding` header value declares gzip support
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.to_ascii_lowercase().contains("gzip")
}
