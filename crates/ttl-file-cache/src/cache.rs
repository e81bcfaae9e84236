//! Directory-scanning TTL cache over filename-encoded metadata

use crate::error::{CacheError, Result};
use crate::types::{CacheRecord, DurationSpec, Expiration};
use chrono::{DateTime, FixedOffset, Local};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A disk cache whose only index is the cache directory listing.
///
/// Lookups scan the directory linearly and match entries by filename
/// suffix, so namespace/logical-name pairs must not be suffixes of one
/// another. The intended population is small; no secondary index exists.
pub struct TtlFileCache {
    namespace: String,
    cache_dir: PathBuf,
    /// Reject malformed filenames instead of returning incomplete records
    strict: bool,
    /// Serializes the delete-then-write in `store` per derived key
    store_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TtlFileCache {
    /// Create a cache over `cache_dir`, partitioned by `namespace`
    pub fn new(namespace: impl Into<String>, cache_dir: PathBuf) -> Self {
        Self {
            namespace: namespace.into(),
            cache_dir,
            strict: false,
            store_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Toggle strict mode: malformed filenames become errors instead of
    /// incomplete records treated as expired
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Ensure the cache directory exists.
    ///
    /// Lookups and stores do not create the directory themselves; a
    /// missing directory surfaces as an IO error.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        info!(cache_dir = ?self.cache_dir, namespace = %self.namespace, "Cache initialized");
        Ok(())
    }

    /// The filename suffix identifying `logical_name` in this namespace
    pub fn derive_key(&self, logical_name: &str) -> String {
        format!("{}.{}", self.namespace, logical_name)
    }

    /// Scan the cache directory for the first file whose name ends with
    /// the derived key. Absence is `Ok(None)`, not an error.
    pub async fn lookup(&self, logical_name: &str) -> Result<Option<CacheRecord>> {
        let key = self.derive_key(logical_name);
        let mut dir = fs::read_dir(&self.cache_dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let file = entry.file_name().to_string_lossy().into_owned();
            if !file.ends_with(&key) {
                continue;
            }

            // The prefix before the first '.' holds "<createdAt>_<duration>"
            let prefix = file.split('.').next().unwrap_or("");
            let mut parts = prefix.split('_');
            let created_at = parts.next().unwrap_or("").to_string();
            let duration = parts.next().unwrap_or("").to_string();

            if created_at.is_empty() || duration.is_empty() {
                if self.strict {
                    return Err(CacheError::MalformedRecord(file));
                }
                warn!(file = %file, "Cache filename prefix did not parse");
            }

            return Ok(Some(CacheRecord {
                filename: file,
                created_at,
                duration,
            }));
        }

        Ok(None)
    }

    /// Check whether the entry for `logical_name` is expired as of now
    pub async fn check_expiration(&self, logical_name: &str) -> Result<Expiration> {
        self.check_expiration_at(logical_name, &Local::now().fixed_offset())
            .await
    }

    /// Check expiration against an explicit instant.
    ///
    /// A missing entry is expired with no record. The boundary is
    /// inclusive: an entry exactly `limit` units old is not yet expired.
    pub async fn check_expiration_at(
        &self,
        logical_name: &str,
        now: &DateTime<FixedOffset>,
    ) -> Result<Expiration> {
        let record = match self.lookup(logical_name).await? {
            Some(record) => record,
            None => {
                debug!(logical_name = %logical_name, "No cache entry");
                return Ok(Expiration {
                    expired: true,
                    record: None,
                });
            }
        };

        let spec = DurationSpec::parse(&record.duration);
        let created = datestamp::decode(&record.created_at);
        let (spec, created) = match (spec, created) {
            (Some(spec), Some(created)) => (spec, created),
            _ => {
                if self.strict {
                    return Err(CacheError::MalformedRecord(record.filename));
                }
                warn!(file = %record.filename, "Unparseable cache metadata, treating as expired");
                return Ok(Expiration {
                    expired: true,
                    record: Some(record),
                });
            }
        };

        let age = datestamp::difference(&created, now, spec.unit);
        let expired = age > spec.limit;
        debug!(
            file = %record.filename,
            age,
            limit = spec.limit,
            expired,
            "Checked cache expiration"
        );

        Ok(Expiration {
            expired,
            record: Some(record),
        })
    }

    /// Read the raw bytes of a cached record.
    ///
    /// A file that vanished between lookup and read maps to
    /// [`CacheError::NotFound`] so callers can fall back to regeneration.
    pub async fn read(&self, record: &CacheRecord) -> Result<Vec<u8>> {
        match fs::read(self.cache_dir.join(&record.filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(CacheError::NotFound(record.filename.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Store fresh content for `logical_name`, evicting `previous` first.
    ///
    /// Callers pass the record from their latest lookup so the old file
    /// is deleted before the new one is written; a failed delete fails
    /// the call, so pass `None` if the previous file may already be gone.
    pub async fn store(
        &self,
        previous: Option<&CacheRecord>,
        content: &[u8],
        logical_name: &str,
        duration: &DurationSpec,
    ) -> Result<()> {
        self.store_at(
            previous,
            content,
            logical_name,
            duration,
            &Local::now().fixed_offset(),
        )
        .await
    }

    /// Store with an explicit creation instant
    pub async fn store_at(
        &self,
        previous: Option<&CacheRecord>,
        content: &[u8],
        logical_name: &str,
        duration: &DurationSpec,
        now: &DateTime<FixedOffset>,
    ) -> Result<()> {
        let key = self.derive_key(logical_name);

        // Per-key mutex so concurrent stores cannot interleave the
        // delete and write for the same logical name
        let lock = {
            let mut locks = self.store_locks.lock().await;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock().await;

        let result: Result<()> = async {
            if let Some(previous) = previous {
                fs::remove_file(self.cache_dir.join(&previous.filename)).await?;
                debug!(file = %previous.filename, "Evicted previous cache file");
            }

            let filename = format!("{}_{}.{}", datestamp::encode(now), duration, key);
            fs::write(self.cache_dir.join(&filename), content).await?;
            debug!(file = %filename, size = content.len(), "Stored cache file");

            Ok(())
        }
        .await;

        drop(guard);

        // Prune the key's lock once no other store holds a clone; taking
        // a clone requires the map mutex, so the count check is race-free
        let mut locks = self.store_locks.lock().await;
        drop(lock);
        if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn at(millis: i64, tz_hours: i32) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(tz_hours * 3600).unwrap();
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap()
            .with_timezone(&offset)
    }

    fn spec(token: &str) -> DurationSpec {
        DurationSpec::parse(token).unwrap()
    }

    fn list_matching(dir: &std::path::Path, suffix: &str) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|f| f.ends_with(suffix))
            .collect()
    }

    #[tokio::test]
    async fn test_store_lookup_read_round_trip() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());

        cache
            .store(None, b"body { color: red }", "a.css", &spec("30D"))
            .await
            .unwrap();

        let record = cache.lookup("a.css").await.unwrap().unwrap();
        assert_eq!(record.duration, "30D");
        assert!(record.filename.ends_with(".ns.a.css"));

        let bytes = cache.read(&record).await.unwrap();
        assert_eq!(bytes, b"body { color: red }");
    }

    #[tokio::test]
    async fn test_store_filename_format() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());

        cache
            .store_at(None, b"body", "a.css", &spec("30D"), &at(1000, 1))
            .await
            .unwrap();

        assert!(dir.path().join("1000+1_30D.ns.a.css").exists());
    }

    #[tokio::test]
    async fn test_lookup_absent() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());
        assert!(cache.lookup("missing.css").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_missing_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().join("never-created"));
        assert!(matches!(
            cache.lookup("a.css").await,
            Err(CacheError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_check_expiration_absent_is_expired() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());

        let result = cache.check_expiration("a.css").await.unwrap();
        assert!(result.expired);
        assert!(result.record.is_none());
    }

    #[tokio::test]
    async fn test_expiration_day_boundary_is_inclusive() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());
        let created = at(1000, 1);

        cache
            .store_at(None, b"body", "a.css", &spec("30D"), &created)
            .await
            .unwrap();

        let day = Duration::days(1);
        for (elapsed_days, expired) in [(29, false), (30, false), (31, true)] {
            let now = (created + day * elapsed_days).fixed_offset();
            let result = cache.check_expiration_at("a.css", &now).await.unwrap();
            assert_eq!(result.expired, expired, "at {} days", elapsed_days);
            assert!(result.record.is_some());
        }
    }

    #[tokio::test]
    async fn test_expiration_month_tracks_calendar() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());
        let created = "2024-01-31T12:00:00+00:00"
            .parse::<DateTime<FixedOffset>>()
            .unwrap();

        cache
            .store_at(None, b"body", "a.css", &spec("1M"), &created)
            .await
            .unwrap();

        let feb29 = "2024-02-29T12:00:00+00:00"
            .parse::<DateTime<FixedOffset>>()
            .unwrap();
        let mar01 = "2024-03-01T12:00:00+00:00"
            .parse::<DateTime<FixedOffset>>()
            .unwrap();

        assert!(!cache.check_expiration_at("a.css", &feb29).await.unwrap().expired);
        assert!(cache.check_expiration_at("a.css", &mar01).await.unwrap().expired);
    }

    #[tokio::test]
    async fn test_expiration_year_boundary() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());
        let created = "2023-06-01T00:00:00+00:00"
            .parse::<DateTime<FixedOffset>>()
            .unwrap();

        cache
            .store_at(None, b"body", "a.css", &spec("1Y"), &created)
            .await
            .unwrap();

        let next_year = "2024-12-31T00:00:00+00:00"
            .parse::<DateTime<FixedOffset>>()
            .unwrap();
        let year_after = "2025-01-01T00:00:00+00:00"
            .parse::<DateTime<FixedOffset>>()
            .unwrap();

        assert!(!cache
            .check_expiration_at("a.css", &next_year)
            .await
            .unwrap()
            .expired);
        assert!(cache
            .check_expiration_at("a.css", &year_after)
            .await
            .unwrap()
            .expired);
    }

    #[tokio::test]
    async fn test_store_evicts_previous_file() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());

        cache
            .store_at(None, b"v1", "a.css", &spec("30D"), &at(1000, 0))
            .await
            .unwrap();
        let previous = cache.lookup("a.css").await.unwrap().unwrap();

        cache
            .store_at(Some(&previous), b"v2", "a.css", &spec("30D"), &at(2000, 0))
            .await
            .unwrap();

        let files = list_matching(dir.path(), ".ns.a.css");
        assert_eq!(files, vec!["2000+0_30D.ns.a.css".to_string()]);

        let record = cache.lookup("a.css").await.unwrap().unwrap();
        assert_eq!(cache.read(&record).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_store_fails_when_previous_already_gone() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());

        cache
            .store(None, b"v1", "a.css", &spec("30D"))
            .await
            .unwrap();
        let previous = cache.lookup("a.css").await.unwrap().unwrap();
        std::fs::remove_file(dir.path().join(&previous.filename)).unwrap();

        let result = cache
            .store(Some(&previous), b"v2", "a.css", &spec("30D"))
            .await;
        assert!(matches!(result, Err(CacheError::Io(_))));
    }

    #[tokio::test]
    async fn test_read_vanished_file_is_not_found() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());

        cache
            .store(None, b"body", "a.css", &spec("30D"))
            .await
            .unwrap();
        let record = cache.lookup("a.css").await.unwrap().unwrap();
        std::fs::remove_file(dir.path().join(&record.filename)).unwrap();

        assert!(matches!(
            cache.read(&record).await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lenient_mode_returns_incomplete_record() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());
        std::fs::write(dir.path().join("garbage.ns.a.css"), b"stale").unwrap();

        let record = cache.lookup("a.css").await.unwrap().unwrap();
        assert_eq!(record.filename, "garbage.ns.a.css");
        assert_eq!(record.created_at, "garbage");
        assert_eq!(record.duration, "");

        let result = cache.check_expiration("a.css").await.unwrap();
        assert!(result.expired);
        assert!(result.record.is_some());
    }

    #[tokio::test]
    async fn test_lenient_mode_bad_unit_is_expired() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());
        std::fs::write(dir.path().join("1000+1_5X.ns.a.css"), b"stale").unwrap();

        let result = cache.check_expiration("a.css").await.unwrap();
        assert!(result.expired);
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_malformed_filenames() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf()).strict(true);
        std::fs::write(dir.path().join("garbage.ns.a.css"), b"stale").unwrap();

        assert!(matches!(
            cache.lookup("a.css").await,
            Err(CacheError::MalformedRecord(_))
        ));

        std::fs::remove_file(dir.path().join("garbage.ns.a.css")).unwrap();
        std::fs::write(dir.path().join("1000+1_5X.ns.b.css"), b"stale").unwrap();
        assert!(matches!(
            cache.check_expiration("b.css").await,
            Err(CacheError::MalformedRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_namespaces_partition_entries() {
        let dir = tempdir().unwrap();
        let minify = TtlFileCache::new("minify", dir.path().to_path_buf());
        let thumbs = TtlFileCache::new("thumbs", dir.path().to_path_buf());

        minify
            .store(None, b"minified", "a.css", &spec("30D"))
            .await
            .unwrap();

        assert!(thumbs.lookup("a.css").await.unwrap().is_none());
        assert!(minify.lookup("a.css").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_init_creates_directory() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().join("nested").join("cache"));
        cache.init().await.unwrap();
        assert!(cache.lookup("a.css").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_stores_leave_one_file() {
        let dir = tempdir().unwrap();
        let cache = std::sync::Arc::new(TtlFileCache::new("ns", dir.path().to_path_buf()));

        // Same creation instant, so every store targets the same name;
        // overwriting an identical filename is not an error
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let content = format!("v{}", i);
                cache
                    .store_at(None, content.as_bytes(), "a.css", &spec("30D"), &at(0, 0))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let files = list_matching(dir.path(), ".ns.a.css");
        assert_eq!(files, vec!["0+0_30D.ns.a.css".to_string()]);
        assert!(cache.store_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_locks_do_not_accumulate() {
        let dir = tempdir().unwrap();
        let cache = TtlFileCache::new("ns", dir.path().to_path_buf());

        for name in ["a.css", "b.css", "c.css"] {
            cache.store(None, b"body", name, &spec("30D")).await.unwrap();
        }

        assert!(cache.store_locks.lock().await.is_empty());

        // A failed store also releases its lock entry
        let previous = CacheRecord {
            filename: "0+0_30D.ns.gone.css".to_string(),
            created_at: "0+0".to_string(),
            duration: "30D".to_string(),
        };
        let result = cache
            .store(Some(&previous), b"body", "gone.css", &spec("30D"))
            .await;
        assert!(result.is_err());
        assert!(cache.store_locks.lock().await.is_empty());
    }
}
