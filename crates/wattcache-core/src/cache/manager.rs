use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::key::{CacheKey, Params};

/// Default TTL for reads when the caller has no opinion (1 hour)
pub const DEFAULT_TTL_SECS: u64 = 3_600;

/// Default age after which `cleanup_expired` removes entries (24 hours)
pub const DEFAULT_CLEANUP_TTL_SECS: u64 = 86_400;

const ENTRY_EXTENSION: &str = "json";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One cached response. Only the write time is stored; freshness is decided
/// by whoever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix seconds, fractional
    pub timestamp: f64,
    pub endpoint: String,
    #[serde(default)]
    pub params: Params,
    pub data: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn unix_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

impl CacheEntry {
    pub fn new(endpoint: &str, params: &Params, data: Value, metadata: Map<String, Value>) -> Self {
        Self {
            timestamp: unix_now(),
            endpoint: endpoint.to_string(),
            params: params.clone(),
            data,
            metadata,
        }
    }

    /// Age in seconds. Negative when the writer's clock was ahead.
    pub fn age_secs(&self) -> f64 {
        unix_now() - self.timestamp
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age_secs() <= ttl.as_secs_f64()
    }

    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis((self.timestamp * 1000.0) as i64)
    }

    /// Content type recorded when the entry was written
    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get("content_type").and_then(Value::as_str)
    }

    pub fn age_display(&self) -> String {
        let minutes = (self.age_secs() / 60.0).floor() as i64;
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub cache_dir: PathBuf,
}

/// File-backed response cache: one JSON file per [`CacheKey`].
///
/// Every public operation fails soft. Read problems are misses, write
/// problems come back as `false`, and nothing here returns an error to the
/// request pipeline.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_entry(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        let contents = serde_json::to_string_pretty(entry)?;
        std::fs::write(self.cache_path(key), contents)?;
        Ok(())
    }

    /// The whole entry, if present, readable and no older than `ttl`
    pub fn get_entry(&self, endpoint: &str, params: &Params, ttl: Duration) -> Option<CacheEntry> {
        let key = CacheKey::new(endpoint, params);
        let path = self.cache_path(&key);
        if !path.exists() {
            return None;
        }

        let entry = match Self::read_entry(&path) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(endpoint, cache_key = %key, error = %e, "Failed to read cache");
                return None;
            }
        };

        if !entry.is_fresh(ttl) {
            debug!(
                endpoint,
                age_secs = entry.age_secs() as i64,
                ttl_secs = ttl.as_secs(),
                "Cache expired"
            );
            return None;
        }

        debug!(endpoint, age = %entry.age_display(), "Cache hit");
        Some(entry)
    }

    /// Cached payload, if present, readable and no older than `ttl`
    pub fn get(&self, endpoint: &str, params: &Params, ttl: Duration) -> Option<Value> {
        self.get_entry(endpoint, params, ttl).map(|entry| entry.data)
    }

    /// Store a payload, replacing any previous entry. `false` on I/O failure.
    pub fn set(
        &self,
        endpoint: &str,
        params: &Params,
        data: Value,
        metadata: Map<String, Value>,
    ) -> bool {
        let key = CacheKey::new(endpoint, params);
        let entry = CacheEntry::new(endpoint, params, data, metadata);
        match self.write_entry(&key, &entry) {
            Ok(()) => {
                debug!(endpoint, cache_key = %key, "Cached data");
                true
            }
            Err(e) => {
                warn!(endpoint, error = %e, "Failed to cache data");
                false
            }
        }
    }

    /// Remove one entry. Succeeds when it was never there.
    pub fn invalidate(&self, endpoint: &str, params: &Params) -> bool {
        let path = self.cache_path(&CacheKey::new(endpoint, params));
        if !path.exists() {
            return true;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(endpoint, "Invalidated cache");
                true
            }
            Err(e) => {
                warn!(endpoint, error = %e, "Failed to invalidate cache");
                false
            }
        }
    }

    /// Remove every entry. Succeeds on an empty or missing directory.
    pub fn clear_all(&self) -> bool {
        let files = match self.entry_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Failed to clear cache");
                return false;
            }
        };
        for path in files {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to clear cache");
                return false;
            }
        }
        info!("Cleared all cache entries");
        true
    }

    /// Delete entries older than `default_ttl`, plus any that fail to parse.
    /// Returns how many files were removed.
    pub fn cleanup_expired(&self, default_ttl: Duration) -> usize {
        let files = match self.entry_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Failed to list cache entries");
                return 0;
            }
        };

        let mut cleaned = 0;
        for path in files {
            let remove = match Self::read_entry(&path) {
                Ok(entry) => !entry.is_fresh(default_ttl),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Removing corrupt cache file");
                    true
                }
            };
            if remove && std::fs::remove_file(&path).is_ok() {
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            info!(count = cleaned, "Cleaned up expired cache entries");
        }
        cleaned
    }

    pub fn stats(&self) -> CacheStats {
        let files = self.entry_files().unwrap_or_default();
        let total_size_bytes: u64 = files
            .iter()
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum();
        let total_size_mb = (total_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

        CacheStats {
            total_entries: files.len(),
            total_size_bytes,
            total_size_mb,
            cache_dir: self.cache_dir.clone(),
        }
    }

    fn entry_files(&self) -> std::io::Result<Vec<PathBuf>> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

// ============================================================================
// Tests
// ============================================================================
