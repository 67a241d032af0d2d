//! Durable cache tier.
//!
//! A store persists `(key, value, expires_at)` records. It does not judge
//! expiry on read; the cache in front of it does. Physical removal of stale
//! records is the store's own business (`purge_expired`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from a durable store. The cache logs and swallows these.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// One persisted cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub key: String,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Persistent key-value collection behind the fast tier.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Look up a record by key, expired or not.
    async fn find_one(&self, key: &str) -> Result<Option<CacheRecord>, StoreError>;

    /// Insert or replace the record for `key`.
    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Physically delete records that expired before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Process-local store, mostly for tests and single-run tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, CacheRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn find_one(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.records.write().insert(
            key.to_string(),
            CacheRecord {
                key: key.to_string(),
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        Ok(before - records.len())
    }
}

/// Store backed by a single JSON file.
///
/// The whole collection is held in memory and rewritten on every change.
/// Writes go to a sibling temp file that is then renamed over the target.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: tokio::sync::Mutex<HashMap<String, CacheRecord>>,
}

impl FileStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(bytes) => serde_json::from_slice::<Vec<CacheRecord>>(&bytes)?
                .into_iter()
                .map(|r| (r.key.clone(), r))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), records = records.len(), "Opened cache file");
        Ok(Self {
            path,
            records: tokio::sync::Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &HashMap<String, CacheRecord>) -> Result<(), StoreError> {
        let mut sorted: Vec<&CacheRecord> = records.values().collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));
        let bytes = serde_json::to_vec_pretty(&sorted)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn find_one(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.insert(
            key.to_string(),
            CacheRecord {
                key: key.to_string(),
                value: value.clone(),
                expires_at,
            },
        );
        self.persist(&records).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records).await?;
        }
        Ok(removed)
    }
}
