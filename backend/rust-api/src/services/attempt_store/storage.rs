use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::metrics::track_storage_operation;

/// Client-side keyed store holding serialized attempt snapshots.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    fn kind(&self) -> &'static str;
}

/// One JSON file per key. Total bytes on disk are capped by `quota_bytes`.
pub struct FileStorage {
    dir: PathBuf,
    quota_bytes: u64,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes,
        }
    }

    /// Bytes outside `[A-Za-z0-9_-]` are written as `%XX`, so distinct keys
    /// never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.json", name))
    }

    async fn used_bytes_except(&self, skip: &Path) -> Result<u64> {
        let mut total = 0;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).context("Failed to list local store directory"),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path() == skip {
                continue;
            }
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        track_storage_operation("get", async {
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e)
                    .with_context(|| format!("Failed to read {}", path.display())),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        track_storage_operation("set", async {
            let used = self.used_bytes_except(&path).await?;
            let needed = used + value.len() as u64;
            if needed > self.quota_bytes {
                bail!(
                    "local store quota exceeded: {} of {} bytes",
                    needed,
                    self.quota_bytes
                );
            }

            tokio::fs::create_dir_all(&self.dir)
                .await
                .context("Failed to create local store directory")?;

            // Replace via rename so a crash never leaves a half-written snapshot.
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, value)
                .await
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .with_context(|| format!("Failed to replace {}", path.display()))
        })
        .await
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

pub struct RedisStorage {
    redis: ConnectionManager,
}

impl RedisStorage {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl KeyValueStorage for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.redis.clone();
        track_storage_operation("get", async {
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<String>>(&mut conn)
                .await
                .context("Failed to read attempts from Redis")
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        track_storage_operation("set", async {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to save attempts to Redis")
        })
        .await
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if used + value.len() > quota {
                bail!(
                    "local store quota exceeded: {} of {} bytes",
                    used + value.len(),
                    quota
                );
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
