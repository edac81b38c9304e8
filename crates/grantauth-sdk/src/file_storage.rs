//! Shared storage backed by a JSON file.
//!
//! The closest analogue to browser local storage for desktop processes:
//! every process pointed at the same file shares its entries, and the file
//! survives restarts. Each operation re-reads the file so writes from other
//! processes are visible; writes go through a temporary file and a rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::SharedStorage;

const APP_DIR: &str = "grantauth";

/// [`SharedStorage`] persisted as a flat JSON object.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Use an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Use `{config_dir}/grantauth/{namespace}.json`, creating the directory
    /// if needed.
    pub async fn in_config_dir(namespace: &str) -> Result<Self, StorageError> {
        let dir = dirs::config_dir()
            .ok_or_else(|| StorageError::Config("no config directory for this user".into()))?
            .join(APP_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self::new(dir.join(format!("{namespace}.json"))))
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    // A torn write from another process; start over.
                    warn!(path = %self.path.display(), error = %e, "discarding unreadable storage file");
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)?;
        // Unique per write so concurrent processes never share a temp file.
        let tmp = self.path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "storage file written");
        Ok(())
    }
}

#[async_trait]
impl SharedStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load().await?.remove(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}
