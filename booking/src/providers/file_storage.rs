//! JSON-file durable storage.

use crate::error::{FlowError, Result};
use crate::providers::DurableStorage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

type Entries = BTreeMap<String, String>;

/// Durable storage backed by a single JSON object on disk.
///
/// Every operation reads, modifies and rewrites the file under one async
/// lock, so `take()` is atomic within the process. Writes go to a sibling
/// temporary file that is renamed over the original. A file that does not
/// parse is reported as an error and never rewritten.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Use `path` as the backing file. It is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries> {
        match tokio::fs::read(self.path.as_path()).await {
            Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
            // A corrupt file is left in place rather than overwritten
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| storage_error("decode", &e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(storage_error("read", &e)),
        }
    }

    async fn save(&self, entries: &Entries) -> Result<()> {
        let payload = serde_json::to_vec(entries).map_err(|e| storage_error("encode", &e))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| storage_error("write", &e))?;
        tokio::fs::rename(&tmp, self.path.as_path())
            .await
            .map_err(|e| storage_error("rename", &e))
    }
}

fn storage_error(op: &str, error: &dyn std::fmt::Display) -> FlowError {
    tracing::error!(%error, op, "Durable storage failure");
    FlowError::general("Unable to save your progress on this device.")
}

impl DurableStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let value = entries.remove(key);
        if value.is_some() {
            self.save(&entries).await?;
        }
        Ok(value)
    }
}
