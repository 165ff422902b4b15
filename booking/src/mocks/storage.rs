//! Mock durable storage.

use super::lock;
use crate::error::{FlowError, Result};
use crate::providers::DurableStorage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    fail_writes: bool,
}

/// In-memory durable storage.
///
/// Cloning shares the entries, so a clone handed to a fresh environment
/// models the same browser after a reload.
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MockStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set` fail (quota exceeded, private mode).
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }

    /// Read a value without going through the trait.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        lock(&self.inner).entries.get(key).cloned()
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner).entries.contains_key(key)
    }

    /// Write a value without going through the trait.
    pub fn insert(&self, key: &str, value: &str) {
        lock(&self.inner).entries.insert(key.to_string(), value.to_string());
    }
}

impl DurableStorage for MockStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.fail_writes {
            return Err(FlowError::general("Storage quota exceeded"));
        }
        inner.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        lock(&self.inner).entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.inner).entries.remove(key))
    }
}
