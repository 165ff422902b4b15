//! Durable key/value storage.

use crate::constants::storage_keys;
use crate::error::Result;
use crate::providers::SessionTokens;

/// Key/value storage that survives a full page reload.
///
/// # Implementation Notes
///
/// - `take()` MUST be atomic: two callers racing on the same key can never
///   both receive the value.
/// - Values are opaque strings; callers serialize.
pub trait DurableStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be read.
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be written.
    fn set(&self, key: &str, value: String) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be written.
    fn remove(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Read and delete a value in one step.
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be read or written.
    fn take(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
}

/// Store the session tokens under their well-known keys.
///
/// # Errors
///
/// Returns error if the storage cannot be written.
pub async fn persist_tokens<S: DurableStorage>(storage: &S, tokens: &SessionTokens) -> Result<()> {
    storage
        .set(storage_keys::ACCESS_TOKEN, tokens.access_token.clone())
        .await?;
    storage
        .set(storage_keys::REFRESH_TOKEN, tokens.refresh_token.clone())
        .await
}

/// Remove the session tokens.
///
/// # Errors
///
/// Returns error if the storage cannot be written.
pub async fn remove_tokens<S: DurableStorage>(storage: &S) -> Result<()> {
    storage.remove(storage_keys::ACCESS_TOKEN).await?;
    storage.remove(storage_keys::REFRESH_TOKEN).await
}
