use std::time::Duration;

use async_trait::async_trait;

use crate::{CacheKey, Result};

/// Byte-level key/value cache with per-entry expiry.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Returns the stored bytes, or `None` on a miss or an expired entry.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removes the entry. Deleting an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> Result<()>;
}
