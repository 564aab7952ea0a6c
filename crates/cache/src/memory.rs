use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{CacheClient, CacheError, CacheKey, Result};

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    unavailable: bool,
}

/// In-memory cache with lazy expiry.
///
/// Expired entries are dropped when they are next read. Useful for tests and
/// single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    state: Arc<RwLock<CacheState>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Unavailable` until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Returns true if a live entry exists for `key`.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let state = self.state.read().await;
        state
            .entries
            .get(&key.to_string())
            .is_some_and(|entry| entry.is_live(Instant::now()))
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn check(state: &CacheState) -> Result<()> {
    if state.unavailable {
        return Err(CacheError::Unavailable("in-memory cache disabled".into()));
    }
    Ok(())
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        {
            let state = self.state.read().await;
            check(&state)?;
            match state.entries.get(&key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(Instant::now()) => {
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired: drop it under the write lock unless it was refreshed meanwhile
        let mut state = self.state.write().await;
        if state
            .entries
            .get(&key)
            .is_some_and(|entry| !entry.is_live(Instant::now()))
        {
            state.entries.remove(&key);
            tracing::trace!(%key, "evicted expired cache entry");
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        check(&state)?;
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        let mut state = self.state.write().await;
        check(&state)?;
        state.entries.remove(&key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::UserId;

    use super::*;

    #[tokio::test]
    async fn miss_is_not_an_error() {
        let cache = InMemoryCache::new();
        let key = CacheKey::CartView(UserId::new());
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_get_delete() {
        let cache = InMemoryCache::new();
        let key = CacheKey::CartView(UserId::new());

        cache
            .set(&key, b"view".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(b"view".to_vec()));
        assert!(cache.contains(&key).await);

        cache.delete(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
        // Deleting twice is fine
        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let cache = InMemoryCache::new();
        let user = UserId::new();
        let ttl = Duration::from_secs(60);

        cache
            .set(&CacheKey::CartView(user), b"cart".to_vec(), ttl)
            .await
            .unwrap();
        cache
            .set(&CacheKey::Token(user), b"token".to_vec(), ttl)
            .await
            .unwrap();

        cache.delete(&CacheKey::CartView(user)).await.unwrap();
        assert_eq!(
            cache.get(&CacheKey::Token(user)).await.unwrap(),
            Some(b"token".to_vec())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = InMemoryCache::new();
        let key = CacheKey::CartView(UserId::new());

        cache
            .set(&key, b"view".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn unrepresentable_ttl_never_expires() {
        let cache = InMemoryCache::new();
        let key = CacheKey::CartView(UserId::new());

        cache
            .set(&key, b"view".to_vec(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), Some(b"view".to_vec()));
        assert!(cache.contains(&key).await);
    }

    #[tokio::test]
    async fn unavailable_backend_fails_every_call() {
        let cache = InMemoryCache::new();
        let key = CacheKey::CartView(UserId::new());
        cache.set_unavailable(true).await;

        assert!(matches!(
            cache.get(&key).await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.delete(&key).await.is_err());
        assert!(
            cache
                .set(&key, Vec::new(), Duration::from_secs(1))
                .await
                .is_err()
        );
    }
}
