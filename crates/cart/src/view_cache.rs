//! Read-through, write-invalidate cache for materialized cart views.

use std::time::Duration;

use cache::{CacheClient, CacheKey};
use common::UserId;

use crate::{CartView, Result};

/// Cache coordinator for [`CartView`]s.
///
/// A miss is not an error. Backend failures propagate to the caller.
pub struct CartViewCache<C> {
    client: C,
    ttl: Duration,
}

impl<C: CacheClient> CartViewCache<C> {
    pub fn new(client: C, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Probes the cache for `user_id`'s view.
    pub async fn get(&self, user_id: UserId) -> Result<Option<CartView>> {
        let key = CacheKey::CartView(user_id);
        match self.client.get(&key).await? {
            Some(bytes) => {
                metrics::counter!("cart_view_cache_total", "result" => "hit").increment(1);
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            None => {
                metrics::counter!("cart_view_cache_total", "result" => "miss").increment(1);
                Ok(None)
            }
        }
    }

    /// Stores `view` under its owner's key with the configured expiry.
    pub async fn put(&self, view: &CartView) -> Result<()> {
        let bytes = serde_json::to_vec(view)?;
        self.client
            .set(&CacheKey::CartView(view.cart.user_id), bytes, self.ttl)
            .await?;
        Ok(())
    }

    /// Drops the cached view so the next read rebuilds it.
    pub async fn invalidate(&self, user_id: UserId) -> Result<()> {
        self.client.delete(&CacheKey::CartView(user_id)).await?;
        tracing::debug!(%user_id, "cart view invalidated");
        Ok(())
    }
}
