//! The façade request handlers call into.

use std::sync::Arc;
use std::time::Instant;

use cache::CacheClient;
use common::{OrderId, UserId};
use store::{Cart, CartItem, Gateway, StoreError};

use crate::checkout::CheckoutEngine;
use crate::compensation::CompensationLog;
use crate::reconciler::ItemReconciler;
use crate::remover::ItemRemover;
use crate::request::{self, AddLine, CheckoutLine, RemoveLine};
use crate::{
    CartError, CartView, CartViewCache, CheckoutReceipt, EngineConfig, PaymentReceipt, Result,
    UserLocks, payment,
};

const INVALIDATE_ATTEMPTS: u32 = 2;

/// Cart operations for one store and one cache.
///
/// Batch operations for the same user are serialised by a per-user lock.
/// Within a batch, per-line workers run concurrently; if any of them fails,
/// or the final cart write fails, every write the batch made is undone
/// before the error is returned.
pub struct CartService<G, C> {
    store: Arc<G>,
    cache: CartViewCache<C>,
    locks: UserLocks,
    reconciler: ItemReconciler<G>,
    remover: ItemRemover<G>,
    checkout: CheckoutEngine<G>,
}

impl<G, C> CartService<G, C>
where
    G: Gateway + 'static,
    C: CacheClient,
{
    pub fn new(store: G, cache: C, config: EngineConfig) -> Self {
        let store = Arc::new(store);
        Self {
            reconciler: ItemReconciler::new(store.clone(), config.max_concurrency),
            remover: ItemRemover::new(store.clone(), config.max_concurrency),
            checkout: CheckoutEngine::new(store.clone(), config.max_concurrency),
            cache: CartViewCache::new(cache, config.cache_ttl),
            locks: UserLocks::new(),
            store,
        }
    }

    pub fn store(&self) -> &G {
        &self.store
    }

    pub fn cache(&self) -> &CartViewCache<C> {
        &self.cache
    }

    /// Creates the empty cart a newly registered user starts with.
    #[tracing::instrument(skip(self))]
    pub async fn create_cart(&self, user_id: UserId) -> Result<Cart> {
        let cart = Cart::new(user_id);
        let result = match self.store.create_cart(&cart).await {
            Ok(()) => Ok(cart),
            Err(StoreError::Duplicate { .. }) => Err(CartError::CartExists(user_id)),
            Err(e) => Err(e.into()),
        };
        self.observe("create", result)
    }

    /// Returns the user's cart view, from the cache when present.
    #[tracing::instrument(skip(self))]
    pub async fn list_items(&self, user_id: UserId) -> Result<CartView> {
        let result = self.list(user_id).await;
        self.observe("list", result)
    }

    /// Adds products to the cart, merging with line-items already there.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn add_items(&self, user_id: UserId, lines: Vec<AddLine>) -> Result<CartView> {
        let started = Instant::now();
        let result = self.add(user_id, lines).await;
        self.timed("add", started, result)
    }

    /// Removes quantities from line-items, deleting those that reach zero.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn delete_items(
        &self,
        user_id: UserId,
        lines: Vec<RemoveLine>,
    ) -> Result<CartView> {
        let started = Instant::now();
        let result = self.delete(user_id, lines).await;
        self.timed("delete", started, result)
    }

    /// Turns whole line-items into an order with an unpaid payment.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        lines: Vec<CheckoutLine>,
    ) -> Result<CheckoutReceipt> {
        let started = Instant::now();
        let result = self.check_out(user_id, lines).await;
        self.timed("checkout", started, result)
    }

    /// Settles the payment of one of the user's orders.
    #[tracing::instrument(skip(self))]
    pub async fn pay(&self, user_id: UserId, order_id: OrderId) -> Result<PaymentReceipt> {
        let _guard = self.locks.acquire(user_id).await;
        let log = CompensationLog::new();
        let result = payment::settle(self.store.as_ref(), user_id, order_id, &log).await;
        let result = self.unwind_on_error(&log, result).await;
        self.observe("pay", result)
    }

    async fn list(&self, user_id: UserId) -> Result<CartView> {
        if let Some(view) = self.cache.get(user_id).await? {
            return Ok(view);
        }

        // Writers invalidate under this lock, so a view built here is never stale
        let _guard = self.locks.acquire(user_id).await;
        let (cart, items) = self.load(user_id).await?;
        let view = CartView::new(cart, items);
        self.cache.put(&view).await?;
        Ok(view)
    }

    async fn add(&self, user_id: UserId, lines: Vec<AddLine>) -> Result<CartView> {
        request::validate(&lines)?;
        let lines = request::coalesce_adds(lines)?;

        let _guard = self.locks.acquire(user_id).await;
        let (mut cart, existing) = self.load(user_id).await?;
        // The new cart total must fit before anything is written
        request::add_price(cart.total_price, request::batch_total(&lines)?)?;

        let log = CompensationLog::new();
        let result = self.reconciler.reconcile(&cart, existing, lines, &log).await;
        let reconciled = self.unwind_on_error(&log, result).await?;

        let total = request::add_price(cart.total_price, reconciled.added);
        cart.total_price = self.unwind_on_error(&log, total).await?;
        cart.total_items = item_count(&reconciled.items);
        let cart = self.commit(&log, cart).await?;

        self.evict(user_id).await;
        Ok(CartView::new(cart, reconciled.items))
    }

    async fn delete(&self, user_id: UserId, lines: Vec<RemoveLine>) -> Result<CartView> {
        request::validate(&lines)?;
        let lines = request::coalesce_removals(lines)?;

        let _guard = self.locks.acquire(user_id).await;
        let (mut cart, existing) = self.load(user_id).await?;
        if existing.is_empty() {
            return Ok(CartView::new(cart, existing));
        }

        let log = CompensationLog::new();
        let result = self.remover.remove(&cart, existing, lines, &log).await;
        let removed = self.unwind_on_error(&log, result).await?;

        let total = request::sub_price(cart.total_price, removed.removed);
        cart.total_price = self.unwind_on_error(&log, total).await?;
        cart.total_items = item_count(&removed.items);
        let cart = self.commit(&log, cart).await?;

        self.evict(user_id).await;
        Ok(CartView::new(cart, removed.items))
    }

    async fn check_out(
        &self,
        user_id: UserId,
        lines: Vec<CheckoutLine>,
    ) -> Result<CheckoutReceipt> {
        request::validate(&lines)?;

        let _guard = self.locks.acquire(user_id).await;
        let (mut cart, existing) = self.load(user_id).await?;

        let log = CompensationLog::new();
        let result = self.checkout.checkout(&cart, existing, lines, &log).await;
        let outcome = self.unwind_on_error(&log, result).await?;

        let total = request::sub_price(cart.total_price, outcome.consumed);
        cart.total_price = self.unwind_on_error(&log, total).await?;
        cart.total_items = item_count(&outcome.items);
        self.commit(&log, cart).await?;

        self.evict(user_id).await;
        Ok(CheckoutReceipt {
            order_id: outcome.order.id,
            payment_id: outcome.payment.id,
            order_at: outcome.order.order_at,
            total_items: outcome.admitted,
            total_price: outcome.order.total_price,
        })
    }

    async fn load(&self, user_id: UserId) -> Result<(Cart, Vec<CartItem>)> {
        let cart = self
            .store
            .get_cart_by_user(user_id)
            .await?
            .ok_or(CartError::CartNotFound(user_id))?;
        let items = self.store.get_items_by_cart(cart.id).await?;
        Ok((cart, items))
    }

    /// Writes the cart aggregate, undoing the batch if that fails.
    async fn commit(&self, log: &CompensationLog, mut cart: Cart) -> Result<Cart> {
        cart.audit.touch(cart.user_id);
        let result = self.store.update_cart(&cart).await.map_err(CartError::from);
        self.unwind_on_error(log, result).await
    }

    /// Drops the cached view after a committed write, retrying once.
    ///
    /// The write already stands, so a cache failure is logged and counted
    /// rather than returned.
    async fn evict(&self, user_id: UserId) {
        for attempt in 1..=INVALIDATE_ATTEMPTS {
            match self.cache.invalidate(user_id).await {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(
                        %user_id,
                        attempt,
                        error = %err,
                        "cart view invalidation failed"
                    );
                }
            }
        }
        tracing::error!(%user_id, "cart view may be stale until it expires");
        metrics::counter!("cart_view_invalidation_failures_total").increment(1);
    }

    async fn unwind_on_error<T>(&self, log: &CompensationLog, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            let failed = log.unwind(self.store.as_ref()).await;
            if failed > 0 {
                tracing::error!(failed, error = %err, "batch only partially undone");
            }
        }
        result
    }

    fn timed<T>(
        &self,
        operation: &'static str,
        started: Instant,
        result: Result<T>,
    ) -> Result<T> {
        metrics::histogram!("cart_operation_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());
        self.observe(operation, result)
    }

    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("cart_operations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        if let Err(err) = &result {
            tracing::warn!(operation, error = %err, "cart operation failed");
        }
        result
    }
}

fn item_count(items: &[CartItem]) -> u32 {
    u32::try_from(items.len()).unwrap_or(u32::MAX)
}
