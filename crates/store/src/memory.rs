use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartId, CartItemId, OrderDetailId, OrderId, PaymentId, ProductId, UserId};
use tokio::sync::RwLock;

use crate::{
    Cart, CartItem, Order, OrderDetail, Payment, Product, Result, StoreError,
    store::{CartStore, OrderStore, ProductCatalog},
};

/// A write that the in-memory store can be told to reject.
///
/// Used by tests to simulate a single failing statement inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    /// Creating a cart item for this product.
    CreateItem(ProductId),
    /// Updating the cart item that holds this product.
    UpdateItem(ProductId),
    DeleteItem(CartItemId),
    UpdateCart,
    /// Another writer commits the cart right before `update_cart` runs, so
    /// the version check fails.
    ConcurrentCartWrite,
    CreateOrder,
    CreatePayment,
    /// Creating an order detail for this product.
    CreateOrderDetail(ProductId),
}

#[derive(Debug, Default)]
struct State {
    carts: HashMap<CartId, Cart>,
    items: HashMap<CartItemId, CartItem>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    details: HashMap<OrderDetailId, OrderDetail>,
    payments: HashMap<PaymentId, Payment>,
    failures: HashSet<FailurePoint>,
}

impl State {
    fn check(&self, point: FailurePoint) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(StoreError::Unavailable(format!("injected failure: {point:?}")));
        }
        Ok(())
    }
}

/// In-memory store implementation for tests and local runs.
///
/// Provides the same contracts as the PostgreSQL implementation, including
/// the version check on `update_cart` and the conditional stock decrement.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a catalog product.
    pub async fn insert_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id, product);
    }

    /// Makes every subsequent write matching `point` fail.
    pub async fn fail_on(&self, point: FailurePoint) {
        self.state.write().await.failures.insert(point);
    }

    /// Removes all injected failures.
    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    pub async fn order_detail_count(&self) -> usize {
        self.state.read().await.details.len()
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn create_cart(&self, cart: &Cart) -> Result<()> {
        let mut state = self.state.write().await;
        if state.carts.values().any(|c| c.user_id == cart.user_id) {
            return Err(StoreError::duplicate("cart", cart.user_id));
        }
        state.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state.carts.values().find(|c| c.user_id == user_id).cloned())
    }

    async fn get_items_by_cart(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.audit
                .created_at
                .cmp(&b.audit.created_at)
                .then(a.id.cmp(&b.id))
        });
        Ok(items)
    }

    async fn create_item(&self, item: &CartItem) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FailurePoint::CreateItem(item.product_id))?;
        if state.items.contains_key(&item.id) {
            return Err(StoreError::duplicate("cart item", item.id));
        }
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_item(&self, item: &CartItem) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FailurePoint::UpdateItem(item.product_id))?;
        match state.items.get_mut(&item.id) {
            Some(stored) => {
                *stored = item.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("cart item", item.id)),
        }
    }

    async fn delete_item(&self, item_id: CartItemId) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FailurePoint::DeleteItem(item_id))?;
        state
            .items
            .remove(&item_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("cart item", item_id))
    }

    async fn update_cart(&self, cart: &Cart) -> Result<Cart> {
        let mut state = self.state.write().await;
        state.check(FailurePoint::UpdateCart)?;
        let concurrent = state.failures.contains(&FailurePoint::ConcurrentCartWrite);
        let stored = state
            .carts
            .get_mut(&cart.id)
            .ok_or_else(|| StoreError::not_found("cart", cart.id))?;
        if concurrent {
            stored.version += 1;
        }

        if stored.version != cart.version {
            return Err(StoreError::ConcurrencyConflict {
                cart_id: cart.id,
                expected: cart.version,
                actual: stored.version,
            });
        }

        let mut updated = cart.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FailurePoint::CreateOrder)?;
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&order.id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("order", order.id)),
        }
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .orders
            .remove(&order_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }

    async fn create_order_detail(&self, detail: &OrderDetail) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FailurePoint::CreateOrderDetail(detail.product_id))?;
        state.details.insert(detail.id, detail.clone());
        Ok(())
    }

    async fn get_order_details(&self, order_id: OrderId) -> Result<Vec<OrderDetail>> {
        let state = self.state.read().await;
        let mut details: Vec<_> = state
            .details
            .values()
            .filter(|d| d.order_id == order_id)
            .cloned()
            .collect();
        details.sort_by_key(|d| d.id);
        Ok(details)
    }

    async fn delete_order_detail(&self, detail_id: OrderDetailId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .details
            .remove(&detail_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("order detail", detail_id))
    }

    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FailurePoint::CreatePayment)?;
        if state.payments.values().any(|p| p.order_id == payment.order_id) {
            return Err(StoreError::duplicate("payment", payment.order_id));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;
        match state.payments.get_mut(&payment.id) {
            Some(stored) => {
                *stored = payment.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("payment", payment.id)),
        }
    }

    async fn delete_payment(&self, payment_id: PaymentId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .payments
            .remove(&payment_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("payment", payment_id))
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn decrement_stock(&self, product_id: ProductId, quantity: u32) -> Result<bool> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        if product.stock < quantity {
            return Ok(false);
        }
        product.stock -= quantity;
        Ok(true)
    }

    async fn increment_stock(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.stock = product.stock.saturating_add(quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;

    async fn store_with_cart() -> (InMemoryStore, Cart) {
        let store = InMemoryStore::new();
        let cart = Cart::new(UserId::new());
        store.create_cart(&cart).await.unwrap();
        (store, cart)
    }

    #[tokio::test]
    async fn create_and_load_cart_by_user() {
        let (store, cart) = store_with_cart().await;

        let loaded = store.get_cart_by_user(cart.user_id).await.unwrap();
        assert_eq!(loaded, Some(cart));

        let missing = store.get_cart_by_user(UserId::new()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn second_cart_for_same_user_is_rejected() {
        let (store, cart) = store_with_cart().await;

        let result = store.create_cart(&Cart::new(cart.user_id)).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn item_lifecycle() {
        let (store, cart) = store_with_cart().await;
        let mut item = CartItem::new(
            cart.id,
            ProductId::new(),
            2,
            Money::from_cents(2000),
            cart.user_id,
        );

        store.create_item(&item).await.unwrap();
        item.quantity = 3;
        store.update_item(&item).await.unwrap();

        let items = store.get_items_by_cart(cart.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);

        store.delete_item(item.id).await.unwrap();
        assert!(store.get_items_by_cart(cart.id).await.unwrap().is_empty());

        let result = store.delete_item(item.id).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_cart_bumps_version() {
        let (store, mut cart) = store_with_cart().await;
        cart.total_items = 1;

        let updated = store.update_cart(&cart).await.unwrap();
        assert_eq!(updated.version, cart.version + 1);

        let loaded = store.get_cart_by_user(cart.user_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, updated.version);
        assert_eq!(loaded.total_items, 1);
    }

    #[tokio::test]
    async fn update_cart_with_stale_version_conflicts() {
        let (store, cart) = store_with_cart().await;
        store.update_cart(&cart).await.unwrap();

        let result = store.update_cart(&cart).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn concurrent_cart_write_moves_the_version() {
        let (store, cart) = store_with_cart().await;
        store.fail_on(FailurePoint::ConcurrentCartWrite).await;

        let result = store.update_cart(&cart).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn decrement_stock_is_conditional() {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", Money::from_cents(1000), 5);
        let id = product.id;
        store.insert_product(product).await;

        assert!(store.decrement_stock(id, 3).await.unwrap());
        assert!(!store.decrement_stock(id, 3).await.unwrap());
        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 2);

        store.increment_stock(id, 3).await.unwrap();
        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn decrement_stock_of_unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.decrement_stock(ProductId::new(), 1).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn injected_failure_rejects_matching_write_only() {
        let (store, cart) = store_with_cart().await;
        let failing = ProductId::new();
        store.fail_on(FailurePoint::CreateItem(failing)).await;

        let bad = CartItem::new(cart.id, failing, 1, Money::from_cents(100), cart.user_id);
        let good = CartItem::new(
            cart.id,
            ProductId::new(),
            1,
            Money::from_cents(100),
            cart.user_id,
        );

        assert!(matches!(
            store.create_item(&bad).await,
            Err(StoreError::Unavailable(_))
        ));
        store.create_item(&good).await.unwrap();

        store.clear_failures().await;
        store.create_item(&bad).await.unwrap();
        assert_eq!(store.get_items_by_cart(cart.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn one_payment_per_order() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let payment_id = PaymentId::new();
        let order = Order::placed(user, payment_id);
        store.create_order(&order).await.unwrap();
        store
            .create_payment(&Payment::unpaid(payment_id, order.id, user))
            .await
            .unwrap();

        let result = store
            .create_payment(&Payment::unpaid(PaymentId::new(), order.id, user))
            .await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
        assert_eq!(store.payment_count().await, 1);

        let found = store.get_payment_by_order(order.id).await.unwrap().unwrap();
        assert_eq!(found.id, payment_id);
    }
}
