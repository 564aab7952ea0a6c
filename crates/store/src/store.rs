use async_trait::async_trait;
use common::{CartId, CartItemId, OrderDetailId, OrderId, PaymentId, ProductId, UserId};

use crate::{Cart, CartItem, Order, OrderDetail, Payment, Product, Result};

/// Cart and line-item persistence.
///
/// All implementations must be thread-safe (Send + Sync) because per-item
/// workers call into the same store concurrently.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Persists a new cart. Fails with `Duplicate` if the user already has one.
    async fn create_cart(&self, cart: &Cart) -> Result<()>;

    /// Loads the cart owned by `user_id`, if any.
    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Loads every line-item of a cart.
    async fn get_items_by_cart(&self, cart_id: CartId) -> Result<Vec<CartItem>>;

    async fn create_item(&self, item: &CartItem) -> Result<()>;

    /// Overwrites quantity, subtotal and audit fields of an existing item.
    async fn update_item(&self, item: &CartItem) -> Result<()>;

    async fn delete_item(&self, item_id: CartItemId) -> Result<()>;

    /// Writes the cart aggregate if the stored version still equals
    /// `cart.version`, returning the cart with its bumped version.
    ///
    /// Fails with `ConcurrencyConflict` when another writer got there first.
    async fn update_cart(&self, cart: &Cart) -> Result<Cart>;
}

/// Order, order-detail and payment persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    async fn update_order(&self, order: &Order) -> Result<()>;

    async fn delete_order(&self, order_id: OrderId) -> Result<()>;

    async fn create_order_detail(&self, detail: &OrderDetail) -> Result<()>;

    async fn get_order_details(&self, order_id: OrderId) -> Result<Vec<OrderDetail>>;

    async fn delete_order_detail(&self, detail_id: OrderDetailId) -> Result<()>;

    async fn create_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn update_payment(&self, payment: &Payment) -> Result<()>;

    async fn delete_payment(&self, payment_id: PaymentId) -> Result<()>;
}

/// Product lookup and stock mutation.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Atomically takes `quantity` units out of stock.
    ///
    /// Returns `false` (and changes nothing) when fewer than `quantity` units
    /// are available. This is a single conditional statement, never a
    /// read followed by a write.
    async fn decrement_stock(&self, product_id: ProductId, quantity: u32) -> Result<bool>;

    /// Puts `quantity` units back into stock.
    async fn increment_stock(&self, product_id: ProductId, quantity: u32) -> Result<()>;
}

/// Everything the cart engine needs from persistence.
pub trait Gateway: CartStore + OrderStore + ProductCatalog {}

// Blanket implementation for anything that provides all three contracts
impl<T: CartStore + OrderStore + ProductCatalog + ?Sized> Gateway for T {}
