//! Row models owned by the gateway.

use chrono::{DateTime, SubsecRound, Utc};
use common::{CartId, CartItemId, Money, OrderDetailId, OrderId, PaymentId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Current time at the precision the database stores (microseconds), so a
/// row read back compares equal to the value that was written.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Who created and last touched a row, plus the reserved soft-delete marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_by: UserId,
    pub updated_at: DateTime<Utc>,
    pub deleted_by: Option<UserId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Audit {
    /// Stamps a freshly created row.
    pub fn new(actor: UserId) -> Self {
        let at = now();
        Self {
            created_by: actor,
            created_at: at,
            updated_by: actor,
            updated_at: at,
            deleted_by: None,
            deleted_at: None,
        }
    }

    /// Records a modification by `actor`.
    pub fn touch(&mut self, actor: UserId) {
        self.updated_by = actor;
        self.updated_at = now();
    }
}

/// A user's cart aggregate.
///
/// `total_price` tracks the sum of the line-item subtotals and `total_items`
/// the number of line-items. `version` increases on every committed update
/// and is what `update_cart` checks against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub total_price: Money,
    pub total_items: u32,
    pub version: i64,
    pub audit: Audit,
}

impl Cart {
    /// Creates the empty cart a user receives on registration.
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            total_price: Money::zero(),
            total_items: 0,
            version: 0,
            audit: Audit::new(user_id),
        }
    }
}

/// One product entry within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub subtotal: Money,
    pub audit: Audit,
}

impl CartItem {
    pub fn new(
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        subtotal: Money,
        actor: UserId,
    ) -> Self {
        Self {
            id: CartItemId::new(),
            cart_id,
            product_id,
            quantity,
            subtotal,
            audit: Audit::new(actor),
        }
    }
}

/// Catalog product as seen by checkout: price and mutable stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Placed,
    Paid,
}

impl OrderStatus {
    /// Column encoding.
    pub fn as_i16(self) -> i16 {
        match self {
            OrderStatus::Placed => 0,
            OrderStatus::Paid => 1,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(OrderStatus::Placed),
            1 => Some(OrderStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    /// Column encoding.
    pub fn as_i16(self) -> i16 {
        match self {
            PaymentStatus::Unpaid => 0,
            PaymentStatus::Paid => 1,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(PaymentStatus::Unpaid),
            1 => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

/// An order created by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub payment_id: Option<PaymentId>,
    pub total_price: Money,
    pub status: OrderStatus,
    pub order_at: DateTime<Utc>,
    pub payment_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub audit: Audit,
}

impl Order {
    /// A freshly placed order with no lines yet.
    pub fn placed(user_id: UserId, payment_id: PaymentId) -> Self {
        let audit = Audit::new(user_id);
        Self {
            id: OrderId::new(),
            user_id,
            payment_id: Some(payment_id),
            total_price: Money::zero(),
            status: OrderStatus::Placed,
            order_at: audit.created_at,
            payment_at: None,
            completed_at: None,
            audit,
        }
    }

    pub fn mark_paid(&mut self, at: DateTime<Utc>) {
        self.status = OrderStatus::Paid;
        self.payment_at = Some(at);
        self.audit.touch(self.user_id);
    }
}

/// Snapshot of a consumed cart line at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: OrderDetailId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub subtotal: Money,
    pub audit: Audit,
}

impl OrderDetail {
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        subtotal: Money,
        actor: UserId,
    ) -> Self {
        Self {
            id: OrderDetailId::new(),
            order_id,
            product_id,
            quantity,
            subtotal,
            audit: Audit::new(actor),
        }
    }
}

/// Payment for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub payment_method: String,
    pub total_price: Money,
    pub status: PaymentStatus,
    pub payment_at: Option<DateTime<Utc>>,
    pub audit: Audit,
}

impl Payment {
    /// An unpaid payment for `order_id`. The total is filled in at commit.
    pub fn unpaid(id: PaymentId, order_id: OrderId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            order_id,
            payment_method: String::new(),
            total_price: Money::zero(),
            status: PaymentStatus::Unpaid,
            payment_at: None,
            audit: Audit::new(user_id),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    pub fn pay(&mut self, at: DateTime<Utc>) {
        self.status = PaymentStatus::Paid;
        self.payment_at = Some(at);
        self.audit.touch(self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_column_encoding_roundtrips() {
        for status in [OrderStatus::Placed, OrderStatus::Paid] {
            assert_eq!(OrderStatus::from_i16(status.as_i16()), Some(status));
        }
        for status in [PaymentStatus::Unpaid, PaymentStatus::Paid] {
            assert_eq!(PaymentStatus::from_i16(status.as_i16()), Some(status));
        }
        assert_eq!(OrderStatus::from_i16(7), None);
    }

    #[test]
    fn new_cart_is_empty() {
        let user = UserId::new();
        let cart = Cart::new(user);
        assert_eq!(cart.user_id, user);
        assert_eq!(cart.total_items, 0);
        assert!(cart.total_price.is_zero());
        assert_eq!(cart.audit.created_by, user);
        assert!(cart.audit.deleted_at.is_none());
    }

    #[test]
    fn placed_order_links_payment() {
        let user = UserId::new();
        let payment_id = PaymentId::new();
        let order = Order::placed(user, payment_id);
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.payment_id, Some(payment_id));
        assert_eq!(order.order_at, order.audit.created_at);
    }

    #[test]
    fn paying_sets_status_and_timestamp() {
        let user = UserId::new();
        let mut payment = Payment::unpaid(PaymentId::new(), OrderId::new(), user);
        assert!(!payment.is_paid());
        let at = now();
        payment.pay(at);
        assert!(payment.is_paid());
        assert_eq!(payment.payment_at, Some(at));
    }
}
