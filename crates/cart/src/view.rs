//! What the engine hands back to callers.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};
use store::{Cart, CartItem};

/// The materialized cart a user sees: the aggregate plus its line-items.
///
/// This is also what the read-through cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItem>,
}

impl CartView {
    pub fn new(cart: Cart, items: Vec<CartItem>) -> Self {
        Self { cart, items }
    }

    /// Sum of the line-item subtotals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|item| item.subtotal).sum()
    }

    /// True when the aggregate agrees with its line-items.
    pub fn is_consistent(&self) -> bool {
        self.cart.total_price == self.items_total()
            && self.cart.total_items as usize == self.items.len()
    }
}

/// Orders line-items the way the store lists them: oldest first, ties by id.
pub(crate) fn in_store_order(mut items: Vec<CartItem>) -> Vec<CartItem> {
    items.sort_by(|a, b| {
        a.audit
            .created_at
            .cmp(&b.audit.created_at)
            .then(a.id.cmp(&b.id))
    });
    items
}

/// Result of a checkout that placed an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub order_at: DateTime<Utc>,
    /// Number of cart lines turned into order lines.
    pub total_items: u32,
    pub total_price: Money,
}

/// Result of settling an order's payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub total_price: Money,
    pub payment_at: DateTime<Utc>,
}
