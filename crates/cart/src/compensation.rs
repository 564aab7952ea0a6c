//! Inverse writes recorded while a batch runs.

use std::sync::Arc;

use common::{CartItemId, OrderDetailId, OrderId, PaymentId, ProductId};
use store::{CartItem, Gateway, Payment};
use tokio::sync::Mutex;

/// The inverse of one write that already reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Undo a created item.
    DeleteItem(CartItemId),
    /// Undo an update by writing back the previous row.
    RestoreItem(CartItem),
    /// Undo a deletion.
    RecreateItem(CartItem),
    RestockProduct {
        product_id: ProductId,
        quantity: u32,
    },
    DeleteOrderDetail(OrderDetailId),
    DeleteOrder(OrderId),
    DeletePayment(PaymentId),
    /// Undo a payment settlement.
    RestorePayment(Payment),
}

impl Compensation {
    pub fn name(&self) -> &'static str {
        match self {
            Compensation::DeleteItem(_) => "delete_item",
            Compensation::RestoreItem(_) => "restore_item",
            Compensation::RecreateItem(_) => "recreate_item",
            Compensation::RestockProduct { .. } => "restock_product",
            Compensation::DeleteOrderDetail(_) => "delete_order_detail",
            Compensation::DeleteOrder(_) => "delete_order",
            Compensation::DeletePayment(_) => "delete_payment",
            Compensation::RestorePayment(_) => "restore_payment",
        }
    }

    async fn apply<G: Gateway + ?Sized>(&self, store: &G) -> store::Result<()> {
        match self {
            Compensation::DeleteItem(id) => store.delete_item(*id).await,
            Compensation::RestoreItem(item) => store.update_item(item).await,
            Compensation::RecreateItem(item) => store.create_item(item).await,
            Compensation::RestockProduct {
                product_id,
                quantity,
            } => store.increment_stock(*product_id, *quantity).await,
            Compensation::DeleteOrderDetail(id) => store.delete_order_detail(*id).await,
            Compensation::DeleteOrder(id) => store.delete_order(*id).await,
            Compensation::DeletePayment(id) => store.delete_payment(*id).await,
            Compensation::RestorePayment(payment) => store.update_payment(payment).await,
        }
    }
}

/// Append-only log of compensations shared by the workers of one batch.
///
/// Cloning is cheap; every clone appends to the same log.
#[derive(Debug, Clone, Default)]
pub struct CompensationLog {
    steps: Arc<Mutex<Vec<Compensation>>>,
}

impl CompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, step: Compensation) {
        self.steps.lock().await.push(step);
    }

    pub async fn len(&self) -> usize {
        self.steps.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.steps.lock().await.is_empty()
    }

    /// Applies every recorded compensation, newest first, and empties the log.
    ///
    /// A compensation that fails is logged and skipped; the rest still run.
    /// Returns the number of failed compensations.
    pub async fn unwind<G: Gateway + ?Sized>(&self, store: &G) -> usize {
        let steps = std::mem::take(&mut *self.steps.lock().await);
        if steps.is_empty() {
            return 0;
        }

        tracing::warn!(steps = steps.len(), "unwinding partial batch");
        let mut failed = 0;
        for step in steps.iter().rev() {
            match step.apply(store).await {
                Ok(()) => {
                    metrics::counter!("cart_compensations_total", "outcome" => "applied")
                        .increment(1);
                }
                Err(e) => {
                    failed += 1;
                    metrics::counter!("cart_compensations_total", "outcome" => "failed")
                        .increment(1);
                    tracing::error!(step = step.name(), error = %e, "compensation failed");
                }
            }
        }
        failed
    }
}
