//! Payment settlement for placed orders.

use common::{OrderId, UserId};
use store::{Gateway, model::now};

use crate::compensation::{Compensation, CompensationLog};
use crate::{CartError, PaymentReceipt, Result};

/// Marks the payment of `order_id` paid and the order `Paid`.
///
/// The payment is written first; if the order update then fails, the
/// recorded compensation puts the payment back to unpaid.
pub async fn settle<G: Gateway + ?Sized>(
    store: &G,
    user_id: UserId,
    order_id: OrderId,
    log: &CompensationLog,
) -> Result<PaymentReceipt> {
    let mut order = store
        .get_order(order_id)
        .await?
        .ok_or(CartError::OrderNotFound(order_id))?;
    if order.user_id != user_id {
        return Err(CartError::NotOrderOwner(order_id));
    }

    let mut payment = store
        .get_payment_by_order(order_id)
        .await?
        .ok_or(CartError::PaymentNotFound(order_id))?;
    if payment.is_paid() {
        return Err(CartError::AlreadyPaid(order_id));
    }

    let paid_at = now();
    let previous = payment.clone();
    payment.pay(paid_at);
    store.update_payment(&payment).await?;
    log.record(Compensation::RestorePayment(previous)).await;

    order.mark_paid(paid_at);
    store.update_order(&order).await?;

    Ok(PaymentReceipt {
        order_id,
        payment_id: payment.id,
        total_price: payment.total_price,
        payment_at: paid_at,
    })
}

#[cfg(test)]
mod tests {
    use common::{Money, PaymentId};
    use store::{InMemoryStore, Order, OrderStatus, OrderStore, Payment};

    use super::*;

    async fn placed(store: &InMemoryStore, user: UserId) -> Order {
        let payment_id = PaymentId::new();
        let mut order = Order::placed(user, payment_id);
        order.total_price = Money::from_cents(1200);
        store.create_order(&order).await.unwrap();
        let mut payment = Payment::unpaid(payment_id, order.id, user);
        payment.total_price = order.total_price;
        store.create_payment(&payment).await.unwrap();
        order
    }

    #[tokio::test]
    async fn settles_payment_and_order() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let order = placed(&store, user).await;

        let receipt = settle(&store, user, order.id, &CompensationLog::new())
            .await
            .unwrap();
        assert_eq!(receipt.total_price, Money::from_cents(1200));

        let order = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payment_at, Some(receipt.payment_at));
        let payment = store.get_payment_by_order(order.id).await.unwrap().unwrap();
        assert!(payment.is_paid());
    }

    #[tokio::test]
    async fn paying_twice_conflicts() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let order = placed(&store, user).await;
        let log = CompensationLog::new();

        settle(&store, user, order.id, &log).await.unwrap();
        let again = settle(&store, user, order.id, &log).await;
        assert!(matches!(again, Err(CartError::AlreadyPaid(_))));
    }

    #[tokio::test]
    async fn other_users_cannot_pay() {
        let store = InMemoryStore::new();
        let order = placed(&store, UserId::new()).await;

        let result = settle(&store, UserId::new(), order.id, &CompensationLog::new()).await;
        assert!(matches!(result, Err(CartError::NotOrderOwner(_))));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let store = InMemoryStore::new();
        let result = settle(
            &store,
            UserId::new(),
            OrderId::new(),
            &CompensationLog::new(),
        )
        .await;
        assert!(matches!(result, Err(CartError::OrderNotFound(_))));
    }
}
