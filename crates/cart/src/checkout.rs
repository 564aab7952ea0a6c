//! Checkout Engine: turns whole cart lines into one order and one payment.

use std::collections::HashMap;
use std::sync::Arc;

use common::{CartItemId, Money, OrderId, PaymentId, UserId};
use store::{Cart, CartItem, Gateway, Order, OrderDetail, Payment};
use tokio::sync::Mutex;

use crate::compensation::{Compensation, CompensationLog};
use crate::request::{CheckoutLine, add_price};
use crate::view::in_store_order;
use crate::{CartError, Result, WorkerPool};

/// Outcome of a checkout that admitted at least one line.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub payment: Payment,
    /// Line-items left in the cart.
    pub items: Vec<CartItem>,
    /// Sum of the consumed line-items' subtotals.
    pub consumed: Money,
    /// Number of lines turned into order details.
    pub admitted: u32,
}

struct CheckoutState {
    items: HashMap<CartItemId, CartItem>,
    order_total: Money,
    consumed: Money,
    admitted: u32,
}

/// Why a checkout line was not turned into an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    UnknownItem,
    Mismatch,
    OutOfStock,
}

impl Rejection {
    fn as_str(self) -> &'static str {
        match self {
            Rejection::UnknownItem => "unknown_item",
            Rejection::Mismatch => "mismatch",
            Rejection::OutOfStock => "out_of_stock",
        }
    }
}

impl CheckoutState {
    /// Takes the line-item out of the index if the line asks for all of it.
    ///
    /// A claimed item cannot be claimed by another entry of the same batch.
    fn claim(&mut self, line: &CheckoutLine) -> std::result::Result<CartItem, Rejection> {
        let item = self
            .items
            .get(&line.item_id)
            .ok_or(Rejection::UnknownItem)?;
        if item.product_id != line.product_id || item.quantity != line.quantity {
            return Err(Rejection::Mismatch);
        }
        self.items.remove(&line.item_id).ok_or(Rejection::UnknownItem)
    }

    fn release(&mut self, item: CartItem) {
        self.items.insert(item.id, item);
    }
}

/// Runs checkout batches against a gateway.
pub struct CheckoutEngine<G> {
    store: Arc<G>,
    max_concurrency: usize,
}

impl<G: Gateway + 'static> CheckoutEngine<G> {
    pub fn new(store: Arc<G>, max_concurrency: usize) -> Self {
        Self {
            store,
            max_concurrency,
        }
    }

    /// Admits each line whose quantity equals the whole line-item and whose
    /// product still has that much stock, then persists the order and its
    /// unpaid payment.
    ///
    /// Fails with [`CartError::NothingToCheckout`] when no line is admitted;
    /// nothing is written in that case.
    #[tracing::instrument(skip_all, fields(cart_id = %cart.id, lines = lines.len()))]
    pub async fn checkout(
        &self,
        cart: &Cart,
        existing: Vec<CartItem>,
        lines: Vec<CheckoutLine>,
        log: &CompensationLog,
    ) -> Result<CheckoutOutcome> {
        if existing.is_empty() {
            return Err(CartError::NothingToCheckout);
        }

        let payment_id = PaymentId::new();
        let mut order = Order::placed(cart.user_id, payment_id);
        let shared = Arc::new(Mutex::new(CheckoutState {
            items: existing.into_iter().map(|item| (item.id, item)).collect(),
            order_total: Money::zero(),
            consumed: Money::zero(),
            admitted: 0,
        }));
        let mut pool = WorkerPool::new(self.max_concurrency);

        for line in lines {
            pool.spawn(checkout_line(
                self.store.clone(),
                shared.clone(),
                log.clone(),
                order.id,
                cart.user_id,
                line,
            ))
            .await?;
        }
        pool.join().await?;

        let (items, consumed, admitted) = {
            let state = shared.lock().await;
            order.total_price = state.order_total;
            (
                in_store_order(state.items.values().cloned().collect()),
                state.consumed,
                state.admitted,
            )
        };
        if admitted == 0 {
            return Err(CartError::NothingToCheckout);
        }

        let mut payment = Payment::unpaid(payment_id, order.id, cart.user_id);
        payment.total_price = order.total_price;

        self.store.create_order(&order).await?;
        log.record(Compensation::DeleteOrder(order.id)).await;
        self.store.create_payment(&payment).await?;
        log.record(Compensation::DeletePayment(payment.id)).await;

        tracing::info!(
            order_id = %order.id,
            admitted,
            total = %order.total_price,
            "order placed"
        );

        Ok(CheckoutOutcome {
            order,
            payment,
            items,
            consumed,
            admitted,
        })
    }
}

fn rejected(line: &CheckoutLine, reason: Rejection) -> Result<()> {
    metrics::counter!("cart_checkout_lines_total", "outcome" => reason.as_str()).increment(1);
    tracing::info!(item_id = %line.item_id, reason = reason.as_str(), "checkout line skipped");
    Ok(())
}

async fn checkout_line<G: Gateway + 'static>(
    store: Arc<G>,
    shared: Arc<Mutex<CheckoutState>>,
    log: CompensationLog,
    order_id: OrderId,
    actor: UserId,
    line: CheckoutLine,
) -> Result<()> {
    let claimed = shared.lock().await.claim(&line);
    let item = match claimed {
        Ok(item) => item,
        Err(reason) => return rejected(&line, reason),
    };

    let product = match store.get_product(line.product_id).await {
        Ok(Some(product)) => product,
        Ok(None) => {
            shared.lock().await.release(item);
            return Err(CartError::ProductNotFound(line.product_id));
        }
        Err(e) => {
            shared.lock().await.release(item);
            return Err(e.into());
        }
    };

    // Cheap pre-check; the conditional decrement below is what actually decides
    let granted = product.stock >= item.quantity
        && store.decrement_stock(product.id, item.quantity).await?;
    if !granted {
        shared.lock().await.release(item);
        return rejected(&line, Rejection::OutOfStock);
    }
    log.record(Compensation::RestockProduct {
        product_id: product.id,
        quantity: item.quantity,
    })
    .await;

    store.delete_item(item.id).await?;
    log.record(Compensation::RecreateItem(item.clone())).await;

    let detail = OrderDetail::new(order_id, product.id, line.quantity, line.price, actor);
    store.create_order_detail(&detail).await?;
    log.record(Compensation::DeleteOrderDetail(detail.id)).await;

    let mut state = shared.lock().await;
    state.order_total = add_price(state.order_total, line.price)?;
    state.consumed = add_price(state.consumed, item.subtotal)?;
    state.admitted += 1;
    drop(state);

    metrics::counter!("cart_checkout_lines_total", "outcome" => "admitted").increment(1);
    tracing::debug!(item_id = %item.id, detail_id = %detail.id, "checkout line admitted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::ProductId;
    use store::{CartStore, FailurePoint, InMemoryStore, OrderStore, Product, ProductCatalog};

    use super::*;

    struct Fixture {
        store: Arc<InMemoryStore>,
        cart: Cart,
        item: CartItem,
        product: Product,
    }

    async fn fixture(quantity: u32, stock: u32) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let cart = Cart::new(UserId::new());
        store.create_cart(&cart).await.unwrap();
        let product = Product::new("Widget", Money::from_cents(1000), stock);
        store.insert_product(product.clone()).await;
        let item = CartItem::new(
            cart.id,
            product.id,
            quantity,
            Money::from_cents(1000 * i64::from(quantity)),
            cart.user_id,
        );
        store.create_item(&item).await.unwrap();
        Fixture {
            store,
            cart,
            item,
            product,
        }
    }

    fn whole(item: &CartItem) -> CheckoutLine {
        CheckoutLine {
            item_id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.subtotal,
        }
    }

    #[tokio::test]
    async fn admitted_line_places_order() {
        let f = fixture(3, 5).await;
        let engine = CheckoutEngine::new(f.store.clone(), 4);

        let out = engine
            .checkout(
                &f.cart,
                vec![f.item.clone()],
                vec![whole(&f.item)],
                &CompensationLog::new(),
            )
            .await
            .unwrap();

        assert_eq!(out.admitted, 1);
        assert_eq!(out.order.total_price, Money::from_cents(3000));
        assert_eq!(out.payment.total_price, Money::from_cents(3000));
        assert_eq!(out.consumed, Money::from_cents(3000));
        assert!(out.items.is_empty());

        let product = f.store.get_product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 2);
        assert_eq!(
            f.store.get_order_details(out.order.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn partial_quantity_is_not_admitted() {
        let f = fixture(3, 5).await;
        let engine = CheckoutEngine::new(f.store.clone(), 4);
        let mut line = whole(&f.item);
        line.quantity = 2;

        let result = engine
            .checkout(&f.cart, vec![f.item.clone()], vec![line], &CompensationLog::new())
            .await;

        assert!(matches!(result, Err(CartError::NothingToCheckout)));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn product_mismatch_is_not_admitted() {
        let f = fixture(1, 5).await;
        let engine = CheckoutEngine::new(f.store.clone(), 4);
        let mut line = whole(&f.item);
        line.product_id = ProductId::new();

        let result = engine
            .checkout(&f.cart, vec![f.item.clone()], vec![line], &CompensationLog::new())
            .await;

        assert!(matches!(result, Err(CartError::NothingToCheckout)));
    }

    #[tokio::test]
    async fn same_item_is_consumed_once() {
        let f = fixture(1, 5).await;
        let engine = CheckoutEngine::new(f.store.clone(), 4);

        let out = engine
            .checkout(
                &f.cart,
                vec![f.item.clone()],
                vec![whole(&f.item), whole(&f.item)],
                &CompensationLog::new(),
            )
            .await
            .unwrap();

        assert_eq!(out.admitted, 1);
        let product = f.store.get_product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 4);
    }

    #[tokio::test]
    async fn missing_product_fails_the_batch() {
        let f = fixture(1, 5).await;
        let engine = CheckoutEngine::new(f.store.clone(), 4);
        let stray = CartItem::new(
            f.cart.id,
            ProductId::new(),
            1,
            Money::from_cents(10),
            f.cart.user_id,
        );

        let result = engine
            .checkout(
                &f.cart,
                vec![stray.clone()],
                vec![whole(&stray)],
                &CompensationLog::new(),
            )
            .await;

        assert!(matches!(result, Err(CartError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn failed_detail_write_is_undone_by_the_log() {
        let f = fixture(2, 5).await;
        f.store
            .fail_on(FailurePoint::CreateOrderDetail(f.product.id))
            .await;
        let engine = CheckoutEngine::new(f.store.clone(), 4);
        let log = CompensationLog::new();

        let result = engine
            .checkout(&f.cart, vec![f.item.clone()], vec![whole(&f.item)], &log)
            .await;
        assert!(result.is_err());

        assert_eq!(log.unwind(f.store.as_ref()).await, 0);
        let product = f.store.get_product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 5);
        assert_eq!(
            f.store.get_items_by_cart(f.cart.id).await.unwrap(),
            vec![f.item.clone()]
        );
    }
}
