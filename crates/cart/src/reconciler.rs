//! Item Reconciler: merges a batch of adds into the existing line-items.

use std::collections::HashMap;
use std::sync::Arc;

use common::{CartId, CartItemId, Money, ProductId, UserId};
use store::{Cart, CartItem, Gateway};
use tokio::sync::Mutex;

use crate::compensation::{Compensation, CompensationLog};
use crate::request::{AddLine, add_price, checked_quantity};
use crate::view::in_store_order;
use crate::{Result, WorkerPool};

/// Outcome of a successful add batch.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Every line-item of the cart after the batch, untouched ones included.
    pub items: Vec<CartItem>,
    /// Sum of the requested prices that were applied.
    pub added: Money,
}

struct AddState {
    items: HashMap<CartItemId, CartItem>,
    by_product: HashMap<ProductId, CartItemId>,
    added: Money,
}

enum ItemWrite {
    Create(CartItem),
    Update { previous: CartItem, next: CartItem },
}

impl AddState {
    fn new(existing: Vec<CartItem>) -> Self {
        let mut items = HashMap::with_capacity(existing.len());
        let mut by_product = HashMap::with_capacity(existing.len());
        for item in existing {
            by_product.entry(item.product_id).or_insert(item.id);
            items.insert(item.id, item);
        }
        Self {
            items,
            by_product,
            added: Money::zero(),
        }
    }

    /// Decides and applies create-or-increment for one line.
    fn plan(&mut self, cart_id: CartId, actor: UserId, line: &AddLine) -> Result<ItemWrite> {
        let existing = self
            .by_product
            .get(&line.product_id)
            .and_then(|id| self.items.get_mut(id));

        match existing {
            Some(item) => {
                let quantity = checked_quantity(item.quantity, line.quantity)?;
                let subtotal = add_price(item.subtotal, line.price)?;
                let previous = item.clone();
                item.quantity = quantity;
                item.subtotal = subtotal;
                item.audit.touch(actor);
                Ok(ItemWrite::Update {
                    previous,
                    next: item.clone(),
                })
            }
            None => {
                let item =
                    CartItem::new(cart_id, line.product_id, line.quantity, line.price, actor);
                self.by_product.insert(item.product_id, item.id);
                self.items.insert(item.id, item.clone());
                Ok(ItemWrite::Create(item))
            }
        }
    }
}

/// Runs add batches against a gateway.
pub struct ItemReconciler<G> {
    store: Arc<G>,
    max_concurrency: usize,
}

impl<G: Gateway + 'static> ItemReconciler<G> {
    pub fn new(store: Arc<G>, max_concurrency: usize) -> Self {
        Self {
            store,
            max_concurrency,
        }
    }

    /// Applies `lines` to `cart`, one worker per line.
    ///
    /// A product already in the cart has its quantity and subtotal
    /// incremented; any other product gets a new line-item. Each write that
    /// succeeds is recorded in `log`.
    #[tracing::instrument(skip_all, fields(cart_id = %cart.id, lines = lines.len()))]
    pub async fn reconcile(
        &self,
        cart: &Cart,
        existing: Vec<CartItem>,
        lines: Vec<AddLine>,
        log: &CompensationLog,
    ) -> Result<Reconciled> {
        let shared = Arc::new(Mutex::new(AddState::new(existing)));
        let mut pool = WorkerPool::new(self.max_concurrency);

        for line in lines {
            pool.spawn(add_line(
                self.store.clone(),
                shared.clone(),
                log.clone(),
                cart.id,
                cart.user_id,
                line,
            ))
            .await?;
        }
        pool.join().await?;

        let state = shared.lock().await;
        Ok(Reconciled {
            items: in_store_order(state.items.values().cloned().collect()),
            added: state.added,
        })
    }
}

async fn add_line<G: Gateway + 'static>(
    store: Arc<G>,
    shared: Arc<Mutex<AddState>>,
    log: CompensationLog,
    cart_id: CartId,
    actor: UserId,
    line: AddLine,
) -> Result<()> {
    let write = shared.lock().await.plan(cart_id, actor, &line)?;

    match write {
        ItemWrite::Create(item) => {
            store.create_item(&item).await?;
            log.record(Compensation::DeleteItem(item.id)).await;
            tracing::debug!(item_id = %item.id, product_id = %item.product_id, "line-item created");
        }
        ItemWrite::Update { previous, next } => {
            store.update_item(&next).await?;
            tracing::debug!(item_id = %next.id, quantity = next.quantity, "line-item incremented");
            log.record(Compensation::RestoreItem(previous)).await;
        }
    }

    let mut state = shared.lock().await;
    state.added = add_price(state.added, line.price)?;
    Ok(())
}
