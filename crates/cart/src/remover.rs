//! Item Remover: applies a batch of removals to the existing line-items.

use std::collections::HashMap;
use std::sync::Arc;

use common::{CartItemId, Money, UserId};
use store::{Cart, CartItem, Gateway};
use tokio::sync::Mutex;

use crate::compensation::{Compensation, CompensationLog};
use crate::request::{RemoveLine, add_price, sub_price};
use crate::view::in_store_order;
use crate::{CartError, Result, WorkerPool};

/// Outcome of a successful removal batch.
#[derive(Debug, Clone)]
pub struct Removed {
    /// Line-items that survive the batch, untouched ones included.
    pub items: Vec<CartItem>,
    /// Amount to take off the cart total.
    pub removed: Money,
    /// Number of line-items deleted outright.
    pub deleted: u32,
}

struct RemoveState {
    items: HashMap<CartItemId, CartItem>,
    removed: Money,
    deleted: u32,
}

enum ItemWrite {
    Delete(CartItem),
    Decrement { previous: CartItem, next: CartItem },
}

impl RemoveState {
    /// Decides delete-or-decrement for one line. `None` means the item is not
    /// in the cart and the line is ignored.
    ///
    /// A partial removal may not take more than the item's subtotal.
    fn plan(&mut self, actor: UserId, line: &RemoveLine) -> Result<Option<ItemWrite>> {
        let Some(item) = self.items.get_mut(&line.item_id) else {
            return Ok(None);
        };
        if line.quantity >= item.quantity {
            return Ok(self.items.remove(&line.item_id).map(ItemWrite::Delete));
        }
        if line.price > item.subtotal {
            return Err(CartError::Validation(format!(
                "item {}: removed price {} exceeds subtotal {}",
                item.id, line.price, item.subtotal
            )));
        }

        let subtotal = sub_price(item.subtotal, line.price)?;
        let previous = item.clone();
        item.quantity -= line.quantity;
        item.subtotal = subtotal;
        item.audit.touch(actor);
        Ok(Some(ItemWrite::Decrement {
            previous,
            next: item.clone(),
        }))
    }
}

/// Runs removal batches against a gateway.
pub struct ItemRemover<G> {
    store: Arc<G>,
    max_concurrency: usize,
}

impl<G: Gateway + 'static> ItemRemover<G> {
    pub fn new(store: Arc<G>, max_concurrency: usize) -> Self {
        Self {
            store,
            max_concurrency,
        }
    }

    /// Applies `lines` to `cart`, one worker per line.
    ///
    /// Removing at least the item's quantity deletes the row; anything less
    /// decrements it. Lines naming an item the cart does not hold are
    /// skipped without error.
    #[tracing::instrument(skip_all, fields(cart_id = %cart.id, lines = lines.len()))]
    pub async fn remove(
        &self,
        cart: &Cart,
        existing: Vec<CartItem>,
        lines: Vec<RemoveLine>,
        log: &CompensationLog,
    ) -> Result<Removed> {
        let shared = Arc::new(Mutex::new(RemoveState {
            items: existing.into_iter().map(|item| (item.id, item)).collect(),
            removed: Money::zero(),
            deleted: 0,
        }));
        let mut pool = WorkerPool::new(self.max_concurrency);

        for line in lines {
            pool.spawn(remove_line(
                self.store.clone(),
                shared.clone(),
                log.clone(),
                cart.user_id,
                line,
            ))
            .await?;
        }
        pool.join().await?;

        let state = shared.lock().await;
        Ok(Removed {
            items: in_store_order(state.items.values().cloned().collect()),
            removed: state.removed,
            deleted: state.deleted,
        })
    }
}

async fn remove_line<G: Gateway + 'static>(
    store: Arc<G>,
    shared: Arc<Mutex<RemoveState>>,
    log: CompensationLog,
    actor: UserId,
    line: RemoveLine,
) -> Result<()> {
    let Some(write) = shared.lock().await.plan(actor, &line)? else {
        tracing::debug!(item_id = %line.item_id, "item not in cart, skipped");
        return Ok(());
    };

    match write {
        ItemWrite::Delete(item) => {
            store.delete_item(item.id).await?;
            tracing::debug!(item_id = %item.id, "line-item deleted");
            log.record(Compensation::RecreateItem(item.clone())).await;
            let mut state = shared.lock().await;
            state.removed = add_price(state.removed, item.subtotal)?;
            state.deleted += 1;
        }
        ItemWrite::Decrement { previous, next } => {
            store.update_item(&next).await?;
            tracing::debug!(item_id = %next.id, quantity = next.quantity, "line-item decremented");
            log.record(Compensation::RestoreItem(previous)).await;
            let mut state = shared.lock().await;
            state.removed = add_price(state.removed, line.price)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::ProductId;
    use store::{CartStore, FailurePoint, InMemoryStore};

    use super::*;

    async fn cart_with_item(quantity: u32, cents: i64) -> (Arc<InMemoryStore>, Cart, CartItem) {
        let store = Arc::new(InMemoryStore::new());
        let cart = Cart::new(UserId::new());
        store.create_cart(&cart).await.unwrap();
        let item = CartItem::new(
            cart.id,
            ProductId::new(),
            quantity,
            Money::from_cents(cents),
            cart.user_id,
        );
        store.create_item(&item).await.unwrap();
        (store, cart, item)
    }

    fn remove(item_id: CartItemId, quantity: u32, cents: i64) -> RemoveLine {
        RemoveLine {
            item_id,
            quantity,
            price: Money::from_cents(cents),
        }
    }

    #[tokio::test]
    async fn partial_removal_decrements() {
        let (store, cart, item) = cart_with_item(2, 2000).await;
        let remover = ItemRemover::new(store.clone(), 4);

        let out = remover
            .remove(
                &cart,
                vec![item.clone()],
                vec![remove(item.id, 1, 1000)],
                &CompensationLog::new(),
            )
            .await
            .unwrap();

        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].quantity, 1);
        assert_eq!(out.items[0].subtotal, Money::from_cents(1000));
        assert_eq!(out.removed, Money::from_cents(1000));
        assert_eq!(out.deleted, 0);
    }

    #[tokio::test]
    async fn removing_everything_deletes_the_row() {
        let (store, cart, item) = cart_with_item(2, 2000).await;
        let remover = ItemRemover::new(store.clone(), 4);

        let out = remover
            .remove(
                &cart,
                vec![item.clone()],
                vec![remove(item.id, 5, 1)],
                &CompensationLog::new(),
            )
            .await
            .unwrap();

        assert!(out.items.is_empty());
        // The whole subtotal goes, whatever price the request carried
        assert_eq!(out.removed, Money::from_cents(2000));
        assert_eq!(out.deleted, 1);
        assert!(store.get_items_by_cart(cart.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_removal_above_subtotal_is_rejected() {
        let (store, cart, item) = cart_with_item(2, 2000).await;
        let remover = ItemRemover::new(store.clone(), 4);
        let log = CompensationLog::new();

        let result = remover
            .remove(&cart, vec![item.clone()], vec![remove(item.id, 1, 5000)], &log)
            .await;

        assert!(matches!(result, Err(CartError::Validation(_))));
        assert!(log.is_empty().await);
        assert_eq!(store.get_items_by_cart(cart.id).await.unwrap(), vec![item]);
    }

    #[tokio::test]
    async fn unknown_items_are_skipped() {
        let (store, cart, item) = cart_with_item(2, 2000).await;
        let remover = ItemRemover::new(store.clone(), 4);
        let log = CompensationLog::new();

        let out = remover
            .remove(
                &cart,
                vec![item.clone()],
                vec![remove(CartItemId::new(), 1, 1000)],
                &log,
            )
            .await
            .unwrap();

        assert_eq!(out.items, vec![item]);
        assert!(out.removed.is_zero());
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn failed_delete_is_reported() {
        let (store, cart, item) = cart_with_item(1, 500).await;
        store.fail_on(FailurePoint::DeleteItem(item.id)).await;
        let remover = ItemRemover::new(store.clone(), 4);

        let result = remover
            .remove(
                &cart,
                vec![item.clone()],
                vec![remove(item.id, 1, 500)],
                &CompensationLog::new(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.get_items_by_cart(cart.id).await.unwrap(), vec![item]);
    }
}
