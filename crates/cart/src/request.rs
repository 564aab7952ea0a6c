//! Batch request lines and their validation.

use std::collections::HashMap;
use std::hash::Hash;

use common::{CartItemId, Money, ProductId};

use crate::{CartError, Result};

/// Add `quantity` units of a product worth `price` in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// Take `quantity` units worth `price` out of an existing line-item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveLine {
    pub item_id: CartItemId,
    pub quantity: u32,
    pub price: Money,
}

/// Convert a whole line-item into an order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// Fields shared by every kind of request line.
pub trait Line {
    fn quantity(&self) -> u32;
    fn price(&self) -> Money;
}

macro_rules! impl_line {
    ($($ty:ty),*) => {
        $(impl Line for $ty {
            fn quantity(&self) -> u32 {
                self.quantity
            }

            fn price(&self) -> Money {
                self.price
            }
        })*
    };
}

impl_line!(AddLine, RemoveLine, CheckoutLine);

/// Rejects an empty batch, a zero quantity, a negative price, or prices
/// whose sum does not fit in `Money`.
pub fn validate<L: Line>(lines: &[L]) -> Result<()> {
    if lines.is_empty() {
        return Err(CartError::Validation("request contains no items".into()));
    }
    for (index, line) in lines.iter().enumerate() {
        if line.quantity() == 0 {
            return Err(CartError::Validation(format!(
                "item {index}: quantity must be positive"
            )));
        }
        if line.price().is_negative() {
            return Err(CartError::Validation(format!(
                "item {index}: price must not be negative"
            )));
        }
    }
    batch_total(lines)?;
    Ok(())
}

/// Sum of the requested prices of a batch.
pub fn batch_total<L: Line>(lines: &[L]) -> Result<Money> {
    lines
        .iter()
        .try_fold(Money::zero(), |acc, line| add_price(acc, line.price()))
}

/// Merges adds for the same product, keeping first-seen order.
pub fn coalesce_adds(lines: Vec<AddLine>) -> Result<Vec<AddLine>> {
    coalesce(lines, |line| line.product_id, |acc, line| {
        acc.quantity = checked_quantity(acc.quantity, line.quantity)?;
        acc.price = add_price(acc.price, line.price)?;
        Ok(())
    })
}

/// Merges removals for the same item, keeping first-seen order.
pub fn coalesce_removals(lines: Vec<RemoveLine>) -> Result<Vec<RemoveLine>> {
    coalesce(lines, |line| line.item_id, |acc, line| {
        acc.quantity = checked_quantity(acc.quantity, line.quantity)?;
        acc.price = add_price(acc.price, line.price)?;
        Ok(())
    })
}

pub(crate) fn checked_quantity(current: u32, extra: u32) -> Result<u32> {
    current
        .checked_add(extra)
        .ok_or_else(|| CartError::Validation("quantity overflow".into()))
}

pub(crate) fn add_price(current: Money, extra: Money) -> Result<Money> {
    current
        .checked_add(extra)
        .ok_or_else(|| CartError::Validation("price overflow".into()))
}

pub(crate) fn sub_price(current: Money, taken: Money) -> Result<Money> {
    current
        .checked_sub(taken)
        .ok_or_else(|| CartError::Validation("price overflow".into()))
}

fn coalesce<L, K, F, M>(lines: Vec<L>, key: F, mut merge: M) -> Result<Vec<L>>
where
    K: Eq + Hash,
    F: Fn(&L) -> K,
    M: FnMut(&mut L, L) -> Result<()>,
{
    let mut positions: HashMap<K, usize> = HashMap::with_capacity(lines.len());
    let mut merged: Vec<L> = Vec::with_capacity(lines.len());
    for line in lines {
        let k = key(&line);
        match positions.get(&k).copied() {
            Some(at) => merge(&mut merged[at], line)?,
            None => {
                positions.insert(k, merged.len());
                merged.push(line);
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(product_id: ProductId, quantity: u32, cents: i64) -> AddLine {
        AddLine {
            product_id,
            quantity,
            price: Money::from_cents(cents),
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        let lines: Vec<AddLine> = Vec::new();
        assert!(matches!(validate(&lines), Err(CartError::Validation(_))));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let lines = vec![add(ProductId::new(), 0, 100)];
        assert!(matches!(validate(&lines), Err(CartError::Validation(_))));
    }

    #[test]
    fn negative_price_is_rejected() {
        let lines = vec![RemoveLine {
            item_id: CartItemId::new(),
            quantity: 1,
            price: Money::from_cents(-1),
        }];
        assert!(matches!(validate(&lines), Err(CartError::Validation(_))));
    }

    #[test]
    fn free_items_are_allowed() {
        assert!(validate(&[add(ProductId::new(), 1, 0)]).is_ok());
    }

    #[test]
    fn adds_for_one_product_are_summed() {
        let p1 = ProductId::new();
        let p2 = ProductId::new();
        let merged =
            coalesce_adds(vec![add(p1, 1, 100), add(p2, 2, 50), add(p1, 3, 300)]).unwrap();

        assert_eq!(merged, vec![add(p1, 4, 400), add(p2, 2, 50)]);
    }

    #[test]
    fn removals_for_one_item_are_summed() {
        let item_id = CartItemId::new();
        let line = |quantity, cents| RemoveLine {
            item_id,
            quantity,
            price: Money::from_cents(cents),
        };
        let merged = coalesce_removals(vec![line(1, 10), line(1, 10)]).unwrap();
        assert_eq!(merged, vec![line(2, 20)]);
    }

    #[test]
    fn batch_total_overflow_is_rejected() {
        let lines = vec![add(ProductId::new(), 1, i64::MAX), add(ProductId::new(), 1, 1)];
        assert!(matches!(validate(&lines), Err(CartError::Validation(_))));
    }

    #[test]
    fn batch_total_sums_prices() {
        let lines = vec![add(ProductId::new(), 1, 250), add(ProductId::new(), 3, 750)];
        assert_eq!(batch_total(&lines).unwrap(), Money::from_cents(1000));
    }

    #[test]
    fn quantity_overflow_is_a_validation_error() {
        let p = ProductId::new();
        let result = coalesce_adds(vec![add(p, u32::MAX, 1), add(p, 1, 1)]);
        assert!(matches!(result, Err(CartError::Validation(_))));
    }
}
