//! Cart engine error types.

use cache::CacheError;
use common::{OrderId, ProductId, UserId};
use store::StoreError;
use thiserror::Error;

/// Coarse classification callers map onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Internal,
}

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart not found for user {0}")]
    CartNotFound(UserId),

    #[error("User {0} already has a cart")]
    CartExists(UserId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("No payment found for order {0}")]
    PaymentNotFound(OrderId),

    /// The order belongs to someone else.
    #[error("Order {0} is not owned by the caller")]
    NotOrderOwner(OrderId),

    #[error("Order {0} is already paid")]
    AlreadyPaid(OrderId),

    /// Checkout admitted no line, so no order was placed.
    #[error("Nothing to checkout")]
    NothingToCheckout,

    /// The request batch is malformed.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A worker task panicked or could not be scheduled.
    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::CartNotFound(_)
            | CartError::ProductNotFound(_)
            | CartError::OrderNotFound(_)
            | CartError::PaymentNotFound(_) => ErrorKind::NotFound,
            CartError::CartExists(_)
            | CartError::NotOrderOwner(_)
            | CartError::AlreadyPaid(_)
            | CartError::NothingToCheckout => ErrorKind::Conflict,
            CartError::Validation(_) => ErrorKind::Validation,
            CartError::Store(err) => match err {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::Duplicate { .. } | StoreError::ConcurrencyConflict { .. } => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::Internal,
            },
            CartError::Worker(_) | CartError::Cache(_) | CartError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Convenience type alias for cart results.
pub type Result<T> = std::result::Result<T, CartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_meaning() {
        let conflict = CartError::from(StoreError::ConcurrencyConflict {
            cart_id: common::CartId::new(),
            expected: 1,
            actual: 2,
        });
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let missing = CartError::from(StoreError::NotFound {
            entity: "cart item",
            id: "x".into(),
        });
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let down = CartError::from(StoreError::Unavailable("down".into()));
        assert_eq!(down.kind(), ErrorKind::Internal);
    }

    #[test]
    fn engine_errors_classify() {
        assert_eq!(CartError::NothingToCheckout.kind(), ErrorKind::Conflict);
        assert_eq!(
            CartError::Validation("empty".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CartError::CartNotFound(UserId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CartError::Cache(CacheError::Unavailable("down".into())).kind(),
            ErrorKind::Internal
        );
    }
}
