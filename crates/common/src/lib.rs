//! Shared types for the cart and checkout service.

pub mod ids;
pub mod money;

pub use ids::{CartId, CartItemId, OrderDetailId, OrderId, PaymentId, ProductId, UserId};
pub use money::Money;
