//! Persistence gateway for carts, orders, payments and product stock.
//!
//! The gateway issues independent statements; it never wraps a batch in a
//! multi-statement transaction. Callers that need all-or-nothing semantics
//! record inverse operations and undo them themselves.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{FailurePoint, InMemoryStore};
pub use model::{
    Audit, Cart, CartItem, Order, OrderDetail, OrderStatus, Payment, PaymentStatus, Product,
};
pub use postgres::PostgresStore;
pub use store::{CartStore, Gateway, OrderStore, ProductCatalog};
