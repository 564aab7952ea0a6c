//! Cart reconciliation and checkout engine.
//!
//! Each batch operation loads the user's cart, fans out one worker per
//! requested line, joins them all, then commits the cart aggregate once.
//! Every successful per-line write records its inverse so a failed batch
//! can be unwound.

pub mod checkout;
pub mod compensation;
pub mod config;
pub mod error;
pub mod lock;
pub mod payment;
pub mod pool;
pub mod reconciler;
pub mod remover;
pub mod request;
pub mod service;
pub mod view;
pub mod view_cache;

pub use checkout::{CheckoutEngine, CheckoutOutcome};
pub use compensation::{Compensation, CompensationLog};
pub use config::EngineConfig;
pub use error::{CartError, ErrorKind, Result};
pub use lock::UserLocks;
pub use pool::WorkerPool;
pub use reconciler::{ItemReconciler, Reconciled};
pub use remover::{ItemRemover, Removed};
pub use request::{AddLine, CheckoutLine, RemoveLine};
pub use service::CartService;
pub use view::{CartView, CheckoutReceipt, PaymentReceipt};
pub use view_cache::CartViewCache;
