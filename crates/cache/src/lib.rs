//! Cache client contract used by the cart engine.
//!
//! A miss is `Ok(None)`, never an error. Anything else the backend reports
//! is a [`CacheError`] and fails the calling operation.

pub mod client;
pub mod error;
pub mod keys;
pub mod memory;

pub use client::CacheClient;
pub use error::{CacheError, Result};
pub use keys::CacheKey;
pub use memory::InMemoryCache;
