use common::CartId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A row with the same unique key already exists.
    #[error("Duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// The cart was modified by someone else since it was loaded.
    #[error("Concurrency conflict for cart {cart_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        cart_id: CartId,
        expected: i64,
        actual: i64,
    },

    /// A stored value is outside the range the model accepts.
    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: i64 },

    /// The backend refused the statement.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn duplicate(entity: &'static str, id: impl ToString) -> Self {
        Self::Duplicate {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
