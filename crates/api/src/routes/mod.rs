use std::fmt::Display;

use crate::error::ApiError;

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod user;

/// Parses one identifier field of a request, naming the field on failure.
pub(crate) fn parse_id<T, E: Display>(
    field: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, ApiError> {
    parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
