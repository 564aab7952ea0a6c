//! Caller identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated caller's id.
pub const USER_HEADER: &str = "x-user-id";

/// The user a request acts for, taken from [`USER_HEADER`].
///
/// Token validation happens upstream; this only parses the id it forwards.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("Invalid {USER_HEADER} header")))?;

        UserId::parse_str(raw)
            .map(CurrentUser)
            .map_err(|e| ApiError::BadRequest(format!("Invalid {USER_HEADER}: {e}")))
    }
}
