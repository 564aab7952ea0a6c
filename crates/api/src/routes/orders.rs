//! Order payment endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use cache::CacheClient;
use cart::PaymentReceipt;
use chrono::{DateTime, Utc};
use common::OrderId;
use serde::Serialize;
use store::Gateway;

use super::parse_id;
use super::user::CurrentUser;
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct PaymentResponse {
    pub order_id: String,
    pub payment_id: String,
    pub status: &'static str,
    pub total_price_cents: i64,
    pub payment_at: DateTime<Utc>,
}

impl From<PaymentReceipt> for PaymentResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            order_id: receipt.order_id.to_string(),
            payment_id: receipt.payment_id.to_string(),
            status: "Paid",
            total_price_cents: receipt.total_price.cents(),
            payment_at: receipt.payment_at,
        }
    }
}

/// POST /orders/{id}/pay
///
/// Settle the payment of one of the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn pay<G: Gateway + 'static, C: CacheClient + 'static>(
    State(state): State<Arc<AppState<G, C>>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let order_id = parse_id("order id", &id, OrderId::parse_str)?;
    let receipt = state.carts.pay(user_id, order_id).await?;
    Ok(Json(receipt.into()))
}
