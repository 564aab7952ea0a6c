//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use cache::CacheClient;
use cart::{AddLine, CartView, CheckoutLine, CheckoutReceipt, RemoveLine};
use chrono::{DateTime, Utc};
use common::{CartItemId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};
use store::Gateway;

use super::parse_id;
use super::user::CurrentUser;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCartRequest {
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub price_cents: i64,
}

#[derive(Deserialize)]
pub struct RemoveItemRequest {
    pub item_id: String,
    pub quantity: u32,
    pub price_cents: i64,
}

#[derive(Deserialize)]
pub struct CheckoutItemRequest {
    pub item_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub price_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub cart_id: String,
    pub user_id: String,
    pub total_price_cents: i64,
    pub total_items: u32,
    pub items: Vec<CartItemResponse>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub subtotal_cents: i64,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub payment_id: String,
    pub order_at: DateTime<Utc>,
    pub total_items: u32,
    pub total_price_cents: i64,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            cart_id: view.cart.id.to_string(),
            user_id: view.cart.user_id.to_string(),
            total_price_cents: view.cart.total_price.cents(),
            total_items: view.cart.total_items,
            items: view
                .items
                .into_iter()
                .map(|item| CartItemResponse {
                    id: item.id.to_string(),
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                    subtotal_cents: item.subtotal.cents(),
                })
                .collect(),
        }
    }
}

impl From<CheckoutReceipt> for CheckoutResponse {
    fn from(receipt: CheckoutReceipt) -> Self {
        Self {
            order_id: receipt.order_id.to_string(),
            payment_id: receipt.payment_id.to_string(),
            order_at: receipt.order_at,
            total_items: receipt.total_items,
            total_price_cents: receipt.total_price.cents(),
        }
    }
}

// -- Handlers --

/// POST /carts
///
/// Create the empty cart for a newly registered user.
#[tracing::instrument(skip(state, req))]
pub async fn create<G: Gateway + 'static, C: CacheClient + 'static>(
    State(state): State<Arc<AppState<G, C>>>,
    Json(req): Json<CreateCartRequest>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let user_id = parse_id("user_id", &req.user_id, UserId::parse_str)?;
    let cart = state.carts.create_cart(user_id).await?;
    let view = CartView::new(cart, Vec::new());
    Ok((StatusCode::CREATED, Json(view.into())))
}

/// GET /cart
///
/// The caller's cart and its line-items.
#[tracing::instrument(skip(state))]
pub async fn list<G: Gateway + 'static, C: CacheClient + 'static>(
    State(state): State<Arc<AppState<G, C>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.carts.list_items(user_id).await?;
    Ok(Json(view.into()))
}

/// POST /cart/items
///
/// Add products to the caller's cart.
#[tracing::instrument(skip(state, req))]
pub async fn add<G: Gateway + 'static, C: CacheClient + 'static>(
    State(state): State<Arc<AppState<G, C>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<Vec<AddItemRequest>>,
) -> Result<Json<CartResponse>, ApiError> {
    let lines = req
        .into_iter()
        .map(|item| {
            Ok(AddLine {
                product_id: parse_id("product_id", &item.product_id, ProductId::parse_str)?,
                quantity: item.quantity,
                price: Money::from_cents(item.price_cents),
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let view = state.carts.add_items(user_id, lines).await?;
    Ok(Json(view.into()))
}

/// DELETE /cart/items
///
/// Take quantities out of line-items.
#[tracing::instrument(skip(state, req))]
pub async fn remove<G: Gateway + 'static, C: CacheClient + 'static>(
    State(state): State<Arc<AppState<G, C>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<Vec<RemoveItemRequest>>,
) -> Result<Json<CartResponse>, ApiError> {
    let lines = req
        .into_iter()
        .map(|item| {
            Ok(RemoveLine {
                item_id: parse_id("item_id", &item.item_id, CartItemId::parse_str)?,
                quantity: item.quantity,
                price: Money::from_cents(item.price_cents),
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let view = state.carts.delete_items(user_id, lines).await?;
    Ok(Json(view.into()))
}

/// POST /cart/checkout
///
/// Turn whole line-items into an order.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<G: Gateway + 'static, C: CacheClient + 'static>(
    State(state): State<Arc<AppState<G, C>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<Vec<CheckoutItemRequest>>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let lines = req
        .into_iter()
        .map(|item| {
            Ok(CheckoutLine {
                item_id: parse_id("item_id", &item.item_id, CartItemId::parse_str)?,
                product_id: parse_id("product_id", &item.product_id, ProductId::parse_str)?,
                quantity: item.quantity,
                price: Money::from_cents(item.price_cents),
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let receipt = state.carts.checkout(user_id, lines).await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}
