//! HTTP API server for the cart service.
//!
//! Exposes cart, checkout and payment endpoints over the cart engine, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use cache::CacheClient;
use cart::{CartService, EngineConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Gateway;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<G, C> {
    pub carts: CartService<G, C>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<G, C>(state: Arc<AppState<G, C>>, metrics_handle: PrometheusHandle) -> Router
where
    G: Gateway + 'static,
    C: CacheClient + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/carts", post(routes::cart::create::<G, C>))
        .route("/cart", get(routes::cart::list::<G, C>))
        .route(
            "/cart/items",
            post(routes::cart::add::<G, C>).delete(routes::cart::remove::<G, C>),
        )
        .route("/cart/checkout", post(routes::cart::checkout::<G, C>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<G, C>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires a cart service over the given store and cache.
pub fn create_state<G, C>(store: G, cache: C, config: EngineConfig) -> Arc<AppState<G, C>>
where
    G: Gateway + 'static,
    C: CacheClient + 'static,
{
    Arc::new(AppState {
        carts: CartService::new(store, cache, config),
    })
}
