pub mod health;
pub mod imports;
pub mod jobs;
pub mod products;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /imports                 upload CSV and submit import (POST)
///
/// /products                browse (GET), bulk delete (DELETE)
/// /products/{id}           one product (GET)
///
/// /webhooks                list (GET), register (POST)
/// /webhooks/{id}           read (GET), update (PATCH), remove (DELETE)
/// /webhooks/{id}/deliveries  delivery history (GET)
/// /webhooks/{id}/test      queue a test delivery (POST)
///
/// /jobs                    list (GET)
/// /jobs/{id}               progress snapshot (GET)
/// /jobs/{id}/cancel        request cancellation (POST)
/// /jobs/{id}/ws            live progress (WebSocket)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/imports", imports::router())
        .nest("/products", products::router())
        .nest("/jobs", jobs::router())
        .nest("/webhooks", webhooks::router())
}
