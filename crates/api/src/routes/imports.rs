use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::imports;
use crate::state::AppState;

/// Routes mounted at `/imports`.
///
/// The upload handler enforces `max_upload_bytes` itself while streaming,
/// so axum's default body limit is lifted here.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(imports::upload_import))
        .layer(DefaultBodyLimit::disable())
}
