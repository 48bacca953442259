//! Handlers for `/products`: browsing and bulk deletion.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use catalog_core::bulk_delete::{DeleteStrategy, ProductFilter};
use catalog_core::error::CoreError;
use catalog_core::product::{Product, ProductListQuery, ProductPage};
use catalog_core::types::DbId;
use catalog_pipeline::DeleteSubmission;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/products
///
/// Newest first. Filters: `sku`, `name`, `description` (case-insensitive
/// substrings) and `active`; paging: `page` (from 1) and `page_size`
/// (default 50, at most 200). A page past the last one is 404.
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListQuery>,
) -> AppResult<Json<DataResponse<ProductPage>>> {
    let filter = params.filter();
    let count = state
        .catalog
        .count_matching(&filter)
        .await
        .map_err(CoreError::from)?;
    let window = params.window(count)?;
    let results = state
        .catalog
        .list_products(&filter, window.page_size, window.offset)
        .await
        .map_err(CoreError::from)?;

    Ok(Json(DataResponse {
        data: ProductPage::new(count, window, results),
    }))
}

/// GET /api/v1/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Product>>> {
    let product = state
        .catalog
        .find_product(product_id)
        .await
        .map_err(CoreError::from)?
        .ok_or(CoreError::NotFound {
            entity: "Product",
            id: product_id,
        })?;
    Ok(Json(DataResponse { data: product }))
}

/// Request body for `DELETE /products`.
#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    /// Must equal the configured phrase exactly.
    pub confirm_phrase: String,
    /// Omitted or empty deletes the whole catalog.
    #[serde(default)]
    pub filter: ProductFilter,
}

/// DELETE /api/v1/products
///
/// Returns 200 when the delete already ran on this request, 202 when it
/// was queued for a worker.
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(input): Json<BulkDeleteRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<DeleteSubmission>>)> {
    let submission = state
        .coordinator
        .submit_delete(input.filter, &input.confirm_phrase)
        .await?;

    let status = match submission.strategy {
        DeleteStrategy::Synchronous => StatusCode::OK,
        DeleteStrategy::Background | DeleteStrategy::FastClear => StatusCode::ACCEPTED,
    };
    Ok((status, Json(DataResponse { data: submission })))
}
