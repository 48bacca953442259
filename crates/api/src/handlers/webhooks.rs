//! Handlers for webhook management.
//!
//! CRUD for registrations, their delivery history and a test delivery.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use catalog_core::error::CoreError;
use catalog_core::types::DbId;
use catalog_core::webhook::{NewWebhook, UpdateWebhook, Webhook, WebhookDelivery};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_DELIVERY_LIMIT: i64 = 50;
const MAX_DELIVERY_LIMIT: i64 = 200;

/// Query parameters for the delivery history.
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Body of a 202 answer to a test request.
#[derive(Debug, Serialize)]
pub struct TestQueued {
    pub status: &'static str,
    pub webhook_id: DbId,
    pub delivery_id: DbId,
}

fn not_found(webhook_id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "Webhook",
        id: webhook_id,
    }
}

async fn find_webhook(state: &AppState, webhook_id: DbId) -> AppResult<Webhook> {
    let webhook = state
        .webhooks
        .find_by_id(webhook_id)
        .await
        .map_err(CoreError::from)?
        .ok_or_else(|| not_found(webhook_id))?;
    Ok(webhook)
}

// ---------------------------------------------------------------------------
// Webhook CRUD
// ---------------------------------------------------------------------------

/// POST /api/v1/webhooks
pub async fn create_webhook(
    State(state): State<AppState>,
    Json(input): Json<NewWebhook>,
) -> AppResult<(StatusCode, Json<DataResponse<Webhook>>)> {
    let input = input.validated()?;
    let webhook = state.webhooks.create(input).await.map_err(CoreError::from)?;

    tracing::info!(
        webhook_id = webhook.id,
        url = %webhook.url,
        event_type = %webhook.event_type,
        "Webhook created",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: webhook })))
}

/// GET /api/v1/webhooks
pub async fn list_webhooks(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Webhook>>>> {
    let webhooks = state.webhooks.list().await.map_err(CoreError::from)?;
    Ok(Json(DataResponse { data: webhooks }))
}

/// GET /api/v1/webhooks/{id}
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Webhook>>> {
    let webhook = find_webhook(&state, webhook_id).await?;
    Ok(Json(DataResponse { data: webhook }))
}

/// PATCH /api/v1/webhooks/{id}
///
/// Absent fields keep their value.
pub async fn update_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<DbId>,
    Json(input): Json<UpdateWebhook>,
) -> AppResult<Json<DataResponse<Webhook>>> {
    let changes = input.validated()?;
    let updated = state
        .webhooks
        .update(webhook_id, &changes)
        .await
        .map_err(CoreError::from)?
        .ok_or_else(|| not_found(webhook_id))?;

    tracing::info!(webhook_id, enabled = updated.enabled, "Webhook updated");
    Ok(Json(DataResponse { data: updated }))
}

/// DELETE /api/v1/webhooks/{id}
///
/// Deletes the webhook and its delivery history.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<DbId>,
) -> AppResult<StatusCode> {
    let deleted = state
        .webhooks
        .delete(webhook_id)
        .await
        .map_err(CoreError::from)?;
    if !deleted {
        return Err(not_found(webhook_id).into());
    }

    tracing::info!(webhook_id, "Webhook deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// GET /api/v1/webhooks/{id}/deliveries
///
/// Newest first. `limit` defaults to 50, at most 200.
pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(webhook_id): Path<DbId>,
    Query(params): Query<DeliveryListParams>,
) -> AppResult<Json<DataResponse<Vec<WebhookDelivery>>>> {
    find_webhook(&state, webhook_id).await?;

    let limit = params
        .limit
        .unwrap_or(DEFAULT_DELIVERY_LIMIT)
        .clamp(1, MAX_DELIVERY_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);
    let deliveries = state
        .webhooks
        .list_deliveries(webhook_id, limit, offset)
        .await
        .map_err(CoreError::from)?;
    Ok(Json(DataResponse { data: deliveries }))
}

/// POST /api/v1/webhooks/{id}/test
///
/// Queues one attempt with a test payload, whatever the webhook's event
/// type. The outcome shows up in the delivery history.
pub async fn test_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<TestQueued>>)> {
    let webhook = find_webhook(&state, webhook_id).await?;
    let delivery = state
        .notifier
        .send_test(&webhook)
        .await
        .map_err(CoreError::from)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: TestQueued {
                status: "queued",
                webhook_id,
                delivery_id: delivery.id,
            },
        }),
    ))
}
