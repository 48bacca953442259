//! Repository for the `webhooks` and `webhook_deliveries` tables.

use catalog_core::types::DbId;
use catalog_core::webhook::{
    AttemptOutcome, NewDelivery, NewWebhook, UpdateWebhook, WebhookDelivery, WebhookEvent,
};
use sqlx::PgPool;

use crate::models::webhook::{DeliveryRow, WebhookRow};

const WEBHOOK_COLUMNS: &str = "\
    id, name, url, event_type, enabled, last_status_code, \
    last_response_time_ms, last_error, created_at, updated_at";

const DELIVERY_COLUMNS: &str = "\
    id, webhook_id, event_type, payload, status, attempt, max_attempts, \
    response_code, response_time_ms, error_message, next_retry_at, is_test, \
    created_at, updated_at";

/// Registrations and delivery records for outbound webhooks.
pub struct WebhookRepo;

impl WebhookRepo {
    // -----------------------------------------------------------------------
    // Webhooks
    // -----------------------------------------------------------------------

    pub async fn create(pool: &PgPool, input: &NewWebhook) -> Result<WebhookRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhooks (name, url, event_type, enabled) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {WEBHOOK_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookRow>(&query)
            .bind(&input.name)
            .bind(&input.url)
            .bind(input.event_type.as_str())
            .bind(input.enabled)
            .fetch_one(pool)
            .await
    }

    /// All webhooks, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<WebhookRow>, sqlx::Error> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, WebhookRow>(&query).fetch_all(pool).await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WebhookRow>, sqlx::Error> {
        let query = format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1");
        sqlx::query_as::<_, WebhookRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Enabled webhooks registered for `event`.
    pub async fn subscribers(
        pool: &PgPool,
        event: WebhookEvent,
    ) -> Result<Vec<WebhookRow>, sqlx::Error> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks \
             WHERE enabled AND event_type = $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, WebhookRow>(&query)
            .bind(event.as_str())
            .fetch_all(pool)
            .await
    }

    /// Overwrite the fields present in `changes`.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        changes: &UpdateWebhook,
    ) -> Result<Option<WebhookRow>, sqlx::Error> {
        let query = format!(
            "UPDATE webhooks SET \
                 name = COALESCE($2, name), \
                 url = COALESCE($3, url), \
                 event_type = COALESCE($4, event_type), \
                 enabled = COALESCE($5, enabled), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {WEBHOOK_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookRow>(&query)
            .bind(id)
            .bind(changes.name.as_deref())
            .bind(changes.url.as_deref())
            .bind(changes.event_type.map(|e| e.as_str()))
            .bind(changes.enabled)
            .fetch_optional(pool)
            .await
    }

    /// Delete a webhook; its deliveries go with it.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_attempt(
        pool: &PgPool,
        id: DbId,
        attempt: &AttemptOutcome,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE webhooks SET \
                 last_status_code = $2, \
                 last_response_time_ms = $3, \
                 last_error = $4, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(attempt.status_code)
        .bind(attempt.elapsed_ms)
        .bind(attempt.error.as_deref())
        .execute(pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deliveries
    // -----------------------------------------------------------------------

    pub async fn create_delivery(
        pool: &PgPool,
        input: &NewDelivery,
    ) -> Result<DeliveryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_deliveries (webhook_id, event_type, payload, max_attempts, is_test) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryRow>(&query)
            .bind(input.webhook_id)
            .bind(input.event_type.as_str())
            .bind(&input.payload)
            .bind(input.max_attempts)
            .bind(input.is_test)
            .fetch_one(pool)
            .await
    }

    /// Write every mutable field of `delivery`. Returns `false` when it no
    /// longer exists.
    pub async fn update_delivery(
        pool: &PgPool,
        delivery: &WebhookDelivery,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE webhook_deliveries SET \
                 status = $2, attempt = $3, response_code = $4, response_time_ms = $5, \
                 error_message = $6, next_retry_at = $7, updated_at = $8 \
             WHERE id = $1",
        )
        .bind(delivery.id)
        .bind(delivery.status.as_str())
        .bind(delivery.attempt)
        .bind(delivery.response_code)
        .bind(delivery.response_time_ms)
        .bind(delivery.error_message.as_deref())
        .bind(delivery.next_retry_at)
        .bind(delivery.updated_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deliveries of one webhook, newest first.
    pub async fn list_deliveries(
        pool: &PgPool,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeliveryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE webhook_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, DeliveryRow>(&query)
            .bind(webhook_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
