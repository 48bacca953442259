//! Row models for the `webhooks` and `webhook_deliveries` tables.

use catalog_core::error::StoreError;
use catalog_core::types::{DbId, Timestamp};
use catalog_core::webhook::{DeliveryStatus, Webhook, WebhookDelivery, WebhookEvent};
use sqlx::FromRow;

fn unknown(table: &str, id: DbId, field: &str, value: &str) -> StoreError {
    StoreError::Unavailable(format!("{table} {id} has unknown {field} '{value}'"))
}

fn event_type(table: &str, id: DbId, value: &str) -> Result<WebhookEvent, StoreError> {
    WebhookEvent::parse(value).ok_or_else(|| unknown(table, id, "event_type", value))
}

/// A row from the `webhooks` table.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookRow {
    pub id: DbId,
    pub name: String,
    pub url: String,
    pub event_type: String,
    pub enabled: bool,
    pub last_status_code: Option<i32>,
    pub last_response_time_ms: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<WebhookRow> for Webhook {
    type Error = StoreError;

    fn try_from(row: WebhookRow) -> Result<Self, Self::Error> {
        Ok(Webhook {
            event_type: event_type("Webhook", row.id, &row.event_type)?,
            id: row.id,
            name: row.name,
            url: row.url,
            enabled: row.enabled,
            last_status_code: row.last_status_code,
            last_response_time_ms: row.last_response_time_ms,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `webhook_deliveries` table.
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRow {
    pub id: DbId,
    pub webhook_id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub response_code: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub next_retry_at: Option<Timestamp>,
    pub is_test: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<DeliveryRow> for WebhookDelivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::parse(&row.status)
            .ok_or_else(|| unknown("Delivery", row.id, "status", &row.status))?;
        Ok(WebhookDelivery {
            event_type: event_type("Delivery", row.id, &row.event_type)?,
            status,
            id: row.id,
            webhook_id: row.webhook_id,
            payload: row.payload,
            attempt: row.attempt,
            max_attempts: row.max_attempts,
            response_code: row.response_code,
            response_time_ms: row.response_time_ms,
            error_message: row.error_message,
            next_retry_at: row.next_retry_at,
            is_test: row.is_test,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn webhook_row(event_type: &str) -> WebhookRow {
        WebhookRow {
            id: 4,
            name: "hook".into(),
            url: "http://example.test".into(),
            event_type: event_type.into(),
            enabled: true,
            last_status_code: None,
            last_response_time_ms: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn webhook_row_converts() {
        let webhook = Webhook::try_from(webhook_row("product.deleted")).unwrap();
        assert_eq!(webhook.event_type, WebhookEvent::ProductDeleted);
    }

    #[test]
    fn unknown_event_type_is_reported() {
        let err = Webhook::try_from(webhook_row("product.renamed")).unwrap_err();
        assert_matches!(err, StoreError::Unavailable(msg) if msg.contains("product.renamed"));
    }
}
