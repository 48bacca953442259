//! Outbound webhooks: registrations, delivery records and their retry
//! schedule.
//!
//! A delivery is one payload bound for one webhook. Each attempt is
//! recorded on the delivery and mirrored onto the webhook's `last_*`
//! fields; failed attempts are retried after `min(cap, base * 2^attempt)`
//! until `max_attempts` is reached.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoreError;
use crate::job::{JobKind, JobStatus};
use crate::progress::ProgressEvent;
use crate::types::{DbId, Timestamp};

/// Attempts a regular delivery gets.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Test deliveries are tried once.
pub const TEST_MAX_ATTEMPTS: i32 = 1;

/// Longest wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Response bodies are cut to this many characters in error messages.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

const MAX_NAME_LEN: usize = 255;
const MAX_URL_LEN: usize = 2048;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// What a webhook subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "product.created")]
    ProductCreated,
    #[serde(rename = "product.updated")]
    ProductUpdated,
    #[serde(rename = "product.deleted")]
    ProductDeleted,
    #[serde(rename = "product.import_progress")]
    ImportProgress,
    #[serde(rename = "product.import_completed")]
    ImportCompleted,
    #[serde(rename = "webhook.test")]
    Test,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 6] = [
        Self::ProductCreated,
        Self::ProductUpdated,
        Self::ProductDeleted,
        Self::ImportProgress,
        Self::ImportCompleted,
        Self::Test,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProductCreated => "product.created",
            Self::ProductUpdated => "product.updated",
            Self::ProductDeleted => "product.deleted",
            Self::ImportProgress => "product.import_progress",
            Self::ImportCompleted => "product.import_completed",
            Self::Test => "webhook.test",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == value)
    }

    /// The webhook event a job progress event raises, if any.
    ///
    /// Every import event is forwarded: progress while running, completion
    /// once terminal whatever the outcome. A delete raises
    /// `product.deleted` once, when it ends having removed something.
    pub fn for_progress(event: &ProgressEvent) -> Option<Self> {
        match event.kind {
            JobKind::Import if event.is_terminal() => Some(Self::ImportCompleted),
            JobKind::Import => Some(Self::ImportProgress),
            JobKind::Delete if event.is_terminal() && event.processed > 0 => {
                Some(Self::ProductDeleted)
            }
            JobKind::Delete => None,
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// A registered webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Webhook {
    pub id: DbId,
    pub name: String,
    pub url: String,
    pub event_type: WebhookEvent,
    pub enabled: bool,
    /// HTTP status of the latest attempt, if it got a response.
    pub last_status_code: Option<i32>,
    pub last_response_time_ms: Option<i64>,
    /// Error of the latest attempt; cleared by a success.
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Webhook {
    /// Mirror one attempt onto the `last_*` fields.
    pub fn record(&mut self, attempt: &AttemptOutcome, now: Timestamp) {
        self.last_status_code = attempt.status_code;
        self.last_response_time_ms = Some(attempt.elapsed_ms);
        self.last_error = attempt.error.clone();
        self.updated_at = now;
    }
}

fn default_enabled() -> bool {
    true
}

/// Body of a webhook registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    pub event_type: WebhookEvent,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl NewWebhook {
    /// Trim the name and URL, then check both.
    pub fn validated(self) -> Result<Self, CoreError> {
        let name = validate_name(&self.name)?;
        let url = validate_url(&self.url)?;
        Ok(Self { name, url, ..self })
    }
}

/// Partial update; absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWebhook {
    pub name: Option<String>,
    pub url: Option<String>,
    pub event_type: Option<WebhookEvent>,
    pub enabled: Option<bool>,
}

impl UpdateWebhook {
    pub fn validated(self) -> Result<Self, CoreError> {
        Ok(Self {
            name: self.name.as_deref().map(validate_name).transpose()?,
            url: self.url.as_deref().map(validate_url).transpose()?,
            ..self
        })
    }

    /// Apply the present fields to `webhook`.
    pub fn apply(&self, webhook: &mut Webhook, now: Timestamp) {
        if let Some(name) = &self.name {
            webhook.name = name.clone();
        }
        if let Some(url) = &self.url {
            webhook.url = url.clone();
        }
        if let Some(event_type) = self.event_type {
            webhook.event_type = event_type;
        }
        if let Some(enabled) = self.enabled {
            webhook.enabled = enabled;
        }
        webhook.updated_at = now;
    }
}

fn validate_name(name: &str) -> Result<String, CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_url(url: &str) -> Result<String, CoreError> {
    let url = url.trim();
    let has_host = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
    if !has_host || url.contains(char::is_whitespace) {
        return Err(CoreError::Validation(format!(
            "url must be an absolute http(s) URL, got '{url}'"
        )));
    }
    if url.len() > MAX_URL_LEN {
        return Err(CoreError::Validation(format!(
            "url must be at most {MAX_URL_LEN} bytes"
        )));
    }
    Ok(url.to_string())
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InProgress,
    Success,
    /// Failed, another attempt is scheduled.
    Retry,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "success" => Some(Self::Success),
            "retry" => Some(Self::Retry),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payload bound for one webhook, with its attempt history folded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookDelivery {
    pub id: DbId,
    pub webhook_id: DbId,
    pub event_type: WebhookEvent,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    /// Attempts made so far.
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

impl WebhookDelivery {
    /// Mark the start of the next attempt.
    pub fn begin_attempt(&mut self, now: Timestamp) {
        self.attempt += 1;
        self.status = DeliveryStatus::InProgress;
        self.error_message = None;
        self.next_retry_at = None;
        self.updated_at = now;
    }

    /// Fold one attempt's outcome in. Returns the wait before the next
    /// attempt, or `None` when the delivery is finished.
    pub fn record(
        &mut self,
        attempt: &AttemptOutcome,
        now: Timestamp,
        base_backoff: Duration,
    ) -> Option<Duration> {
        self.response_code = attempt.status_code;
        self.response_time_ms = Some(attempt.elapsed_ms);
        self.error_message = attempt.error.clone();
        self.updated_at = now;

        if attempt.succeeded() {
            self.status = DeliveryStatus::Success;
            self.next_retry_at = None;
            return None;
        }
        if self.attempt >= self.max_attempts {
            self.status = DeliveryStatus::Failed;
            self.next_retry_at = None;
            return None;
        }

        let delay = retry_delay(self.attempt.max(0) as u32, base_backoff);
        self.status = DeliveryStatus::Retry;
        self.next_retry_at = chrono::Duration::from_std(delay).ok().map(|d| now + d);
        Some(delay)
    }

    /// Give up without attempting: the webhook was switched off.
    pub fn abandon_disabled(&mut self, now: Timestamp) {
        self.status = DeliveryStatus::Failed;
        self.error_message = Some("Webhook disabled".to_string());
        self.next_retry_at = None;
        self.updated_at = now;
    }
}

/// A delivery about to be recorded.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub webhook_id: DbId,
    pub event_type: WebhookEvent,
    pub payload: serde_json::Value,
    pub max_attempts: i32,
    pub is_test: bool,
}

impl NewDelivery {
    pub fn event(webhook_id: DbId, event_type: WebhookEvent, payload: serde_json::Value) -> Self {
        Self {
            webhook_id,
            event_type,
            payload,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            is_test: false,
        }
    }

    /// A single-attempt test delivery for `webhook_id`.
    pub fn test(webhook_id: DbId, now: Timestamp) -> Self {
        Self {
            webhook_id,
            event_type: WebhookEvent::Test,
            payload: test_payload(webhook_id, now),
            max_attempts: TEST_MAX_ATTEMPTS,
            is_test: true,
        }
    }

    pub fn into_delivery(self, id: DbId, now: Timestamp) -> WebhookDelivery {
        WebhookDelivery {
            id,
            webhook_id: self.webhook_id,
            event_type: self.event_type,
            payload: self.payload,
            status: DeliveryStatus::Pending,
            attempt: 0,
            max_attempts: self.max_attempts,
            response_code: None,
            response_time_ms: None,
            error_message: None,
            next_retry_at: None,
            is_test: self.is_test,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What one POST to a webhook produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Present whenever the endpoint answered, even with an error status.
    pub status_code: Option<i32>,
    pub elapsed_ms: i64,
    /// `None` on success.
    pub error: Option<String>,
}

impl AttemptOutcome {
    pub fn delivered(status_code: u16, elapsed_ms: i64) -> Self {
        Self {
            status_code: Some(i32::from(status_code)),
            elapsed_ms,
            error: None,
        }
    }

    pub fn failed(status_code: Option<u16>, elapsed_ms: i64, error: impl Into<String>) -> Self {
        Self {
            status_code: status_code.map(i32::from),
            elapsed_ms,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Wait before the attempt after `attempt`: `min(60s, base * 2^attempt)`.
pub fn retry_delay(attempt: u32, base: Duration) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt.min(31)))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Body of a connectivity test.
pub fn test_payload(webhook_id: DbId, now: Timestamp) -> serde_json::Value {
    json!({
        "event": WebhookEvent::Test,
        "webhook_id": webhook_id,
        "timestamp": now,
        "message": "This is a test webhook payload.",
    })
}

/// Body announcing a job progress event.
pub fn job_payload(event_type: WebhookEvent, event: &ProgressEvent) -> serde_json::Value {
    json!({
        "event": event_type,
        "timestamp": event.timestamp,
        "job": {
            "id": event.job_id,
            "kind": event.kind,
            "status": event.status,
            "phase": event.phase,
            "processed": event.processed,
            "total": event.total,
            "percent": event.percent,
            "error_count": event.error_count,
            "error": event.error,
            "succeeded": event.status == JobStatus::Succeeded,
        },
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::job::NewJob;

    fn delivery(max_attempts: i32) -> WebhookDelivery {
        NewDelivery {
            max_attempts,
            ..NewDelivery::event(1, WebhookEvent::ImportCompleted, json!({}))
        }
        .into_delivery(10, Utc::now())
    }

    fn refused() -> AttemptOutcome {
        AttemptOutcome::failed(Some(503), 12, "HTTP 503: busy")
    }

    #[test]
    fn event_names_round_trip() {
        for event in WebhookEvent::ALL {
            assert_eq!(WebhookEvent::parse(event.as_str()), Some(event));
            assert_eq!(
                serde_json::to_value(event).unwrap(),
                json!(event.as_str())
            );
        }
        assert_eq!(WebhookEvent::parse("product.exploded"), None);
    }

    #[test]
    fn backoff_doubles_up_to_a_minute() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(1, base), Duration::from_secs(2));
        assert_eq!(retry_delay(4, base), Duration::from_secs(16));
        assert_eq!(retry_delay(6, base), MAX_BACKOFF);
        assert_eq!(retry_delay(u32::MAX, base), MAX_BACKOFF);
    }

    #[test]
    fn failures_retry_until_attempts_run_out() {
        let mut d = delivery(2);
        let base = Duration::from_millis(10);

        d.begin_attempt(Utc::now());
        assert_eq!(d.record(&refused(), Utc::now(), base), Some(Duration::from_millis(20)));
        assert_eq!(d.status, DeliveryStatus::Retry);
        assert!(d.next_retry_at.is_some());
        assert_eq!(d.response_code, Some(503));

        d.begin_attempt(Utc::now());
        assert_eq!(d.status, DeliveryStatus::InProgress);
        assert!(d.error_message.is_none());
        assert_eq!(d.record(&refused(), Utc::now(), base), None);
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert_eq!(d.attempt, 2);
        assert!(d.next_retry_at.is_none());
        assert_eq!(d.error_message.as_deref(), Some("HTTP 503: busy"));
    }

    #[test]
    fn success_clears_the_error() {
        let mut d = delivery(5);
        d.begin_attempt(Utc::now());
        d.record(&refused(), Utc::now(), Duration::from_secs(1));
        d.begin_attempt(Utc::now());
        let next = d.record(&AttemptOutcome::delivered(204, 3), Utc::now(), Duration::from_secs(1));

        assert_eq!(next, None);
        assert_eq!(d.status, DeliveryStatus::Success);
        assert_eq!(d.response_code, Some(204));
        assert!(d.error_message.is_none());
    }

    #[test]
    fn webhook_mirrors_the_latest_attempt() {
        let now = Utc::now();
        let mut webhook = Webhook {
            id: 1,
            name: "hook".into(),
            url: "http://example.test/hook".into(),
            event_type: WebhookEvent::ProductDeleted,
            enabled: true,
            last_status_code: None,
            last_response_time_ms: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        webhook.record(&AttemptOutcome::failed(None, 10_000, "timed out"), now);
        assert_eq!(webhook.last_status_code, None);
        assert_eq!(webhook.last_error.as_deref(), Some("timed out"));

        webhook.record(&AttemptOutcome::delivered(200, 8), now);
        assert_eq!(webhook.last_status_code, Some(200));
        assert_eq!(webhook.last_response_time_ms, Some(8));
        assert!(webhook.last_error.is_none());
    }

    #[test]
    fn registration_trims_and_checks_fields() {
        let hook = NewWebhook {
            name: "  Sync  ".into(),
            url: " https://example.test/in ".into(),
            event_type: WebhookEvent::ImportCompleted,
            enabled: true,
        }
        .validated()
        .unwrap();
        assert_eq!(hook.name, "Sync");
        assert_eq!(hook.url, "https://example.test/in");

        for bad in ["ftp://example.test", "example.test", "http://", "http://a b"] {
            let result = NewWebhook {
                url: bad.into(),
                ..hook.clone()
            }
            .validated();
            assert_matches!(result, Err(CoreError::Validation(_)), "{bad}");
        }
        let blank = NewWebhook {
            name: " ".into(),
            ..hook
        };
        assert_matches!(blank.validated(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn registration_defaults_to_enabled() {
        let hook: NewWebhook = serde_json::from_value(json!({
            "name": "a",
            "url": "http://example.test",
            "event_type": "product.deleted",
        }))
        .unwrap();
        assert!(hook.enabled);
        assert_eq!(hook.event_type, WebhookEvent::ProductDeleted);
    }

    #[test]
    fn progress_events_map_to_webhook_events() {
        let now = Utc::now();
        let mut import = NewJob::import("a.csv").into_job(1, now);
        assert_eq!(
            WebhookEvent::for_progress(&ProgressEvent::from_job(&import)),
            Some(WebhookEvent::ImportProgress)
        );
        import.status = JobStatus::Failed;
        assert_eq!(
            WebhookEvent::for_progress(&ProgressEvent::from_job(&import)),
            Some(WebhookEvent::ImportCompleted)
        );

        let mut delete =
            NewJob::delete("all products", crate::bulk_delete::DeleteStrategy::Background, 5)
                .into_job(2, now);
        delete.processed = 3;
        assert_eq!(WebhookEvent::for_progress(&ProgressEvent::from_job(&delete)), None);
        delete.status = JobStatus::Cancelled;
        assert_eq!(
            WebhookEvent::for_progress(&ProgressEvent::from_job(&delete)),
            Some(WebhookEvent::ProductDeleted)
        );
        delete.processed = 0;
        assert_eq!(WebhookEvent::for_progress(&ProgressEvent::from_job(&delete)), None);
    }

    #[test]
    fn test_payload_names_the_webhook() {
        let delivery = NewDelivery::test(9, Utc::now());
        assert_eq!(delivery.max_attempts, 1);
        assert!(delivery.is_test);
        assert_eq!(delivery.payload["event"], "webhook.test");
        assert_eq!(delivery.payload["webhook_id"], 9);
        assert_eq!(delivery.payload["message"], "This is a test webhook payload.");
    }
}
