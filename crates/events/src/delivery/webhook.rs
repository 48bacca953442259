//! HTTP transport for webhook deliveries.
//!
//! [`HttpWebhookSender`] POSTs a JSON payload and classifies the answer.
//! It makes exactly one request per call: retrying is the notifier's job,
//! driven by the delivery record.

use std::time::Duration;

use async_trait::async_trait;
use catalog_core::webhook::MAX_ERROR_BODY_CHARS;

/// HTTP request timeout for a single delivery attempt.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// No usable response: connection, DNS, TLS or timeout failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a status of 400 or more.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

impl WebhookError {
    /// Status code of the response, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::HttpStatus { status, .. } => Some(*status),
        }
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// One POST of a JSON payload to a webhook URL.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Returns the response status when it is below 400.
    async fn send(&self, url: &str, payload: &serde_json::Value) -> Result<u16, WebhookError>;
}

/// [`WebhookSender`] backed by a shared `reqwest` client.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Result<Self, WebhookError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, url: &str, payload: &serde_json::Value) -> Result<u16, WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            // An unreadable body still leaves the status to report.
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::HttpStatus {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_error_reads_like_a_status_line() {
        let err = WebhookError::HttpStatus {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
        assert_eq!(err.status_code(), Some(502));
    }

    #[tokio::test]
    async fn request_errors_carry_no_status() {
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = WebhookError::Request(req_err);
        assert!(err.to_string().starts_with("HTTP request failed"));
        assert_eq!(err.status_code(), None);
    }

    #[tokio::test]
    async fn sender_builds_with_a_custom_timeout() {
        assert!(HttpWebhookSender::with_timeout(Duration::from_millis(250)).is_ok());
    }
}
