//! Fan-out of catalog events to registered webhooks.
//!
//! Each delivery runs on its own tracked task: load the webhook, stop if
//! it was disabled or removed, attempt, record, then sleep out the backoff
//! and go again until the delivery succeeds or runs out of attempts.
//! Shutdown lets in-flight attempts finish; pending retries stay recorded
//! as `retry` with their `next_retry_at`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use catalog_core::error::StoreError;
use catalog_core::progress::ProgressEvent;
use catalog_core::store::WebhookStore;
use catalog_core::webhook::{
    job_payload, AttemptOutcome, NewDelivery, Webhook, WebhookDelivery, WebhookEvent,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::broadcaster::ProgressObserver;
use crate::delivery::webhook::WebhookSender;

/// Backoff unit: attempt `n` is followed by `min(60s, base * 2^n)`.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub base_backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs(1),
        }
    }
}

/// Queues and runs webhook deliveries. Cheap to clone.
#[derive(Clone)]
pub struct WebhookNotifier {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn WebhookStore>,
    sender: Arc<dyn WebhookSender>,
    policy: DeliveryPolicy,
    tasks: TaskTracker,
    stop: CancellationToken,
}

impl WebhookNotifier {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        sender: Arc<dyn WebhookSender>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                sender,
                policy,
                tasks: TaskTracker::new(),
                stop: CancellationToken::new(),
            }),
        }
    }

    /// Record a delivery of `payload` for every enabled webhook subscribed
    /// to `event` and start sending them.
    pub async fn dispatch(
        &self,
        event: WebhookEvent,
        payload: serde_json::Value,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        if self.inner.stop.is_cancelled() {
            return Ok(Vec::new());
        }
        let webhooks = self.inner.store.subscribers(event).await?;
        let mut queued = Vec::with_capacity(webhooks.len());
        for webhook in webhooks {
            let new = NewDelivery::event(webhook.id, event, payload.clone());
            let delivery = self.inner.store.create_delivery(new).await?;
            self.spawn(delivery.clone());
            queued.push(delivery);
        }
        if !queued.is_empty() {
            tracing::debug!(event = %event, count = queued.len(), "Webhook deliveries queued");
        }
        Ok(queued)
    }

    /// Record and start a single-attempt test delivery to `webhook`,
    /// whatever event it subscribes to.
    pub async fn send_test(&self, webhook: &Webhook) -> Result<WebhookDelivery, StoreError> {
        let new = NewDelivery::test(webhook.id, Utc::now());
        let delivery = self.inner.store.create_delivery(new).await?;
        self.spawn(delivery.clone());
        tracing::info!(webhook_id = webhook.id, delivery_id = delivery.id, "Test webhook queued");
        Ok(delivery)
    }

    /// Deliveries and fan-outs still running.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Stop scheduling retries and wait for running attempts to finish.
    pub async fn shutdown(&self) {
        self.inner.stop.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        tracing::info!("Webhook notifier stopped");
    }

    fn spawn(&self, delivery: WebhookDelivery) {
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(deliver(inner, delivery));
    }
}

impl ProgressObserver for WebhookNotifier {
    fn observe(&self, event: &ProgressEvent) {
        let Some(webhook_event) = WebhookEvent::for_progress(event) else {
            return;
        };
        if self.inner.stop.is_cancelled() {
            return;
        }

        let payload = job_payload(webhook_event, event);
        let job_id = event.job_id;
        let notifier = self.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = notifier.dispatch(webhook_event, payload).await {
                tracing::warn!(
                    job_id,
                    event = %webhook_event,
                    error = %e,
                    "Failed to queue webhook deliveries"
                );
            }
        });
    }
}

async fn deliver(inner: Arc<Inner>, mut delivery: WebhookDelivery) {
    let delivery_id = delivery.id;
    let webhook_id = delivery.webhook_id;

    loop {
        let webhook = match inner.store.find_by_id(webhook_id).await {
            Ok(Some(webhook)) => webhook,
            Ok(None) => {
                tracing::debug!(delivery_id, webhook_id, "Webhook removed, delivery dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(delivery_id, webhook_id, error = %e, "Failed to load webhook");
                return;
            }
        };
        if !webhook.enabled {
            delivery.abandon_disabled(Utc::now());
            inner.save(&delivery).await;
            tracing::info!(delivery_id, webhook_id, "Webhook disabled, delivery failed");
            return;
        }

        delivery.begin_attempt(Utc::now());
        inner.save(&delivery).await;

        let attempt = inner.attempt(&webhook.url, &delivery.payload).await;
        if let Err(e) = inner.store.record_attempt(webhook_id, &attempt).await {
            tracing::warn!(webhook_id, error = %e, "Failed to record webhook attempt");
        }
        // Saved last: a finished delivery implies the webhook shows it.
        let retry_in = delivery.record(&attempt, Utc::now(), inner.policy.base_backoff);
        inner.save(&delivery).await;

        match &attempt.error {
            None => tracing::info!(
                delivery_id,
                webhook_id,
                attempt = delivery.attempt,
                status_code = ?attempt.status_code,
                elapsed_ms = attempt.elapsed_ms,
                "Webhook delivered"
            ),
            Some(error) => tracing::warn!(
                delivery_id,
                webhook_id,
                attempt = delivery.attempt,
                max_attempts = delivery.max_attempts,
                status = %delivery.status,
                error = %error,
                "Webhook attempt failed"
            ),
        }

        let Some(delay) = retry_in else {
            return;
        };
        tokio::select! {
            _ = inner.stop.cancelled() => {
                tracing::debug!(delivery_id, "Shutting down, webhook retry left pending");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

impl Inner {
    async fn attempt(&self, url: &str, payload: &serde_json::Value) -> AttemptOutcome {
        let started = Instant::now();
        let result = self.sender.send(url, payload).await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        match result {
            Ok(status) => AttemptOutcome::delivered(status, elapsed_ms),
            Err(e) => AttemptOutcome::failed(e.status_code(), elapsed_ms, e.to_string()),
        }
    }

    async fn save(&self, delivery: &WebhookDelivery) {
        if let Err(e) = self.store.update_delivery(delivery).await {
            tracing::warn!(delivery_id = delivery.id, error = %e, "Failed to save webhook delivery");
        }
    }
}
