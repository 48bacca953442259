//! Topic-scoped progress bus.
//!
//! Topics are job ids. A subscriber sees every event published on its
//! topic after it subscribed, in publish order. Once a terminal event is
//! delivered the topic is closed and every subscriber stream ends.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use catalog_core::progress::ProgressEvent;
use catalog_core::types::DbId;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Stream of progress events for one topic.
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

/// Publish/subscribe interface for job progress.
///
/// Implementations must preserve per-topic publish order and must not drop
/// events for a live subscriber. Dropping a stream unsubscribes it.
pub trait ProgressBus: Send + Sync {
    /// Deliver `event` to every current subscriber of `topic`.
    fn publish(&self, topic: DbId, event: ProgressEvent);

    /// Receive events published on `topic` from now on.
    fn subscribe(&self, topic: DbId) -> ProgressStream;
}

// ---------------------------------------------------------------------------
// InProcessBus
// ---------------------------------------------------------------------------

type Topics = Mutex<HashMap<DbId, Vec<Subscriber>>>;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

/// In-process fan-out bus.
///
/// Each subscriber owns an unbounded queue, so a slow reader never makes
/// the bus skip events. Share via `Arc<InProcessBus>`.
#[derive(Default)]
pub struct InProcessBus {
    topics: Arc<Topics>,
    next_id: AtomicU64,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: DbId) -> usize {
        self.topics
            .lock()
            .map(|topics| {
                topics
                    .get(&topic)
                    .map_or(0, |subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
            })
            .unwrap_or(0)
    }

    /// Number of topics with at least one registered subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().map(|topics| topics.len()).unwrap_or(0)
    }
}

impl ProgressBus for InProcessBus {
    fn publish(&self, topic: DbId, event: ProgressEvent) {
        let Ok(mut topics) = self.topics.lock() else {
            tracing::error!(job_id = topic, "Progress bus lock poisoned, event dropped");
            return;
        };

        let terminal = event.is_terminal();
        if let Some(subscribers) = topics.get_mut(&topic) {
            // A failed send means the subscriber went away.
            subscribers.retain(|s| s.tx.send(event.clone()).is_ok());
            if subscribers.is_empty() {
                topics.remove(&topic);
            }
        }

        if terminal {
            // Dropping the senders ends every subscriber stream.
            topics.remove(&topic);
        }
    }

    fn subscribe(&self, topic: DbId) -> ProgressStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.topics.lock() {
            Ok(mut topics) => topics.entry(topic).or_default().push(Subscriber { id, tx }),
            Err(_) => {
                tracing::error!(job_id = topic, "Progress bus lock poisoned, stream closed");
            }
        }
        Subscription {
            id,
            topic,
            topics: Arc::downgrade(&self.topics),
            events: UnboundedReceiverStream::new(rx),
        }
        .boxed()
    }
}

/// Receiving end of one subscription. Unregisters itself on drop.
struct Subscription {
    id: u64,
    topic: DbId,
    topics: Weak<Topics>,
    events: UnboundedReceiverStream<ProgressEvent>,
}

impl Stream for Subscription {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(topics) = self.topics.upgrade() else {
            return;
        };
        let Ok(mut topics) = topics.lock() else {
            return;
        };
        if let Some(subscribers) = topics.get_mut(&self.topic) {
            subscribers.retain(|s| s.id != self.id);
            if subscribers.is_empty() {
                topics.remove(&self.topic);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
