//! Job progress publish/subscribe and webhook fan-out.
//!
//! - [`ProgressBus`]: topic-scoped pub/sub interface, one topic per job id.
//! - [`InProcessBus`]: in-process implementation with one unbounded queue
//!   per subscriber.
//! - [`ProgressBroadcaster`]: persists a job's snapshot, then publishes it.
//! - [`WebhookNotifier`]: turns published events into webhook deliveries.

pub mod broadcaster;
pub mod bus;
pub mod delivery;
pub mod notifier;

pub use broadcaster::{ProgressBroadcaster, ProgressObserver};
pub use bus::{InProcessBus, ProgressBus, ProgressStream};
pub use delivery::webhook::{HttpWebhookSender, WebhookError, WebhookSender};
pub use notifier::{DeliveryPolicy, WebhookNotifier};
