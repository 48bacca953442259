//! Store seams for the job engine.
//!
//! The engine talks to two external stores: the [`JobStore`] holding job
//! records and the [`CatalogStore`] holding products. Both are reached
//! through batch-scoped operations; every call is one transaction on the
//! implementation side. Webhook registrations and their delivery records
//! live behind [`WebhookStore`].

use async_trait::async_trait;

use crate::bulk_delete::ProductFilter;
use crate::catalog_import::ProductRow;
use crate::error::StoreError;
use crate::job::{Job, JobListQuery, NewJob};
use crate::product::Product;
use crate::types::DbId;
use crate::webhook::{
    AttemptOutcome, NewDelivery, NewWebhook, UpdateWebhook, Webhook, WebhookDelivery,
    WebhookEvent,
};

/// Durable job records.
///
/// One writer per job (its executor), any number of readers. `update`
/// replaces every mutable field in one atomic write and refuses to touch a
/// job that is already terminal.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a pending job and return it with its assigned id.
    async fn create(&self, new: NewJob) -> Result<Job, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, StoreError>;

    /// Persist the job's mutable fields. Fails with
    /// [`StoreError::Conflict`] if the stored job is already terminal or
    /// does not exist.
    async fn update(&self, job: &Job) -> Result<(), StoreError>;

    /// Jobs matching `query`, newest first.
    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError>;
}

/// Product catalog reached through batch-scoped transactions.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert-or-update every row by natural key in one transaction.
    /// Rows must not repeat a key. Returns the number of rows written.
    async fn upsert_batch(&self, rows: &[ProductRow]) -> Result<u64, StoreError>;

    /// Products currently matching `filter`.
    async fn count_matching(&self, filter: &ProductFilter) -> Result<i64, StoreError>;

    /// Delete at most `limit` matching products in one transaction.
    async fn delete_batch(&self, filter: &ProductFilter, limit: i64) -> Result<u64, StoreError>;

    /// Remove every matching product in one irreversible operation.
    async fn clear(&self, filter: &ProductFilter) -> Result<u64, StoreError>;

    /// One page of matching products, newest first (ties by id, newest
    /// first).
    async fn list_products(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, StoreError>;

    async fn find_product(&self, id: DbId) -> Result<Option<Product>, StoreError>;
}

/// Webhook registrations and their delivery records.
///
/// Deleting a webhook deletes its deliveries.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn create(&self, new: NewWebhook) -> Result<Webhook, StoreError>;

    /// Every webhook, newest first.
    async fn list(&self) -> Result<Vec<Webhook>, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Webhook>, StoreError>;

    /// Apply `changes`; `None` when the webhook does not exist.
    async fn update(
        &self,
        id: DbId,
        changes: &UpdateWebhook,
    ) -> Result<Option<Webhook>, StoreError>;

    /// Returns whether a webhook was removed.
    async fn delete(&self, id: DbId) -> Result<bool, StoreError>;

    /// Enabled webhooks subscribed to `event`.
    async fn subscribers(&self, event: WebhookEvent) -> Result<Vec<Webhook>, StoreError>;

    /// Mirror one attempt onto the webhook's `last_*` fields.
    async fn record_attempt(&self, id: DbId, attempt: &AttemptOutcome) -> Result<(), StoreError>;

    async fn create_delivery(&self, new: NewDelivery) -> Result<WebhookDelivery, StoreError>;

    /// Persist the delivery's mutable fields. Fails with
    /// [`StoreError::Conflict`] if it no longer exists.
    async fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<(), StoreError>;

    /// Deliveries of one webhook, newest first.
    async fn list_deliveries(
        &self,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDelivery>, StoreError>;
}
