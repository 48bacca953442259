//! PostgreSQL implementations of the engine's store traits.

use async_trait::async_trait;
use catalog_core::bulk_delete::ProductFilter;
use catalog_core::catalog_import::ProductRow;
use catalog_core::error::StoreError;
use catalog_core::job::{Job, JobListQuery, NewJob};
use catalog_core::product::Product;
use catalog_core::store::{CatalogStore, JobStore, WebhookStore};
use catalog_core::types::DbId;
use catalog_core::webhook::{
    AttemptOutcome, NewDelivery, NewWebhook, UpdateWebhook, Webhook, WebhookDelivery,
    WebhookEvent,
};

use crate::repositories::{JobRepo, ProductRepo, WebhookRepo};
use crate::DbPool;

/// Map a driver error onto the engine's transient/permanent split.
///
/// Pool acquisition timeouts surface as [`StoreError::Timeout`]; any other
/// driver failure is treated as the store being unavailable.
fn store_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(std::time::Duration::ZERO),
        other => {
            tracing::debug!(error = %other, "Database operation failed");
            StoreError::Unavailable(other.to_string())
        }
    }
}

/// Job records in the `jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let row = JobRepo::create(&self.pool, &new).await.map_err(store_err)?;
        Job::try_from(row)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        JobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_err)?
            .map(Job::try_from)
            .transpose()
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        let written = JobRepo::update(&self.pool, job).await.map_err(store_err)?;
        if written {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "Job {} is missing or already terminal",
                job.id
            )))
        }
    }

    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        JobRepo::list(&self.pool, query)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }
}

/// Products in the `products` table.
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: DbPool,
}

impl PgCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn upsert_batch(&self, rows: &[ProductRow]) -> Result<u64, StoreError> {
        ProductRepo::upsert_batch(&self.pool, rows)
            .await
            .map_err(store_err)
    }

    async fn count_matching(&self, filter: &ProductFilter) -> Result<i64, StoreError> {
        ProductRepo::count_matching(&self.pool, filter)
            .await
            .map_err(store_err)
    }

    async fn delete_batch(&self, filter: &ProductFilter, limit: i64) -> Result<u64, StoreError> {
        ProductRepo::delete_batch(&self.pool, filter, limit)
            .await
            .map_err(store_err)
    }

    async fn clear(&self, filter: &ProductFilter) -> Result<u64, StoreError> {
        ProductRepo::clear(&self.pool, filter)
            .await
            .map_err(store_err)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, StoreError> {
        let rows = ProductRepo::list(&self.pool, filter, limit, offset)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find_product(&self, id: DbId) -> Result<Option<Product>, StoreError> {
        let row = ProductRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_err)?;
        Ok(row.map(Product::from))
    }
}

/// Webhooks in the `webhooks` and `webhook_deliveries` tables.
#[derive(Clone)]
pub struct PgWebhookStore {
    pool: DbPool,
}

impl PgWebhookStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn create(&self, new: NewWebhook) -> Result<Webhook, StoreError> {
        let row = WebhookRepo::create(&self.pool, &new).await.map_err(store_err)?;
        Webhook::try_from(row)
    }

    async fn list(&self) -> Result<Vec<Webhook>, StoreError> {
        WebhookRepo::list(&self.pool)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(Webhook::try_from)
            .collect()
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Webhook>, StoreError> {
        WebhookRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_err)?
            .map(Webhook::try_from)
            .transpose()
    }

    async fn update(
        &self,
        id: DbId,
        changes: &UpdateWebhook,
    ) -> Result<Option<Webhook>, StoreError> {
        WebhookRepo::update(&self.pool, id, changes)
            .await
            .map_err(store_err)?
            .map(Webhook::try_from)
            .transpose()
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        WebhookRepo::delete(&self.pool, id).await.map_err(store_err)
    }

    async fn subscribers(&self, event: WebhookEvent) -> Result<Vec<Webhook>, StoreError> {
        WebhookRepo::subscribers(&self.pool, event)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(Webhook::try_from)
            .collect()
    }

    async fn record_attempt(&self, id: DbId, attempt: &AttemptOutcome) -> Result<(), StoreError> {
        WebhookRepo::record_attempt(&self.pool, id, attempt)
            .await
            .map_err(store_err)
    }

    async fn create_delivery(&self, new: NewDelivery) -> Result<WebhookDelivery, StoreError> {
        let row = WebhookRepo::create_delivery(&self.pool, &new)
            .await
            .map_err(store_err)?;
        WebhookDelivery::try_from(row)
    }

    async fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<(), StoreError> {
        let written = WebhookRepo::update_delivery(&self.pool, delivery)
            .await
            .map_err(store_err)?;
        if written {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "Delivery {} no longer exists",
                delivery.id
            )))
        }
    }

    async fn list_deliveries(
        &self,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        WebhookRepo::list_deliveries(&self.pool, webhook_id, limit, offset)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(WebhookDelivery::try_from)
            .collect()
    }
}
