//! In-memory stores for tests and embedding.
//!
//! They honour the same contracts as the PostgreSQL stores: job updates
//! are atomic and refuse terminal jobs, catalog writes are all-or-nothing
//! per batch, deleting a webhook drops its deliveries. Failures and
//! latency can be injected to exercise the retry and timeout paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::bulk_delete::ProductFilter;
use catalog_core::catalog_import::ProductRow;
use catalog_core::error::StoreError;
use catalog_core::job::{Job, JobListQuery, NewJob};
use catalog_core::product::Product;
use catalog_core::store::{CatalogStore, JobStore, WebhookStore};
use catalog_core::webhook::{
    AttemptOutcome, NewDelivery, NewWebhook, UpdateWebhook, Webhook, WebhookDelivery,
    WebhookEvent,
};
use catalog_core::types::{DbId, Timestamp};
use chrono::Utc;

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Pending injected failures for one kind of operation.
#[derive(Debug, Default)]
struct FaultQueue {
    remaining: u32,
    error: Option<StoreError>,
}

impl FaultQueue {
    fn arm(&mut self, times: u32, error: StoreError) {
        self.remaining = times;
        self.error = Some(error);
    }

    /// Consume one injected failure, if any.
    fn take(&mut self) -> Result<(), StoreError> {
        if self.remaining == 0 {
            return Ok(());
        }
        self.remaining -= 1;
        Err(self
            .error
            .clone()
            .unwrap_or_else(|| StoreError::Unavailable("injected failure".to_string())))
    }
}

// ---------------------------------------------------------------------------
// MemoryJobStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<DbId, Job>>,
    next_id: AtomicI64,
    update_faults: Mutex<FaultQueue>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` updates with `error`.
    pub fn fail_next_updates(&self, times: u32, error: StoreError) {
        if let Ok(mut faults) = self.update_faults.lock() {
            faults.arm(times, error);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = new.into_job(id, Utc::now());
        self.jobs
            .write()
            .map_err(|_| poisoned())?
            .insert(id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        self.update_faults.lock().map_err(|_| poisoned())?.take()?;

        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        match jobs.get_mut(&job.id) {
            Some(stored) if !stored.is_terminal() => {
                *stored = job.clone();
                Ok(())
            }
            Some(_) => Err(StoreError::Conflict(format!(
                "Job {} is already terminal",
                job.id
            ))),
            None => Err(StoreError::Conflict(format!("Job {} does not exist", job.id))),
        }
    }

    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut matching: Vec<Job> = jobs.values().filter(|j| query.matches(j)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(query.effective_offset() as usize)
            .take(query.effective_limit() as usize)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalogStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredProduct {
    id: DbId,
    row: ProductRow,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl StoredProduct {
    fn to_product(&self) -> Product {
        Product {
            id: self.id,
            sku: self.row.sku.clone(),
            name: self.row.name.clone(),
            description: self.row.description.clone(),
            price_cents: self.row.price_cents,
            active: self.row.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Default)]
struct CatalogFaults {
    upserts: FaultQueue,
    deletes: FaultQueue,
    clears: FaultQueue,
    delay: Option<Duration>,
}

/// Products keyed by lower-cased SKU.
#[derive(Default)]
pub struct MemoryCatalogStore {
    products: Mutex<BTreeMap<String, StoredProduct>>,
    next_id: AtomicI64,
    changed_rows: AtomicU64,
    faults: Mutex<CatalogFaults>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `count` products `SEED-0..` directly, bypassing fault injection.
    pub fn seed(&self, count: usize) {
        let rows: Vec<ProductRow> = (0..count)
            .map(|i| ProductRow {
                sku: format!("SEED-{i}"),
                name: format!("Seeded product {i}"),
                description: String::new(),
                price_cents: 100,
                active: true,
            })
            .collect();
        self.seed_rows(&rows);
    }

    pub fn seed_rows(&self, rows: &[ProductRow]) {
        if let Ok(mut products) = self.products.lock() {
            for row in rows {
                self.apply(&mut products, row);
            }
        }
    }

    /// Fail the next `times` upserts with `error`.
    pub fn fail_next_upserts(&self, times: u32, error: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.upserts.arm(times, error);
        }
    }

    /// Fail the next `times` batch deletes with `error`.
    pub fn fail_next_deletes(&self, times: u32, error: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.deletes.arm(times, error);
        }
    }

    /// Fail the next `times` fast clears with `error`.
    pub fn fail_next_clears(&self, times: u32, error: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clears.arm(times, error);
        }
    }

    /// Sleep this long at the start of every write.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.delay = Some(delay);
        }
    }

    pub fn len(&self) -> usize {
        self.products.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a product by SKU, case-insensitively.
    pub fn get(&self, sku: &str) -> Option<ProductRow> {
        self.products
            .lock()
            .ok()
            .and_then(|p| p.get(&sku.to_lowercase()).map(|s| s.row.clone()))
    }

    /// All products ordered by lower-cased SKU.
    pub fn snapshot(&self) -> Vec<ProductRow> {
        self.products
            .lock()
            .map(|p| p.values().map(|s| s.row.clone()).collect())
            .unwrap_or_default()
    }

    /// Rows inserted or changed since creation.
    pub fn changed_rows(&self) -> u64 {
        self.changed_rows.load(Ordering::SeqCst)
    }

    /// Latest change time of a product.
    pub fn updated_at(&self, sku: &str) -> Option<Timestamp> {
        self.products
            .lock()
            .ok()
            .and_then(|p| p.get(&sku.to_lowercase()).map(|s| s.updated_at))
    }

    async fn before_write(
        &self,
        pick: fn(&mut CatalogFaults) -> &mut FaultQueue,
    ) -> Result<(), StoreError> {
        let delay = {
            let mut faults = self.faults.lock().map_err(|_| poisoned())?;
            pick(&mut faults).take()?;
            faults.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Upsert one row; returns whether anything changed.
    fn apply(&self, products: &mut BTreeMap<String, StoredProduct>, row: &ProductRow) -> bool {
        let now = Utc::now();
        match products.get_mut(&row.key()) {
            Some(existing) if same_fields(&existing.row, row) => false,
            Some(existing) => {
                // The stored SKU keeps its original casing.
                existing.row = ProductRow {
                    sku: existing.row.sku.clone(),
                    ..row.clone()
                };
                existing.updated_at = now;
                self.changed_rows.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                products.insert(
                    row.key(),
                    StoredProduct {
                        id,
                        row: row.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                self.changed_rows.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }
}

fn same_fields(a: &ProductRow, b: &ProductRow) -> bool {
    a.name == b.name
        && a.description == b.description
        && a.price_cents == b.price_cents
        && a.active == b.active
}

fn matches(filter: &ProductFilter, product: &StoredProduct) -> bool {
    filter.matches(&product.row)
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn upsert_batch(&self, rows: &[ProductRow]) -> Result<u64, StoreError> {
        self.before_write(|f| &mut f.upserts).await?;
        let mut products = self.products.lock().map_err(|_| poisoned())?;
        let written = rows.iter().filter(|row| self.apply(&mut products, row)).count();
        Ok(written as u64)
    }

    async fn count_matching(&self, filter: &ProductFilter) -> Result<i64, StoreError> {
        let products = self.products.lock().map_err(|_| poisoned())?;
        Ok(products.values().filter(|p| matches(filter, p)).count() as i64)
    }

    async fn delete_batch(&self, filter: &ProductFilter, limit: i64) -> Result<u64, StoreError> {
        self.before_write(|f| &mut f.deletes).await?;
        let mut products = self.products.lock().map_err(|_| poisoned())?;

        let mut victims: Vec<(DbId, String)> = products
            .iter()
            .filter(|(_, p)| matches(filter, p))
            .map(|(key, p)| (p.id, key.clone()))
            .collect();
        victims.sort_unstable();
        victims.truncate(limit.max(0) as usize);

        for (_, key) in &victims {
            products.remove(key);
        }
        Ok(victims.len() as u64)
    }

    async fn clear(&self, filter: &ProductFilter) -> Result<u64, StoreError> {
        self.before_write(|f| &mut f.clears).await?;
        let mut products = self.products.lock().map_err(|_| poisoned())?;
        let before = products.len();
        products.retain(|_, p| !matches(filter, p));
        Ok((before - products.len()) as u64)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, StoreError> {
        let products = self.products.lock().map_err(|_| poisoned())?;
        let mut page: Vec<&StoredProduct> =
            products.values().filter(|p| matches(filter, p)).collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(StoredProduct::to_product)
            .collect())
    }

    async fn find_product(&self, id: DbId) -> Result<Option<Product>, StoreError> {
        let products = self.products.lock().map_err(|_| poisoned())?;
        Ok(products
            .values()
            .find(|p| p.id == id)
            .map(StoredProduct::to_product))
    }
}

// ---------------------------------------------------------------------------
// MemoryWebhookStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WebhookTables {
    webhooks: BTreeMap<DbId, Webhook>,
    deliveries: BTreeMap<DbId, WebhookDelivery>,
}

#[derive(Default)]
pub struct MemoryWebhookStore {
    tables: RwLock<WebhookTables>,
    next_webhook_id: AtomicI64,
    next_delivery_id: AtomicI64,
    delivery_faults: Mutex<FaultQueue>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` delivery creations with `error`.
    pub fn fail_next_deliveries(&self, times: u32, error: StoreError) {
        if let Ok(mut faults) = self.delivery_faults.lock() {
            faults.arm(times, error);
        }
    }

    pub fn delivery(&self, id: DbId) -> Option<WebhookDelivery> {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.deliveries.get(&id).cloned())
    }

    /// Every delivery, oldest first.
    pub fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.tables
            .read()
            .map(|t| t.deliveries.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn create(&self, new: NewWebhook) -> Result<Webhook, StoreError> {
        let id = self.next_webhook_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let webhook = Webhook {
            id,
            name: new.name,
            url: new.url,
            event_type: new.event_type,
            enabled: new.enabled,
            last_status_code: None,
            last_response_time_ms: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .map_err(|_| poisoned())?
            .webhooks
            .insert(id, webhook.clone());
        Ok(webhook)
    }

    async fn list(&self) -> Result<Vec<Webhook>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.webhooks.values().rev().cloned().collect())
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Webhook>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.webhooks.get(&id).cloned())
    }

    async fn update(
        &self,
        id: DbId,
        changes: &UpdateWebhook,
    ) -> Result<Option<Webhook>, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        Ok(tables.webhooks.get_mut(&id).map(|webhook| {
            changes.apply(webhook, Utc::now());
            webhook.clone()
        }))
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let removed = tables.webhooks.remove(&id).is_some();
        tables.deliveries.retain(|_, d| d.webhook_id != id);
        Ok(removed)
    }

    async fn subscribers(&self, event: WebhookEvent) -> Result<Vec<Webhook>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .webhooks
            .values()
            .filter(|w| w.enabled && w.event_type == event)
            .cloned()
            .collect())
    }

    async fn record_attempt(&self, id: DbId, attempt: &AttemptOutcome) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if let Some(webhook) = tables.webhooks.get_mut(&id) {
            webhook.record(attempt, Utc::now());
        }
        Ok(())
    }

    async fn create_delivery(&self, new: NewDelivery) -> Result<WebhookDelivery, StoreError> {
        self.delivery_faults.lock().map_err(|_| poisoned())?.take()?;

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if !tables.webhooks.contains_key(&new.webhook_id) {
            return Err(StoreError::Conflict(format!(
                "Webhook {} does not exist",
                new.webhook_id
            )));
        }
        let id = self.next_delivery_id.fetch_add(1, Ordering::SeqCst) + 1;
        let delivery = new.into_delivery(id, Utc::now());
        tables.deliveries.insert(id, delivery.clone());
        Ok(delivery)
    }

    async fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        match tables.deliveries.get_mut(&delivery.id) {
            Some(stored) => {
                *stored = delivery.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "Delivery {} does not exist",
                delivery.id
            ))),
        }
    }

    async fn list_deliveries(
        &self,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .deliveries
            .values()
            .rev()
            .filter(|d| d.webhook_id == webhook_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
