//! Repository for the `products` table.
//!
//! Every write runs in its own transaction sized to one batch, so no lock
//! outlives the batch that took it.

use catalog_core::bulk_delete::ProductFilter;
use catalog_core::catalog_import::ProductRow;
use catalog_core::types::DbId;
use sqlx::PgPool;

use crate::models::product::ProductRecord;

/// Column list for `products` queries.
const COLUMNS: &str = "id, sku, name, description, price_cents, active, created_at, updated_at";

/// Owned bind values for a [`ProductFilter`], in placeholder order.
#[derive(Debug, Default, PartialEq, Eq)]
struct FilterBinds {
    sku_pattern: Option<String>,
    name_pattern: Option<String>,
    description_pattern: Option<String>,
    active: Option<bool>,
}

/// Build the `WHERE` clause for `filter`, numbering placeholders from
/// `first_idx`. Returns the clause (empty when unscoped), its bind values
/// and the next free placeholder index.
fn filter_clause(filter: &ProductFilter, first_idx: u32) -> (String, FilterBinds, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut binds = FilterBinds::default();
    let mut bind_idx = first_idx;

    if let Some(sku) = &filter.sku_contains {
        conditions.push(format!("sku ILIKE ${bind_idx}"));
        binds.sku_pattern = Some(like_pattern(sku));
        bind_idx += 1;
    }
    if let Some(name) = &filter.name_contains {
        conditions.push(format!("name ILIKE ${bind_idx}"));
        binds.name_pattern = Some(like_pattern(name));
        bind_idx += 1;
    }
    if let Some(description) = &filter.description_contains {
        conditions.push(format!("description ILIKE ${bind_idx}"));
        binds.description_pattern = Some(like_pattern(description));
        bind_idx += 1;
    }
    if let Some(active) = filter.active {
        conditions.push(format!("active = ${bind_idx}"));
        binds.active = Some(active);
        bind_idx += 1;
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, binds, bind_idx)
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Apply [`FilterBinds`] to a query in placeholder order.
macro_rules! bind_filter {
    ($query:expr, $binds:expr) => {{
        let mut q = $query;
        if let Some(pattern) = $binds.sku_pattern {
            q = q.bind(pattern);
        }
        if let Some(pattern) = $binds.name_pattern {
            q = q.bind(pattern);
        }
        if let Some(pattern) = $binds.description_pattern {
            q = q.bind(pattern);
        }
        if let Some(active) = $binds.active {
            q = q.bind(active);
        }
        q
    }};
}

/// Provides batch operations on catalog products.
pub struct ProductRepo;

impl ProductRepo {
    /// Upsert `rows` by lower-cased SKU in one transaction.
    ///
    /// Rows whose business fields are unchanged are left untouched, so
    /// re-importing the same source does not even bump `updated_at`.
    /// Returns the number of rows inserted or changed.
    pub async fn upsert_batch(pool: &PgPool, rows: &[ProductRow]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut skus = Vec::with_capacity(rows.len());
        let mut names = Vec::with_capacity(rows.len());
        let mut descriptions = Vec::with_capacity(rows.len());
        let mut prices = Vec::with_capacity(rows.len());
        let mut actives = Vec::with_capacity(rows.len());
        for row in rows {
            skus.push(row.sku.clone());
            names.push(row.name.clone());
            descriptions.push(row.description.clone());
            prices.push(row.price_cents);
            actives.push(row.active);
        }

        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO products (sku, name, description, price_cents, active) \
             SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::BIGINT[], $5::BOOLEAN[]) \
             ON CONFLICT ((LOWER(sku))) DO UPDATE \
             SET name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 price_cents = EXCLUDED.price_cents, \
                 active = EXCLUDED.active, \
                 updated_at = NOW() \
             WHERE (products.name, products.description, products.price_cents, products.active) \
                 IS DISTINCT FROM \
                 (EXCLUDED.name, EXCLUDED.description, EXCLUDED.price_cents, EXCLUDED.active)",
        )
        .bind(&skus)
        .bind(&names)
        .bind(&descriptions)
        .bind(&prices)
        .bind(&actives)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// Count products matching `filter`.
    pub async fn count_matching(pool: &PgPool, filter: &ProductFilter) -> Result<i64, sqlx::Error> {
        let (clause, binds, _) = filter_clause(filter, 1);
        let query = format!("SELECT COUNT(*) FROM products {clause}");
        bind_filter!(sqlx::query_scalar::<_, i64>(&query), binds)
            .fetch_one(pool)
            .await
    }

    /// Delete up to `limit` matching products, lowest id first, in one
    /// transaction. Rows locked by other transactions are skipped.
    pub async fn delete_batch(
        pool: &PgPool,
        filter: &ProductFilter,
        limit: i64,
    ) -> Result<u64, sqlx::Error> {
        let (clause, binds, limit_idx) = filter_clause(filter, 1);
        let query = format!(
            "DELETE FROM products WHERE id IN ( \
                 SELECT id FROM products {clause} \
                 ORDER BY id \
                 LIMIT ${limit_idx} \
                 FOR UPDATE SKIP LOCKED \
             )"
        );

        let mut tx = pool.begin().await?;
        let result = bind_filter!(sqlx::query(&query), binds)
            .bind(limit)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// Remove every matching product in one transaction.
    ///
    /// An unscoped filter truncates the table under an exclusive lock;
    /// a scoped one runs a single set-based delete.
    pub async fn clear(pool: &PgPool, filter: &ProductFilter) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let removed = if filter.is_unscoped() {
            sqlx::query("LOCK TABLE products IN ACCESS EXCLUSIVE MODE")
                .execute(&mut *tx)
                .await?;
            let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
                .fetch_one(&mut *tx)
                .await?;
            sqlx::query("TRUNCATE TABLE products")
                .execute(&mut *tx)
                .await?;
            count.max(0) as u64
        } else {
            let (clause, binds, _) = filter_clause(filter, 1);
            let query = format!("DELETE FROM products {clause}");
            bind_filter!(sqlx::query(&query), binds)
                .execute(&mut *tx)
                .await?
                .rows_affected()
        };

        tx.commit().await?;
        Ok(removed)
    }

    /// One page of products matching `filter`, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductRecord>, sqlx::Error> {
        let (clause, binds, limit_idx) = filter_clause(filter, 1);
        let offset_idx = limit_idx + 1;
        let query = format!(
            "SELECT {COLUMNS} FROM products {clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${limit_idx} OFFSET ${offset_idx}"
        );
        bind_filter!(sqlx::query_as::<_, ProductRecord>(&query), binds)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Find a product by SKU, case-insensitively.
    pub async fn find_by_sku(pool: &PgPool, sku: &str) -> Result<Option<ProductRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM products WHERE LOWER(sku) = LOWER($1)");
        sqlx::query_as::<_, ProductRecord>(&query)
            .bind(sku)
            .fetch_optional(pool)
            .await
    }

    /// Find a product by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ProductRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
