//! Row model for the `products` table.

use catalog_core::product::Product;
use catalog_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `products` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProductRecord {
    pub id: DbId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<ProductRecord> for Product {
    fn from(row: ProductRecord) -> Self {
        Product {
            id: row.id,
            sku: row.sku,
            name: row.name,
            description: row.description,
            price_cents: row.price_cents,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
