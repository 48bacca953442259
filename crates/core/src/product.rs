//! Read-side product types: the stored product and page-numbered browsing.

use serde::{Deserialize, Serialize};

use crate::bulk_delete::ProductFilter;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: i64 = 200;

/// A product as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: DbId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Query parameters for browsing products, newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListQuery {
    /// Case-insensitive substring of the SKU.
    pub sku: Option<String>,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    /// Case-insensitive substring of the description.
    pub description: Option<String>,
    pub active: Option<bool>,
    /// 1-based.
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ProductListQuery {
    pub fn filter(&self) -> ProductFilter {
        ProductFilter {
            sku_contains: self.sku.clone(),
            name_contains: self.name.clone(),
            description_contains: self.description.clone(),
            active: self.active,
        }
        .normalized()
    }

    pub fn effective_page_size(&self) -> i64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Resolve the requested page against `count` matching products.
    ///
    /// Page 1 always exists, even when nothing matches; any other page
    /// past the last one is not found.
    pub fn window(&self, count: i64) -> Result<PageWindow, CoreError> {
        let page_size = self.effective_page_size();
        let page = self.page.unwrap_or(1);
        let last_page = ((count + page_size - 1) / page_size).max(1);

        if page < 1 || page > last_page {
            return Err(CoreError::NotFound {
                entity: "Page",
                id: page,
            });
        }
        Ok(PageWindow {
            page,
            page_size,
            offset: (page - 1) * page_size,
        })
    }
}

/// One resolved page: which rows to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
}

/// A page of products plus the total number matching.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<Product>,
}

impl ProductPage {
    pub fn new(count: i64, window: PageWindow, results: Vec<Product>) -> Self {
        Self {
            count,
            page: window.page,
            page_size: window.page_size,
            results,
        }
    }
}
