//! Row-level rules for CSV product imports.
//!
//! Turns one decoded CSV record into a [`ProductRow`] keyed by SKU, or a
//! [`RowError`] pointing at its line number. Row errors never abort an
//! import; the importer tallies them on the job and moves on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────

/// Default number of rows per import batch.
pub const DEFAULT_IMPORT_BATCH_SIZE: usize = 5000;

/// Default number of row error details kept on a job.
pub const DEFAULT_MAX_ERROR_RECORDS: usize = 50;

/// Values of the `active` column that mean `true` (compared lower-cased).
pub const TRUTHY_VALUES: &[&str] = &["1", "true", "yes", "y", "t"];

/// Header fields the importer understands. Anything else is ignored.
pub const FIELD_SKU: &str = "sku";
pub const FIELD_NAME: &str = "name";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_PRICE: &str = "price";
pub const FIELD_ACTIVE: &str = "active";

// ── Types ────────────────────────────────────────────────────────────

/// A row that could not be applied, referencing its CSV line (header = 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: u64,
    pub message: String,
}

impl RowError {
    pub fn new(row: u64, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

/// A normalised product ready to be upserted by its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub active: bool,
}

impl ProductRow {
    /// Natural key: SKUs match case-insensitively.
    pub fn key(&self) -> String {
        self.sku.to_lowercase()
    }
}

/// Positions of the recognised fields within a CSV header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    sku: Option<usize>,
    name: Option<usize>,
    description: Option<usize>,
    price: Option<usize>,
    active: Option<usize>,
}

impl ColumnMap {
    /// Build from header names. Names are trimmed and lower-cased; the
    /// first occurrence of a duplicated name wins.
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut map = Self::default();
        for (idx, raw) in headers.into_iter().enumerate() {
            let slot = match raw.trim().to_lowercase().as_str() {
                FIELD_SKU => &mut map.sku,
                FIELD_NAME => &mut map.name,
                FIELD_DESCRIPTION => &mut map.description,
                FIELD_PRICE => &mut map.price,
                FIELD_ACTIVE => &mut map.active,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        map
    }

    pub fn has_sku(&self) -> bool {
        self.sku.is_some()
    }

    /// Normalise one record.
    ///
    /// `field` returns the raw value at a column index, or `None` when the
    /// record is shorter than the header.
    pub fn normalize<'r>(
        &self,
        row: u64,
        field: impl Fn(usize) -> Option<&'r str>,
    ) -> Result<ProductRow, RowError> {
        let value = |idx: Option<usize>| idx.and_then(&field).map(str::trim).unwrap_or("");

        let sku = value(self.sku);
        if sku.is_empty() {
            return Err(RowError::new(row, "SKU is required."));
        }

        let raw_price = value(self.price);
        let price_cents = parse_price_cents(raw_price)
            .ok_or_else(|| RowError::new(row, format!("Invalid price value '{raw_price}'.")))?;

        let active = match self.active {
            Some(_) => parse_active(value(self.active)),
            None => true,
        };

        Ok(ProductRow {
            sku: sku.to_string(),
            name: value(self.name).to_string(),
            description: value(self.description).to_string(),
            price_cents,
            active,
        })
    }
}

// ── Pure functions ───────────────────────────────────────────────────

/// Parse a decimal price into cents.
///
/// Empty means zero. Accepts an optional leading `+`, digits and at most
/// two fractional digits. Negative, exponent and thousands-separated
/// values are rejected.
pub fn parse_price_cents(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    let unsigned = raw.strip_prefix('+').unwrap_or(raw);
    let (whole, frac) = match unsigned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (unsigned, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}

/// Interpret an `active` cell. Blank cells count as inactive, matching
/// the loader that produced the catalog format.
pub fn parse_active(raw: &str) -> bool {
    let lowered = raw.trim().to_lowercase();
    TRUTHY_VALUES.contains(&lowered.as_str())
}

/// Collapse rows sharing a natural key, keeping the last occurrence in
/// its original position. A single upsert statement must not touch the
/// same key twice.
pub fn dedupe_by_key(rows: Vec<ProductRow>) -> Vec<ProductRow> {
    let mut last_index: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        last_index.insert(row.key(), idx);
    }
    rows.into_iter()
        .enumerate()
        .filter(|(idx, row)| last_index.get(&row.key()) == Some(idx))
        .map(|(_, row)| row)
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
