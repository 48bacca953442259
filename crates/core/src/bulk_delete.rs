//! Strategy selection and scoping for bulk product deletion.

use serde::{Deserialize, Serialize};

use crate::catalog_import::ProductRow;
use crate::error::CoreError;

/// Default count below which a delete runs inline.
pub const DEFAULT_SYNC_THRESHOLD: i64 = 10_000;

/// Default count at or above which a delete becomes a fast clear.
pub const DEFAULT_TRUNCATE_THRESHOLD: i64 = 200_000;

/// Default number of rows removed per delete batch.
pub const DEFAULT_DELETE_BATCH_SIZE: i64 = 1_000;

/// Default confirmation phrase required by bulk deletes.
pub const DEFAULT_CONFIRM_PHRASE: &str = "DELETE ALL PRODUCTS";

/// How a bulk delete is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
    /// Batched, on the caller's task, finished before submission returns.
    Synchronous,
    /// Batched, on a background worker.
    Background,
    /// One irreversible set-based clear, no per-batch progress.
    FastClear,
}

impl DeleteStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synchronous => "synchronous",
            Self::Background => "background",
            Self::FastClear => "fast_clear",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "synchronous" => Some(Self::Synchronous),
            "background" => Some(Self::Background),
            "fast_clear" => Some(Self::FastClear),
            _ => None,
        }
    }

    /// Batched strategies check cancellation between batches.
    pub fn is_batched(self) -> bool {
        !matches!(self, Self::FastClear)
    }
}

impl std::fmt::Display for DeleteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick a strategy for `count` matching records.
///
/// `sync_threshold < truncate_threshold` is guaranteed by
/// [`EngineConfig::validate`](crate::config::EngineConfig::validate).
pub fn select_strategy(count: i64, sync_threshold: i64, truncate_threshold: i64) -> DeleteStrategy {
    if count >= truncate_threshold {
        DeleteStrategy::FastClear
    } else if count >= sync_threshold {
        DeleteStrategy::Background
    } else {
        DeleteStrategy::Synchronous
    }
}

/// Reject a submission whose phrase differs from the configured one.
/// The comparison is exact: no trimming, no case folding.
pub fn verify_confirm_phrase(expected: &str, provided: &str) -> Result<(), CoreError> {
    if provided == expected {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid confirmation phrase. Expected '{expected}'."
        )))
    }
}

/// Which products a bulk delete or a browse targets. An empty filter
/// matches every product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive substring of the SKU.
    pub sku_contains: Option<String>,
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
    /// Case-insensitive substring of the description.
    #[serde(default)]
    pub description_contains: Option<String>,
    pub active: Option<bool>,
}

impl ProductFilter {
    /// Blank substrings are treated as absent.
    pub fn normalized(self) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            sku_contains: clean(self.sku_contains),
            name_contains: clean(self.name_contains),
            description_contains: clean(self.description_contains),
            active: self.active,
        }
    }

    pub fn is_unscoped(&self) -> bool {
        self.sku_contains.is_none()
            && self.name_contains.is_none()
            && self.description_contains.is_none()
            && self.active.is_none()
    }

    /// In-memory equivalent of the SQL predicate.
    pub fn matches(&self, row: &ProductRow) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| {
            needle
                .as_ref()
                .map_or(true, |n| haystack.to_lowercase().contains(&n.to_lowercase()))
        };
        contains(&row.sku, &self.sku_contains)
            && contains(&row.name, &self.name_contains)
            && contains(&row.description, &self.description_contains)
            && self.active.map_or(true, |a| a == row.active)
    }

    /// Short label stored as the job source.
    pub fn describe(&self) -> String {
        if self.is_unscoped() {
            return "all products".to_string();
        }
        let mut parts = Vec::new();
        if let Some(sku) = &self.sku_contains {
            parts.push(format!("sku~{sku}"));
        }
        if let Some(name) = &self.name_contains {
            parts.push(format!("name~{name}"));
        }
        if let Some(description) = &self.description_contains {
            parts.push(format!("description~{description}"));
        }
        if let Some(active) = self.active {
            parts.push(format!("active={active}"));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const T_SYNC: i64 = 10_000;
    const T_TRUNC: i64 = 200_000;

    #[test]
    fn strategy_boundaries() {
        assert_eq!(select_strategy(0, T_SYNC, T_TRUNC), DeleteStrategy::Synchronous);
        assert_eq!(select_strategy(T_SYNC - 1, T_SYNC, T_TRUNC), DeleteStrategy::Synchronous);
        assert_eq!(select_strategy(T_SYNC, T_SYNC, T_TRUNC), DeleteStrategy::Background);
        assert_eq!(select_strategy(T_TRUNC - 1, T_SYNC, T_TRUNC), DeleteStrategy::Background);
        assert_eq!(select_strategy(T_TRUNC, T_SYNC, T_TRUNC), DeleteStrategy::FastClear);
    }

    #[test]
    fn hundred_fifty_thousand_rows_run_in_background() {
        assert_eq!(
            select_strategy(150_000, T_SYNC, T_TRUNC),
            DeleteStrategy::Background
        );
    }

    #[test]
    fn confirm_phrase_is_case_sensitive_and_exact() {
        assert!(verify_confirm_phrase(DEFAULT_CONFIRM_PHRASE, "DELETE ALL PRODUCTS").is_ok());
        assert_matches!(
            verify_confirm_phrase(DEFAULT_CONFIRM_PHRASE, "delete all products"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            verify_confirm_phrase(DEFAULT_CONFIRM_PHRASE, " DELETE ALL PRODUCTS"),
            Err(CoreError::Validation(_))
        );
    }

    fn row(sku: &str, description: &str, active: bool) -> ProductRow {
        ProductRow {
            sku: sku.into(),
            name: "anything".into(),
            description: description.into(),
            price_cents: 0,
            active,
        }
    }

    #[test]
    fn filter_matching_is_case_insensitive() {
        let filter = ProductFilter {
            sku_contains: Some("ab".into()),
            active: Some(true),
            ..Default::default()
        };
        assert!(filter.matches(&row("XAB-1", "", true)));
        assert!(!filter.matches(&row("XAB-1", "", false)));
        assert!(!filter.matches(&row("ZZ-1", "", true)));
        assert!(ProductFilter::default().matches(&row("any", "", false)));
    }

    #[test]
    fn description_filter_searches_the_description() {
        let filter = ProductFilter {
            description_contains: Some("WATERPROOF".into()),
            ..Default::default()
        };
        assert!(filter.matches(&row("A", "A waterproof jacket", true)));
        assert!(!filter.matches(&row("A", "A warm jacket", true)));
        assert!(!filter.is_unscoped());
        assert_eq!(filter.describe(), "description~WATERPROOF");
    }

    #[test]
    fn blank_filter_fields_are_unscoped() {
        let filter = ProductFilter {
            sku_contains: Some("  ".into()),
            name_contains: Some(String::new()),
            description_contains: Some("\t".into()),
            active: None,
        }
        .normalized();
        assert!(filter.is_unscoped());
        assert_eq!(filter.describe(), "all products");
    }

    #[test]
    fn describe_lists_scoped_fields() {
        let filter = ProductFilter {
            sku_contains: Some("ab".into()),
            active: Some(false),
            ..Default::default()
        };
        assert_eq!(filter.describe(), "sku~ab, active=false");
    }

    #[test]
    fn only_fast_clear_is_unbatched() {
        assert!(DeleteStrategy::Synchronous.is_batched());
        assert!(DeleteStrategy::Background.is_batched());
        assert!(!DeleteStrategy::FastClear.is_batched());
    }
}
