use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use catalog_core::config::{EngineConfig, ExecutionMode};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time given to running jobs to reach a batch boundary on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Where uploaded CSV files are stored before import (default: `./uploads`).
    pub upload_dir: PathBuf,
    /// Largest accepted upload in bytes (default: 200 MiB).
    pub max_upload_bytes: u64,
    /// Seconds between WebSocket pings (default: `30`).
    pub ws_heartbeat_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `UPLOAD_DIR`            | `./uploads`                |
    /// | `MAX_UPLOAD_BYTES`      | `209715200`                |
    /// | `WS_HEARTBEAT_SECS`     | `30`                       |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Panics on unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port: parse_or(&lookup, "PORT", 3000),
            cors_origins,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 200 * 1024 * 1024),
            ws_heartbeat_secs: parse_or(&lookup, "WS_HEARTBEAT_SECS", 30_u64).max(1),
        }
    }
}

/// Load the job engine configuration from environment variables.
///
/// | Env Var                             | Default               |
/// |-------------------------------------|-----------------------|
/// | `PRODUCT_IMPORT_BATCH_SIZE`         | `5000`                |
/// | `PRODUCT_IMPORT_EXECUTION`          | `background`          |
/// | `PRODUCT_BULK_DELETE_THRESHOLD`     | `10000`               |
/// | `PRODUCT_DELETE_BATCH_SIZE`         | `1000`                |
/// | `PRODUCT_DELETE_TRUNCATE_THRESHOLD` | `200000`              |
/// | `PRODUCT_DELETE_CONFIRM_PHRASE`     | `DELETE ALL PRODUCTS` |
/// | `JOB_WORKER_COUNT`                  | `4`                   |
/// | `JOB_BATCH_TIMEOUT_SECS`            | `30`                  |
/// | `JOB_BATCH_MAX_ATTEMPTS`            | `3`                   |
/// | `JOB_RETRY_BACKOFF_MS`              | `500`                 |
/// | `JOB_FINISH_MAX_ATTEMPTS`           | `10`                  |
/// | `JOB_MAX_ERROR_RECORDS`             | `50`                  |
pub fn engine_config_from_env() -> EngineConfig {
    engine_config_from_lookup(|key| std::env::var(key).ok())
}

/// Build an [`EngineConfig`] from an arbitrary key lookup, falling back to
/// the engine defaults. Panics on unparsable values.
pub fn engine_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
    let defaults = EngineConfig::default();

    let import_execution = match lookup("PRODUCT_IMPORT_EXECUTION") {
        Some(value) => ExecutionMode::parse(&value).unwrap_or_else(|| {
            panic!("PRODUCT_IMPORT_EXECUTION must be 'inline' or 'background', got '{value}'")
        }),
        None => defaults.import_execution,
    };

    EngineConfig {
        import_batch_size: parse_or(
            &lookup,
            "PRODUCT_IMPORT_BATCH_SIZE",
            defaults.import_batch_size,
        ),
        import_execution,
        delete_sync_threshold: parse_or(
            &lookup,
            "PRODUCT_BULK_DELETE_THRESHOLD",
            defaults.delete_sync_threshold,
        ),
        delete_truncate_threshold: parse_or(
            &lookup,
            "PRODUCT_DELETE_TRUNCATE_THRESHOLD",
            defaults.delete_truncate_threshold,
        ),
        delete_batch_size: parse_or(
            &lookup,
            "PRODUCT_DELETE_BATCH_SIZE",
            defaults.delete_batch_size,
        ),
        delete_confirm_phrase: lookup("PRODUCT_DELETE_CONFIRM_PHRASE")
            .unwrap_or(defaults.delete_confirm_phrase),
        batch_timeout: Duration::from_secs(parse_or(
            &lookup,
            "JOB_BATCH_TIMEOUT_SECS",
            defaults.batch_timeout.as_secs(),
        )),
        batch_max_attempts: parse_or(
            &lookup,
            "JOB_BATCH_MAX_ATTEMPTS",
            defaults.batch_max_attempts,
        ),
        retry_backoff: Duration::from_millis(parse_or(
            &lookup,
            "JOB_RETRY_BACKOFF_MS",
            defaults.retry_backoff.as_millis() as u64,
        )),
        finish_max_attempts: parse_or(
            &lookup,
            "JOB_FINISH_MAX_ATTEMPTS",
            defaults.finish_max_attempts,
        ),
        worker_count: parse_or(&lookup, "JOB_WORKER_COUNT", defaults.worker_count),
        max_error_records: parse_or(
            &lookup,
            "JOB_MAX_ERROR_RECORDS",
            defaults.max_error_records,
        ),
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>())),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn server_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.max_upload_bytes, 209_715_200);
        assert_eq!(config.ws_heartbeat_secs, 30);
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = ServerConfig::from_lookup(lookup(&[(
            "CORS_ORIGINS",
            "http://a.test, http://b.test,,",
        )]));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn engine_defaults_match_core_defaults() {
        let config = engine_config_from_lookup(lookup(&[]));
        assert_eq!(config.import_batch_size, 5000);
        assert_eq!(config.delete_sync_threshold, 10_000);
        assert_eq!(config.delete_truncate_threshold, 200_000);
        assert_eq!(config.delete_batch_size, 1000);
        assert_eq!(config.delete_confirm_phrase, "DELETE ALL PRODUCTS");
        assert_eq!(config.import_execution, ExecutionMode::Background);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_overrides_are_applied() {
        let config = engine_config_from_lookup(lookup(&[
            ("PRODUCT_IMPORT_BATCH_SIZE", "250"),
            ("PRODUCT_IMPORT_EXECUTION", "inline"),
            ("PRODUCT_BULK_DELETE_THRESHOLD", "100"),
            ("PRODUCT_DELETE_TRUNCATE_THRESHOLD", "5000"),
            ("PRODUCT_DELETE_BATCH_SIZE", "50"),
            ("PRODUCT_DELETE_CONFIRM_PHRASE", "WIPE"),
            ("JOB_WORKER_COUNT", "8"),
            ("JOB_RETRY_BACKOFF_MS", "20"),
        ]));
        assert_eq!(config.import_batch_size, 250);
        assert_eq!(config.import_execution, ExecutionMode::Inline);
        assert_eq!(config.delete_sync_threshold, 100);
        assert_eq!(config.delete_truncate_threshold, 5000);
        assert_eq!(config.delete_batch_size, 50);
        assert_eq!(config.delete_confirm_phrase, "WIPE");
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.retry_backoff, Duration::from_millis(20));
    }

    #[test]
    #[should_panic(expected = "PRODUCT_DELETE_BATCH_SIZE must be a valid")]
    fn unparsable_value_panics() {
        engine_config_from_lookup(lookup(&[("PRODUCT_DELETE_BATCH_SIZE", "lots")]));
    }
}
