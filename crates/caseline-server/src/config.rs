// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub sql_timeout: Duration,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    pub concurrency_cheap: usize,
    pub concurrency_medium: usize,
    pub concurrency_heavy: usize,
    pub slow_query_threshold: Duration,
    pub shutdown_drain: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
            request_timeout: Duration::from_secs(5),
            sql_timeout: Duration::from_millis(800),
            default_page_limit: 25,
            max_page_limit: 100,
            concurrency_cheap: 128,
            concurrency_medium: 64,
            concurrency_heavy: 16,
            slow_query_threshold: Duration::from_millis(200),
            shutdown_drain: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub max_read_connections: usize,
    #[serde(skip)]
    pub cursor_secret: Vec<u8>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("artifacts/caseline.sqlite"),
            max_read_connections: 16,
            cursor_secret: Vec::new(),
        }
    }
}

pub fn validate_startup_config(api: &ApiConfig, store: &StoreConfig) -> Result<(), String> {
    if api.max_body_bytes == 0 {
        return Err("api body limit must be > 0".to_string());
    }
    if api.request_timeout.is_zero() || api.sql_timeout.is_zero() {
        return Err("timeouts must be > 0".to_string());
    }
    if api.default_page_limit == 0 || api.max_page_limit < api.default_page_limit {
        return Err("page limit contract requires 0 < default <= max".to_string());
    }
    if api.concurrency_cheap == 0 || api.concurrency_medium == 0 || api.concurrency_heavy == 0 {
        return Err("bulkhead sizes must be > 0".to_string());
    }
    if store.max_read_connections == 0 {
        return Err("read connection limit must be > 0".to_string());
    }
    if store.cursor_secret.len() < 16 {
        return Err("cursor secret must be at least 16 bytes".to_string());
    }
    Ok(())
}
