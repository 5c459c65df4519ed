// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! HTTP service for caseline. Routing, bulkheads, and telemetry live here;
//! the wire contract is `caseline-api` and all persistence is behind
//! [`StoreHandle`].

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use caseline_store::QueryLimits;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use tokio::sync::Semaphore;

mod config;
mod http;
mod store_exec;
mod telemetry;

pub use config::{validate_startup_config, ApiConfig, StoreConfig, CONFIG_SCHEMA_VERSION};
pub use store_exec::{ExecError, StoreHandle};

pub const CRATE_NAME: &str = "caseline-server";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StoreHandle>,
    pub api: ApiConfig,
    pub limits: QueryLimits,
    pub ready: Arc<AtomicBool>,
    pub accepting_requests: Arc<AtomicBool>,
    pub(crate) cursor_secret: Arc<Vec<u8>>,
    pub(crate) class_cheap: Arc<Semaphore>,
    pub(crate) class_medium: Arc<Semaphore>,
    pub(crate) class_heavy: Arc<Semaphore>,
    pub(crate) metrics: Arc<telemetry::RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<StoreHandle>, api: ApiConfig, cursor_secret: Vec<u8>) -> Self {
        let limits = QueryLimits {
            default_limit: api.default_page_limit,
            max_limit: api.max_page_limit,
        };
        Self {
            store,
            limits,
            ready: Arc::new(AtomicBool::new(true)),
            accepting_requests: Arc::new(AtomicBool::new(true)),
            cursor_secret: Arc::new(cursor_secret),
            class_cheap: Arc::new(Semaphore::new(api.concurrency_cheap)),
            class_medium: Arc::new(Semaphore::new(api.concurrency_medium)),
            class_heavy: Arc::new(Semaphore::new(api.concurrency_heavy)),
            metrics: Arc::new(telemetry::RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
            api,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::handlers::landing_handler))
        .route("/healthz", get(http::handlers::healthz_handler))
        .route("/readyz", get(http::handlers::readyz_handler))
        .route("/metrics", get(http::handlers::metrics_handler))
        .route("/v1/version", get(http::handlers::version_handler))
        .route(
            "/v1/verifications/pending",
            get(http::cases::pending_handler),
        )
        .route("/v1/verifications/search", get(http::cases::search_handler))
        .route(
            "/v1/verifications/requests",
            post(http::cases::create_request_handler),
        )
        .route(
            "/v1/verifications/requests/:id",
            get(http::cases::get_request_handler),
        )
        .route(
            "/v1/verifications/requests/:id/status",
            post(http::cases::request_status_handler),
        )
        .route(
            "/v1/verifications/requests/:id/assign",
            post(http::cases::assign_handler),
        )
        .route(
            "/v1/verifications/requests/:id/reports",
            post(http::cases::file_report_handler),
        )
        .route(
            "/v1/verifications/reports/:id",
            get(http::cases::get_report_handler),
        )
        .route(
            "/v1/verifications/reports/:id/status",
            post(http::cases::report_status_handler),
        )
        .route(
            "/v1/verifications/character/report/:id",
            get(http::cases::character_report_handler),
        )
        .route(
            "/v1/verifications/education/report/:id",
            get(http::cases::education_report_handler),
        )
        .route(
            "/v1/verifications/employment/report/:id",
            get(http::cases::employment_report_handler),
        )
        .route(
            "/v1/verifiers",
            get(http::verifiers::list_verifiers_handler)
                .post(http::verifiers::create_verifier_handler),
        )
        .route(
            "/v1/verifiers/:id/active",
            post(http::verifiers::set_active_handler),
        )
        .route(
            "/v1/verifiers/:id/workload",
            get(http::verifiers::workload_handler),
        )
        .route("/v1/stats", get(http::verifiers::stats_handler))
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state)
}
