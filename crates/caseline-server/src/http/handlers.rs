// SPDX-License-Identifier: Apache-2.0

use crate::store_exec::ExecError;
use crate::{AppState, CRATE_NAME};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use caseline_api::{ApiError, ApiErrorCode};
use caseline_model::RequestStatus;
use caseline_store::QueryClass;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::{error, info};

pub(crate) fn api_error_response(err: ApiError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": err}))).into_response()
}

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

/// Drain policy: mutating handlers check this and refuse new work; read
/// handlers keep serving until the listener closes.
pub(crate) fn is_draining(state: &AppState) -> bool {
    !state.accepting_requests.load(Ordering::Relaxed)
}

pub(crate) fn class_name(class: QueryClass) -> &'static str {
    match class {
        QueryClass::Cheap => "cheap",
        QueryClass::Medium => "medium",
        QueryClass::Heavy => "heavy",
    }
}

pub(crate) fn try_class_permit(
    state: &AppState,
    class: QueryClass,
) -> Option<OwnedSemaphorePermit> {
    let semaphore = match class {
        QueryClass::Cheap => &state.class_cheap,
        QueryClass::Medium => &state.class_medium,
        QueryClass::Heavy => &state.class_heavy,
    };
    semaphore.clone().try_acquire_owned().ok()
}

/// Caps a handler's store work by the request deadline. The executor bounds
/// each SQL call on its own; this also covers time spent queued behind the
/// single writer or the read pool.
pub(crate) async fn run_with_deadline<T>(
    deadline: Duration,
    request_id: &str,
    work: impl Future<Output = T>,
) -> Result<T, Response> {
    match timeout(deadline, work).await {
        Ok(value) => Ok(value),
        Err(_) => Err(api_error_response(ApiError::new(
            ApiErrorCode::ServiceUnavailable,
            "request deadline exceeded",
            json!({}),
            request_id,
        ))),
    }
}

pub(crate) fn draining_response(request_id: &str) -> Response {
    let err = ApiError::new(
        ApiErrorCode::ServiceUnavailable,
        "server draining; refusing new requests",
        json!({}),
        request_id,
    );
    api_error_response(err)
}

pub(crate) fn bulkhead_response(request_id: &str, class: &str) -> Response {
    let err = ApiError::new(
        ApiErrorCode::RateLimited,
        "query bulkhead saturated",
        json!({"class": class}),
        request_id,
    );
    api_error_response(err)
}

/// Executor failures become wire errors. Timeouts say so; everything else is
/// mapped by the taxonomy, with backend text going to the log only.
pub(crate) fn exec_error_response(request_id: &str, err: &ExecError) -> Response {
    let api_err = match err {
        ExecError::Timeout => ApiError::new(
            ApiErrorCode::ServiceUnavailable,
            "query timed out",
            json!({}),
            request_id,
        ),
        ExecError::Canceled => {
            error!(request_id, "store task canceled");
            ApiError::internal().with_request_id(request_id)
        }
        ExecError::Store(store_err) => {
            let mapped = ApiError::from_store(store_err).with_request_id(request_id);
            if mapped.code == ApiErrorCode::Internal {
                error!(request_id, "store failure: {store_err}");
            }
            mapped
        }
    };
    api_error_response(api_err)
}

pub(crate) async fn finish(
    state: &AppState,
    route: &'static str,
    request_id: &str,
    started: Instant,
    response: Response,
) -> Response {
    let latency = started.elapsed();
    if latency > state.api.slow_query_threshold {
        info!(request_id, route, latency_ms = latency.as_millis() as u64, "slow request");
    }
    state
        .metrics
        .observe_request(route, response.status(), latency)
        .await;
    with_request_id(response, request_id)
}

pub(crate) async fn landing_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Caseline</title></head><body>\
<h1>Caseline Verification Tracker</h1>\
<p>Version: <code>{}</code></p>\
<ul>\
<li><a href=\"/v1/verifications/pending\">/v1/verifications/pending</a></li>\
<li><a href=\"/v1/verifications/search?status=in_progress\">/v1/verifications/search?status=in_progress</a></li>\
<li><a href=\"/v1/verifiers\">/v1/verifiers</a></li>\
<li><a href=\"/v1/stats\">/v1/stats</a></li>\
</ul>\
</body></html>",
        env!("CARGO_PKG_VERSION"),
    );
    let mut resp = Response::new(Body::from(html));
    resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    finish(&state, "/", &request_id, started, resp).await
}

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let request_id = make_request_id(&state);
    let resp = (StatusCode::OK, "ok").into_response();
    finish(&state, "/healthz", &request_id, started, resp).await
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let request_id = make_request_id(&state);
    let resp = if state.ready.load(Ordering::Relaxed) && !is_draining(&state) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not-ready").into_response()
    };
    finish(&state, "/readyz", &request_id, started, resp).await
}

pub(crate) async fn version_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let request_id = make_request_id(&state);
    let payload = json!({
        "server": {
            "crate": CRATE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "config_schema_version": crate::config::CONFIG_SCHEMA_VERSION,
        },
        "api_version": caseline_api::API_VERSION,
    });
    let mut response = Json(payload).into_response();
    if let Ok(value) = HeaderValue::from_str("public, max-age=30") {
        response.headers_mut().insert("cache-control", value);
    }
    finish(&state, "/v1/version", &request_id, started, response).await
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let request_id = make_request_id(&state);
    let status_counts = match state
        .store
        .read(caseline_store::count_requests_by_status)
        .await
    {
        Ok(counts) => counts,
        Err(err) => {
            let resp = exec_error_response(&request_id, &err);
            return finish(&state, "/metrics", &request_id, started, resp).await;
        }
    };
    let labeled: Vec<(&str, u64)> = [
        RequestStatus::Received,
        RequestStatus::InProgress,
        RequestStatus::OnHold,
        RequestStatus::Completed,
        RequestStatus::Closed,
    ]
    .iter()
    .map(|s| {
        (
            s.as_str(),
            status_counts
                .iter()
                .find(|(status, _)| status == s)
                .map_or(0, |(_, n)| *n),
        )
    })
    .collect();
    let body = state
        .metrics
        .render(state.ready.load(Ordering::Relaxed), &labeled)
        .await;
    let mut resp = Response::new(Body::from(body));
    resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    finish(&state, "/metrics", &request_id, started, resp).await
}
