// SPDX-License-Identifier: Apache-2.0

use crate::http::handlers::{
    api_error_response, bulkhead_response, draining_response, exec_error_response, finish,
    is_draining, propagated_request_id, run_with_deadline, try_class_permit,
};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use caseline_api::{ApiError, CreateVerifierBody, SetActiveBody, VerifierView, WorkloadView};
use caseline_model::VerifierId;
use caseline_store::QueryClass;
use serde_json::json;
use std::time::Instant;

pub(crate) async fn list_verifiers_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifiers";
    let Some(_permit) = try_class_permit(&state, QueryClass::Cheap) else {
        let resp = bulkhead_response(&request_id, "cheap");
        return finish(&state, route, &request_id, started, resp).await;
    };
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state.store.read(caseline_store::list_verifiers),
    )
    .await;
    state
        .metrics
        .observe_sqlite_query("cheap", sql_started.elapsed())
        .await;
    let result = match outcome {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let resp = match result {
        Ok(verifiers) => {
            let rows: Vec<VerifierView> = verifiers.iter().map(VerifierView::from).collect();
            Json(json!({"verifiers": rows})).into_response()
        }
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn create_verifier_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateVerifierBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifiers";
    if is_draining(&state) {
        let resp = draining_response(&request_id);
        return finish(&state, route, &request_id, started, resp).await;
    }
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => {
            let resp = api_error_response(
                ApiError::validation_failed(json!([{"reason": rejection.body_text()}]))
                    .with_request_id(&request_id),
            );
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let draft = match body.into_draft() {
        Ok(v) => v,
        Err(e) => {
            let resp = api_error_response(e.with_request_id(&request_id));
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let Some(_permit) = try_class_permit(&state, QueryClass::Medium) else {
        let resp = bulkhead_response(&request_id, "medium");
        return finish(&state, route, &request_id, started, resp).await;
    };
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state.store.write(move |conn| {
            let id = caseline_store::insert_verifier(conn, &draft)?;
            caseline_store::get_verifier(conn, id)
        }),
    )
    .await;
    state
        .metrics
        .observe_sqlite_query("write", sql_started.elapsed())
        .await;
    let result = match outcome {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let resp = match result {
        Ok(verifier) => {
            (StatusCode::CREATED, Json(VerifierView::from(&verifier))).into_response()
        }
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn set_active_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
    body: Result<Json<SetActiveBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifiers/{id}/active";
    if is_draining(&state) {
        let resp = draining_response(&request_id);
        return finish(&state, route, &request_id, started, resp).await;
    }
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => {
            let resp = api_error_response(
                ApiError::validation_failed(json!([{"reason": rejection.body_text()}]))
                    .with_request_id(&request_id),
            );
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let id = match VerifierId::new(raw_id) {
        Ok(v) => v,
        Err(_) => {
            let resp = api_error_response(
                ApiError::invalid_param("id", &raw_id.to_string()).with_request_id(&request_id),
            );
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let Some(_permit) = try_class_permit(&state, QueryClass::Medium) else {
        let resp = bulkhead_response(&request_id, "medium");
        return finish(&state, route, &request_id, started, resp).await;
    };
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state
            .store
            .write(move |conn| caseline_store::set_verifier_active(conn, id, body.active)),
    )
    .await;
    state
        .metrics
        .observe_sqlite_query("write", sql_started.elapsed())
        .await;
    let result = match outcome {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let resp = match result {
        Ok(verifier) => Json(VerifierView::from(&verifier)).into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn workload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifiers/{id}/workload";
    let id = match VerifierId::new(raw_id) {
        Ok(v) => v,
        Err(_) => {
            let resp = api_error_response(
                ApiError::invalid_param("id", &raw_id.to_string()).with_request_id(&request_id),
            );
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let Some(_permit) = try_class_permit(&state, QueryClass::Medium) else {
        let resp = bulkhead_response(&request_id, "medium");
        return finish(&state, route, &request_id, started, resp).await;
    };
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state
            .store
            .read(move |conn| caseline_store::verifier_workload(conn, id)),
    )
    .await;
    state
        .metrics
        .observe_sqlite_query("medium", sql_started.elapsed())
        .await;
    let result = match outcome {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let resp = match result {
        Ok(workload) => Json(WorkloadView::from(&workload)).into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

/// Per-status counts across the whole book of work, for dashboards.
pub(crate) async fn stats_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/stats";
    let Some(_permit) = try_class_permit(&state, QueryClass::Medium) else {
        let resp = bulkhead_response(&request_id, "medium");
        return finish(&state, route, &request_id, started, resp).await;
    };
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state.store.read(caseline_store::count_requests_by_status),
    )
    .await;
    state
        .metrics
        .observe_sqlite_query("medium", sql_started.elapsed())
        .await;
    let result = match outcome {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let resp = match result {
        Ok(counts) => {
            let by_status: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(status, n)| (status.as_str().to_string(), json!(n)))
                .collect();
            Json(json!({"requests_by_status": by_status})).into_response()
        }
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}
