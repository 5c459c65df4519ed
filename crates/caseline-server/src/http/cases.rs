// SPDX-License-Identifier: Apache-2.0

use crate::http::handlers::{
    api_error_response, bulkhead_response, class_name, draining_response, exec_error_response,
    finish, is_draining, propagated_request_id, run_with_deadline, try_class_permit,
};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use caseline_api::{
    case_page_view, parse_pending_params, parse_search_params, ApiError, AssignBody, CaseView,
    CreateRequestBody, FileReportBody, ReportRecordView, ReportStatusBody, RequestStatusBody,
};
use caseline_model::{ReportId, ReportKind, RequestId};
use caseline_store::{classify_search, QueryClass};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Instant;

fn body_error(request_id: &str, rejection: &JsonRejection) -> Response {
    api_error_response(
        ApiError::validation_failed(json!([{"reason": rejection.body_text()}]))
            .with_request_id(request_id),
    )
}

fn path_id(request_id: &str, name: &'static str, raw: i64) -> Result<i64, Response> {
    if raw < 1 {
        return Err(api_error_response(
            ApiError::invalid_param(name, &raw.to_string()).with_request_id(request_id),
        ));
    }
    Ok(raw)
}

pub(crate) async fn pending_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/pending";
    let parsed = match parse_pending_params(&params) {
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
    let limits = state.limits;
    let secret = state.cursor_secret.clone();
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state.store.read(move |conn| {
            caseline_store::list_pending(
                conn,
                parsed.limit,
                parsed.cursor.as_deref(),
                limits,
                &secret,
            )
        }),
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
        Ok(page) => Json(case_page_view(&page.rows, page.next_cursor)).into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/search";
    let query = match parse_search_params(&params) {
        Ok(v) => v,
        Err(e) => {
            let resp = api_error_response(e.with_request_id(&request_id));
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let class = classify_search(&query.filter);
    let Some(_permit) = try_class_permit(&state, class) else {
        let resp = bulkhead_response(&request_id, class_name(class));
        return finish(&state, route, &request_id, started, resp).await;
    };
    let limits = state.limits;
    let secret = state.cursor_secret.clone();
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state
            .store
            .read(move |conn| caseline_store::search_requests(conn, &query, limits, &secret)),
    )
    .await;
    state
        .metrics
        .observe_sqlite_query(class_name(class), sql_started.elapsed())
        .await;
    let result = match outcome {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let resp = match result {
        Ok(page) => Json(case_page_view(&page.rows, page.next_cursor)).into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn create_request_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateRequestBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/requests";
    if is_draining(&state) {
        let resp = draining_response(&request_id);
        return finish(&state, route, &request_id, started, resp).await;
    }
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => {
            let resp = body_error(&request_id, &rejection);
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
        state
            .store
            .write(move |conn| caseline_store::create_request(conn, &draft, Utc::now())),
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
        Ok(record) => (StatusCode::CREATED, Json(CaseView::from(&record))).into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn get_request_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/requests/{id}";
    let id = match path_id(&request_id, "id", raw_id) {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let Some(_permit) = try_class_permit(&state, QueryClass::Cheap) else {
        let resp = bulkhead_response(&request_id, "cheap");
        return finish(&state, route, &request_id, started, resp).await;
    };
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state.store.read(move |conn| {
            let id = RequestId::new(id)?;
            caseline_store::get_request(conn, id)
        }),
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
        Ok(record) => Json(CaseView::from(&record)).into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn request_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
    body: Result<Json<RequestStatusBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/requests/{id}/status";
    if is_draining(&state) {
        let resp = draining_response(&request_id);
        return finish(&state, route, &request_id, started, resp).await;
    }
    let id = match path_id(&request_id, "id", raw_id) {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => {
            let resp = body_error(&request_id, &rejection);
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
            let id = RequestId::new(id)?;
            caseline_store::update_request_status(conn, id, body.status, Utc::now())
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
        Ok(updated) => Json(json!({
            "id": updated.id,
            "case_number": updated.case_number,
            "status": updated.status,
            "updated_at": updated.updated_at,
        }))
        .into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn assign_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
    body: Result<Json<AssignBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/requests/{id}/assign";
    if is_draining(&state) {
        let resp = draining_response(&request_id);
        return finish(&state, route, &request_id, started, resp).await;
    }
    let id = match path_id(&request_id, "id", raw_id) {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => {
            let resp = body_error(&request_id, &rejection);
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let verifier_id = match body.verifier_id() {
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
            let id = RequestId::new(id)?;
            caseline_store::assign_verifier(conn, id, verifier_id, Utc::now())
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
        Ok(updated) => Json(json!({
            "id": updated.id,
            "case_number": updated.case_number,
            "verifier_id": updated.verifier_id,
            "status": updated.status,
        }))
        .into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn file_report_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
    body: Result<Json<FileReportBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/requests/{id}/reports";
    if is_draining(&state) {
        let resp = draining_response(&request_id);
        return finish(&state, route, &request_id, started, resp).await;
    }
    let id = match path_id(&request_id, "id", raw_id) {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => {
            let resp = body_error(&request_id, &rejection);
            return finish(&state, route, &request_id, started, resp).await;
        }
    };
    let draft = match RequestId::new(id)
        .map_err(|_| ApiError::invalid_param("id", &id.to_string()))
        .and_then(|rid| body.into_draft(rid))
    {
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
        state
            .store
            .write(move |conn| caseline_store::file_report(conn, &draft, Utc::now())),
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
        Ok(record) => {
            (StatusCode::CREATED, Json(ReportRecordView::from(&record))).into_response()
        }
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn get_report_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
) -> Response {
    report_by_kind(state, headers, raw_id, None, "/v1/verifications/reports/{id}").await
}

pub(crate) async fn character_report_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
) -> Response {
    report_by_kind(
        state,
        headers,
        raw_id,
        Some(ReportKind::Character),
        "/v1/verifications/character/report/{id}",
    )
    .await
}

pub(crate) async fn education_report_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
) -> Response {
    report_by_kind(
        state,
        headers,
        raw_id,
        Some(ReportKind::Education),
        "/v1/verifications/education/report/{id}",
    )
    .await
}

pub(crate) async fn employment_report_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
) -> Response {
    report_by_kind(
        state,
        headers,
        raw_id,
        Some(ReportKind::Employment),
        "/v1/verifications/employment/report/{id}",
    )
    .await
}

/// Shared read path for report endpoints. The kind-scoped routes 404 when
/// the report exists but is of another kind, so a character URL can never
/// serve an employment record.
async fn report_by_kind(
    state: AppState,
    headers: HeaderMap,
    raw_id: i64,
    expected_kind: Option<ReportKind>,
    route: &'static str,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let id = match path_id(&request_id, "id", raw_id) {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let Some(_permit) = try_class_permit(&state, QueryClass::Cheap) else {
        let resp = bulkhead_response(&request_id, "cheap");
        return finish(&state, route, &request_id, started, resp).await;
    };
    let sql_started = Instant::now();
    let outcome = run_with_deadline(
        state.api.request_timeout,
        &request_id,
        state.store.read(move |conn| {
            let id = ReportId::new(id)?;
            let record = caseline_store::get_report(conn, id)?;
            if let Some(kind) = expected_kind {
                if record.report.kind != kind {
                    return Err(caseline_store::StoreError::NotFound {
                        entity: "report",
                        id: id.get(),
                    });
                }
            }
            Ok(record)
        }),
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
        Ok(record) => Json(ReportRecordView::from(&record)).into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}

pub(crate) async fn report_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<i64>,
    body: Result<Json<ReportStatusBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/v1/verifications/reports/{id}/status";
    if is_draining(&state) {
        let resp = draining_response(&request_id);
        return finish(&state, route, &request_id, started, resp).await;
    }
    let id = match path_id(&request_id, "id", raw_id) {
        Ok(v) => v,
        Err(resp) => return finish(&state, route, &request_id, started, resp).await,
    };
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => {
            let resp = body_error(&request_id, &rejection);
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
            let id = ReportId::new(id)?;
            caseline_store::update_report_status(conn, id, body.status, Utc::now())
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
        Ok(report) => Json(json!({
            "id": report.id,
            "request_id": report.request_id,
            "kind": report.kind,
            "status": report.status,
            "completed_at": report.completed_at,
        }))
        .into_response(),
        Err(err) => exec_error_response(&request_id, &err),
    };
    finish(&state, route, &request_id, started, resp).await
}
