// SPDX-License-Identifier: Apache-2.0

use caseline_server::{
    build_router, validate_startup_config, ApiConfig, AppState, StoreConfig, StoreHandle,
};
use serde_json::Value;
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn spawn_server_with_state() -> (std::net::SocketAddr, AppState, TempDir) {
    let dir = tempdir().expect("tempdir");
    let store_cfg = StoreConfig {
        db_path: dir.path().join("caseline.sqlite"),
        max_read_connections: 4,
        cursor_secret: vec![9; 32],
    };
    let api_cfg = ApiConfig::default();
    validate_startup_config(&api_cfg, &store_cfg).expect("startup config");
    let store = StoreHandle::open(&store_cfg, api_cfg.sql_timeout).expect("open store");
    let state = AppState::new(store, api_cfg, store_cfg.cursor_secret.clone());
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    (addr, state, dir)
}

async fn spawn_server() -> (std::net::SocketAddr, TempDir) {
    let (addr, _state, dir) = spawn_server_with_state().await;
    (addr, dir)
}

async fn send_raw(
    addr: std::net::SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    if let Some(body) = body {
        req.push_str("Content-Type: application/json\r\n");
        req.push_str(&format!("Content-Length: {}\r\n", body.len()));
        req.push_str("\r\n");
        req.push_str(body);
    } else {
        req.push_str("\r\n");
    }
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

async fn get(addr: std::net::SocketAddr, path: &str) -> (u16, String, String) {
    send_raw(addr, "GET", path, &[], None).await
}

async fn post_json(addr: std::net::SocketAddr, path: &str, body: &str) -> (u16, String, String) {
    send_raw(addr, "POST", path, &[], Some(body)).await
}

fn json_body(body: &str) -> Value {
    serde_json::from_str(body).expect("json body")
}

fn error_code(body: &str) -> String {
    json_body(body)
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .expect("error code")
        .to_string()
}

#[tokio::test]
async fn case_lifecycle_end_to_end() {
    let (addr, _dir) = spawn_server().await;

    let (status, _, body) = post_json(
        addr,
        "/v1/verifiers",
        r#"{"name": "A. Kulkarni", "email": "ak@example.org"}"#,
    )
    .await;
    assert_eq!(status, 201);
    let verifier_id = json_body(&body)
        .get("id")
        .and_then(Value::as_i64)
        .expect("verifier id");

    let (status, _, body) = post_json(
        addr,
        "/v1/verifications/requests",
        r#"{"employee": {"name": "S. Nair", "email": "sn@example.org"}, "report_kinds": ["character"]}"#,
    )
    .await;
    assert_eq!(status, 201);
    let case = json_body(&body);
    assert_eq!(case["case_number"], "VR-000001");
    assert_eq!(case["status"], "received");
    let case_id = case.get("id").and_then(Value::as_i64).expect("case id");
    let reports = case.get("reports").and_then(Value::as_array).expect("reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["kind"], "character");
    assert_eq!(reports[0]["status"], "pending");
    let report_id = reports[0]
        .get("id")
        .and_then(Value::as_i64)
        .expect("report id");

    let (status, _, body) = get(addr, &format!("/v1/verifications/requests/{case_id}")).await;
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["case_number"], "VR-000001");

    let (status, _, body) = post_json(
        addr,
        &format!("/v1/verifications/requests/{case_id}/assign"),
        &format!(r#"{{"verifier_id": {verifier_id}}}"#),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(
        json_body(&body).get("verifier_id").and_then(Value::as_i64),
        Some(verifier_id)
    );

    let (status, _, _) = post_json(
        addr,
        &format!("/v1/verifications/requests/{case_id}/status"),
        r#"{"status": "in_progress"}"#,
    )
    .await;
    assert_eq!(status, 200);

    let (status, _, body) = post_json(
        addr,
        &format!("/v1/verifications/requests/{case_id}/reports"),
        r#"{"detail": {"kind": "character", "address": "12 MG Road", "police_station": "Shivajinagar", "remarks_source": null}, "remarks": "clean record"}"#,
    )
    .await;
    assert_eq!(status, 201);
    let filed = json_body(&body);
    assert_eq!(filed["report"]["kind"], "character");
    assert_eq!(filed["detail"]["address"], "12 MG Road");

    // The kind-scoped route serves only its own kind.
    let (status, _, body) = get(
        addr,
        &format!("/v1/verifications/character/report/{report_id}"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["detail"]["kind"], "character");
    let (status, _, body) = get(
        addr,
        &format!("/v1/verifications/education/report/{report_id}"),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "NotFound");

    for next in ["in_progress", "completed"] {
        let (status, _, _) = post_json(
            addr,
            &format!("/v1/verifications/reports/{report_id}/status"),
            &format!(r#"{{"status": "{next}"}}"#),
        )
        .await;
        assert_eq!(status, 200);
    }
    let (status, _, body) = get(addr, &format!("/v1/verifications/reports/{report_id}")).await;
    assert_eq!(status, 200);
    let record = json_body(&body);
    assert_eq!(record["report"]["status"], "completed");
    assert!(record["report"].get("completed_at").is_some());

    let (status, _, body) = post_json(
        addr,
        &format!("/v1/verifications/requests/{case_id}/status"),
        r#"{"status": "completed"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["status"], "completed");

    let (status, _, body) = get(addr, &format!("/v1/verifiers/{verifier_id}/workload")).await;
    assert_eq!(status, 200);
    let workload = json_body(&body);
    assert_eq!(workload["completed"], 1);
    assert_eq!(workload["in_progress"], 0);
}

#[tokio::test]
async fn completion_is_gated_on_reports() {
    let (addr, _dir) = spawn_server().await;
    let (status, _, body) = post_json(
        addr,
        "/v1/verifications/requests",
        r#"{"employee": {"name": "R. Iyer"}, "report_kinds": ["education", "employment"]}"#,
    )
    .await;
    assert_eq!(status, 201);
    let case_id = json_body(&body)
        .get("id")
        .and_then(Value::as_i64)
        .expect("case id");

    let (status, _, _) = post_json(
        addr,
        &format!("/v1/verifications/requests/{case_id}/status"),
        r#"{"status": "in_progress"}"#,
    )
    .await;
    assert_eq!(status, 200);

    // Two reports are still pending, so the case cannot complete.
    let (status, _, body) = post_json(
        addr,
        &format!("/v1/verifications/requests/{case_id}/status"),
        r#"{"status": "completed"}"#,
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(error_code(&body), "Conflict");
}

#[tokio::test]
async fn pending_queue_pages_oldest_first() {
    let (addr, _dir) = spawn_server().await;
    for name in ["One", "Two", "Three"] {
        let (status, _, _) = post_json(
            addr,
            "/v1/verifications/requests",
            &format!(r#"{{"employee": {{"name": "{name}"}}, "report_kinds": ["character"]}}"#),
        )
        .await;
        assert_eq!(status, 201);
    }

    let (status, _, body) = get(addr, "/v1/verifications/pending?limit=2").await;
    assert_eq!(status, 200);
    let page = json_body(&body);
    let rows = page.get("rows").and_then(Value::as_array).expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["case_number"], "VR-000001");
    assert_eq!(rows[1]["case_number"], "VR-000002");
    let cursor = page["page"]["next_cursor"]
        .as_str()
        .expect("next cursor")
        .to_string();

    let (status, _, body) = get(
        addr,
        &format!("/v1/verifications/pending?limit=2&cursor={cursor}"),
    )
    .await;
    assert_eq!(status, 200);
    let page = json_body(&body);
    let rows = page.get("rows").and_then(Value::as_array).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["case_number"], "VR-000003");
    assert!(page["page"]["next_cursor"].is_null());
}

#[tokio::test]
async fn search_filters_and_error_taxonomy() {
    let (addr, _dir) = spawn_server().await;
    for name in ["Asha Menon", "Arun Mehta"] {
        let (status, _, _) = post_json(
            addr,
            "/v1/verifications/requests",
            &format!(r#"{{"employee": {{"name": "{name}"}}, "report_kinds": ["character"]}}"#),
        )
        .await;
        assert_eq!(status, 201);
    }

    let (status, _, body) = get(addr, "/v1/verifications/search?case_number=VR-000001").await;
    assert_eq!(status, 200);
    let page = json_body(&body);
    assert_eq!(page["api_version"], "v1");
    let rows = page.get("rows").and_then(Value::as_array).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["employee_name"], "Asha Menon");

    let (status, _, body) = get(addr, "/v1/verifications/search?name_prefix=A").await;
    assert_eq!(status, 200);
    let rows = json_body(&body)["rows"].as_array().expect("rows").len();
    assert_eq!(rows, 2);

    let (status, _, body) = get(addr, "/v1/verifications/search?bogus=1").await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "InvalidQueryParameter");

    let (status, _, body) = get(addr, "/v1/verifications/search?cursor=bad.cursor").await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "InvalidCursor");

    // A cursor minted for one query must not work for another.
    let (status, _, body) = get(addr, "/v1/verifications/search?status=received&limit=1").await;
    assert_eq!(status, 200);
    let cursor = json_body(&body)["page"]["next_cursor"]
        .as_str()
        .expect("cursor")
        .to_string();
    let (status, _, body) = get(
        addr,
        &format!("/v1/verifications/search?status=closed&limit=1&cursor={cursor}"),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "InvalidCursor");

    let (status, _, body) = get(addr, "/v1/verifications/requests/9999").await;
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "NotFound");

    // Illegal transition surfaces as a designed conflict, never raw backend text.
    let (status, _, body) = post_json(
        addr,
        "/v1/verifications/requests/1/status",
        r#"{"status": "closed"}"#,
    )
    .await;
    assert_eq!(status, 409);
    let err = json_body(&body);
    assert_eq!(err["error"]["code"], "Conflict");
    let message = err["error"]["message"].as_str().expect("message");
    assert!(!message.to_lowercase().contains("sqlite"));
    assert!(!message.to_lowercase().contains("constraint"));
}

#[tokio::test]
async fn duplicate_verifier_email_conflicts() {
    let (addr, _dir) = spawn_server().await;
    let body = r#"{"name": "A. Kulkarni", "email": "ak@example.org"}"#;
    let (status, _, _) = post_json(addr, "/v1/verifiers", body).await;
    assert_eq!(status, 201);
    let (status, _, resp) = post_json(addr, "/v1/verifiers", body).await;
    assert_eq!(status, 409);
    let err = json_body(&resp);
    assert_eq!(err["error"]["code"], "Conflict");
    assert!(!err["error"]["message"]
        .as_str()
        .expect("message")
        .to_lowercase()
        .contains("unique"));
}

#[tokio::test]
async fn health_version_and_metrics_surface() {
    let (addr, _dir) = spawn_server().await;

    let (status, _, _) = get(addr, "/healthz").await;
    assert_eq!(status, 200);
    let (status, _, _) = get(addr, "/readyz").await;
    assert_eq!(status, 200);

    let (status, _, body) = get(addr, "/v1/version").await;
    assert_eq!(status, 200);
    let version = json_body(&body);
    assert_eq!(version["api_version"], "v1");
    assert_eq!(version["server"]["crate"], "caseline-server");

    let (status, headers, _) = send_raw(
        addr,
        "GET",
        "/v1/verifiers",
        &[("x-request-id", "probe-42")],
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(headers.contains("x-request-id: probe-42"));

    let (status, _, _) = post_json(
        addr,
        "/v1/verifications/requests",
        r#"{"employee": {"name": "M. Das"}, "report_kinds": ["character"]}"#,
    )
    .await;
    assert_eq!(status, 201);

    let (status, _, body) = get(addr, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("caseline_ready{subsystem=\"caseline\"} 1"));
    assert!(body.contains("case_status=\"received\"} 1"));
    assert!(body.contains("http_requests_total"));
    // The verifier list above is a read, the request creation a write; both
    // must show up in the store latency gauges.
    assert!(body.contains("caseline_sqlite_query_latency_p95_seconds"));
    assert!(body.contains("query_class=\"cheap\""));
    assert!(body.contains("query_class=\"write\""));
}

#[tokio::test]
async fn drain_refuses_writes_but_keeps_serving_reads() {
    let (addr, state, _dir) = spawn_server_with_state().await;
    let (status, _, _) = post_json(
        addr,
        "/v1/verifications/requests",
        r#"{"employee": {"name": "P. Shah"}, "report_kinds": ["character"]}"#,
    )
    .await;
    assert_eq!(status, 201);

    state
        .accepting_requests
        .store(false, std::sync::atomic::Ordering::Relaxed);

    let (status, _, _) = get(addr, "/readyz").await;
    assert_eq!(status, 503);

    // In-flight consumers can still read while the balancer rotates us out.
    let (status, _, _) = get(addr, "/v1/verifications/pending").await;
    assert_eq!(status, 200);
    let (status, _, _) = get(addr, "/v1/verifications/search?name_prefix=P").await;
    assert_eq!(status, 200);
    let (status, _, _) = get(addr, "/v1/verifications/requests/1").await;
    assert_eq!(status, 200);
    let (status, _, _) = get(addr, "/v1/verifiers").await;
    assert_eq!(status, 200);

    // Mutations are refused uniformly.
    let (status, _, body) = post_json(
        addr,
        "/v1/verifiers",
        r#"{"name": "B. Rao", "email": "br@example.org"}"#,
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(error_code(&body), "ServiceUnavailable");
    let (status, _, body) = post_json(
        addr,
        "/v1/verifications/requests/1/status",
        r#"{"status": "in_progress"}"#,
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(error_code(&body), "ServiceUnavailable");
}
