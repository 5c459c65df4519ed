// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use caseline_server::{
    build_router, validate_startup_config, ApiConfig, AppState, StoreConfig, StoreHandle,
};
use rand::RngCore;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("CASELINE_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// The cursor secret comes from the environment so cursors survive restarts
/// in multi-replica deployments; a single pod may run with a random one.
fn cursor_secret() -> Vec<u8> {
    if let Ok(raw) = env::var("CASELINE_CURSOR_SECRET") {
        if raw.len() >= 16 {
            return raw.into_bytes();
        }
    }
    let mut secret = vec![0_u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let bind_addr = env::var("CASELINE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let api_cfg = ApiConfig {
        max_body_bytes: env_usize("CASELINE_MAX_BODY_BYTES", 64 * 1024),
        request_timeout: env_duration_ms("CASELINE_REQUEST_TIMEOUT_MS", 5000),
        sql_timeout: env_duration_ms("CASELINE_SQL_TIMEOUT_MS", 800),
        default_page_limit: env_usize("CASELINE_DEFAULT_PAGE_LIMIT", 25),
        max_page_limit: env_usize("CASELINE_MAX_PAGE_LIMIT", 100),
        concurrency_cheap: env_usize("CASELINE_CONCURRENCY_CHEAP", 128),
        concurrency_medium: env_usize("CASELINE_CONCURRENCY_MEDIUM", 64),
        concurrency_heavy: env_usize("CASELINE_CONCURRENCY_HEAVY", 16),
        slow_query_threshold: env_duration_ms("CASELINE_SLOW_QUERY_THRESHOLD_MS", 200),
        shutdown_drain: env_duration_ms("CASELINE_SHUTDOWN_DRAIN_MS", 5000),
    };
    let store_cfg = StoreConfig {
        db_path: PathBuf::from(
            env::var("CASELINE_DB_PATH").unwrap_or_else(|_| "artifacts/caseline.sqlite".to_string()),
        ),
        max_read_connections: env_usize("CASELINE_MAX_READ_CONNECTIONS", 16),
        cursor_secret: cursor_secret(),
    };
    validate_startup_config(&api_cfg, &store_cfg)?;

    if let Some(parent) = store_cfg.db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("create db dir failed: {e}"))?;
    }
    let store = StoreHandle::open(&store_cfg, api_cfg.sql_timeout)
        .map_err(|e| format!("open database failed: {e}"))?;
    info!("database ready at {}", store_cfg.db_path.display());

    let drain = api_cfg.shutdown_drain;
    let state = AppState::new(store, api_cfg, store_cfg.cursor_secret.clone());
    let app = build_router(state.clone());

    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4().map_err(|e| format!("socket v4 failed: {e}"))?
    } else {
        tokio::net::TcpSocket::new_v6().map_err(|e| format!("socket v6 failed: {e}"))?
    };
    socket
        .set_reuseaddr(true)
        .map_err(|e| format!("set_reuseaddr failed: {e}"))?;
    socket.bind(addr).map_err(|e| format!("bind failed: {e}"))?;
    let listener: TcpListener = socket
        .listen(1024)
        .map_err(|e| format!("listen failed: {e}"))?;
    info!("caseline-server listening on {bind_addr}");

    let accepting = state.accepting_requests.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            // Readiness flips first so the balancer stops routing here,
            // then in-flight requests drain.
            accepting.store(false, Ordering::Relaxed);
            tokio::time::sleep(drain).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
