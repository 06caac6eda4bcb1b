//! The axum router: static file service, health endpoint, upload route, and
//! the middleware stack.

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tower_http::services::ServeDir;

use gangway_processes::Supervisor;
use gangway_tunnel::TunnelManager;

use crate::middleware::security::security_headers;
use crate::middleware::spa::spa_redirect;
use crate::middleware::upload::{MAX_UPLOAD_BYTES, handle_upload};
use crate::middleware::{
    PerformanceTracker, RateLimiter, RequestHistory, RequestLog, RequestLogEntry, client_ip,
    history::RequestRecord,
};

pub use crate::middleware::spa::SpaMode;

/// What to serve and which middleware to enable.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub spa: SpaMode,
    pub rate_limit: bool,
    pub upload: bool,
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            spa: SpaMode::Off,
            rate_limit: false,
            upload: false,
            log_file: None,
        }
    }
}

/// Shared per-server state: counters, history, and the optional middleware
/// collaborators.
pub struct ServerState {
    pub started_at: DateTime<Utc>,
    start: Instant,
    request_count: AtomicU64,
    pub history: RequestHistory,
    pub performance: PerformanceTracker,
    pub rate_limiter: Option<RateLimiter>,
    pub request_log: Option<RequestLog>,
    pub upload_dir: PathBuf,
    pub supervisor: Option<Arc<Supervisor>>,
    pub tunnel: Option<Arc<TunnelManager>>,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

/// Assemble the shared server state. The supervisor and tunnel handles are
/// optional; when present the health endpoint reports their status.
pub fn build_state(
    config: &ServerConfig,
    supervisor: Option<Arc<Supervisor>>,
    tunnel: Option<Arc<TunnelManager>>,
) -> std::io::Result<SharedState> {
    let request_log = config
        .log_file
        .as_ref()
        .map(|path| RequestLog::open(path.clone()))
        .transpose()?;

    Ok(Arc::new(ServerState {
        started_at: Utc::now(),
        start: Instant::now(),
        request_count: AtomicU64::new(0),
        history: RequestHistory::new(),
        performance: PerformanceTracker::new(),
        rate_limiter: config.rate_limit.then(RateLimiter::default),
        request_log,
        upload_dir: config.root.join("uploads"),
        supervisor,
        tunnel,
    }))
}

pub fn build_router(state: SharedState, config: &ServerConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/_health", get(health));

    if config.upload {
        app = app.route(
            "/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        );
    }

    let mut app =
        app.fallback_service(ServeDir::new(&config.root).append_index_html_on_directories(true));

    // Layer order (outermost first at request time): security headers,
    // request tracking, rate limiting, SPA redirect, then routing.
    let spa_mode = config.spa;
    app = app.layer(axum_middleware::from_fn(move |request, next| {
        spa_redirect(spa_mode, request, next)
    }));
    if config.rate_limit {
        app = app.layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit,
        ));
    }
    app = app.layer(axum_middleware::from_fn_with_state(
        state.clone(),
        track_requests,
    ));
    app = app.layer(axum_middleware::from_fn(security_headers));

    app.with_state(state)
}

async fn rate_limit(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let ip = client_ip(&request);
        if !limiter.check(&ip) {
            return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
        }
    }
    next.run(request).await
}

/// Count, time, and record every request; feed the optional file log.
async fn track_requests(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let ip = client_ip(&request);
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    state.request_count.fetch_add(1, Ordering::Relaxed);
    let response = next.run(request).await;

    let duration = start.elapsed();
    let duration_ms = duration.as_millis() as u64;
    let status = response.status().as_u16();

    state.performance.record(&path, duration);
    state.history.record(RequestRecord {
        timestamp: Utc::now(),
        method: method.clone(),
        path: path.clone(),
        status,
        duration_ms,
        ip: ip.clone(),
    });
    if let Some(log) = &state.request_log {
        log.write(&RequestLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            method,
            path,
            status,
            duration_ms,
            ip,
            user_agent,
        });
    }

    response
}

async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let uptime = state.start.elapsed().as_secs_f64();
    Json(json!({
        "status": "healthy",
        "uptime": (uptime * 100.0).round() / 100.0,
        "timestamp": Utc::now().to_rfc3339(),
        "server": {
            "requests": state.request_count(),
            "history": state.history.len(),
            "slow_requests": state.performance.slow_requests().len(),
        },
        "system": {
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "cpus": std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        },
        "process": state.supervisor.as_ref().map(|supervisor| json!({
            "running": supervisor.is_running(),
            "state": supervisor.state().map(|s| format!("{s:?}").to_lowercase()),
            "command": supervisor.current_command(),
        })),
        "tunnel": state.tunnel.as_ref().map(|tunnel| json!({
            "provider": tunnel.provider().map(|p| p.name()),
            "url": tunnel.url(),
        })),
    }))
}
