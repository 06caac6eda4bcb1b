use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tower::ServiceExt;

use gangway::{ServerConfig, build_router, build_state};

fn site() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>home</html>").unwrap();
    dir
}

fn router_with(dir: &TempDir, configure: impl FnOnce(&mut ServerConfig)) -> Router {
    let mut config = ServerConfig::new(dir.path().to_path_buf());
    configure(&mut config);
    let state = build_state(&config, None, None).unwrap();
    build_router(state, &config)
}

async fn get(app: &Router, path: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn security_headers_on_every_response() {
    let dir = site();
    let app = router_with(&dir, |_| {});

    let response = get(&app, "/").await;
    let headers = response.headers();
    assert_eq!(headers.get("x-frame-options").unwrap(), "SAMEORIGIN");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-xss-protection").unwrap(), "1; mode=block");
    assert_eq!(
        headers.get("referrer-policy").unwrap(),
        "strict-origin-when-cross-origin"
    );
    let csp = headers
        .get("content-security-policy")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(csp.contains("default-src 'self'"));
}

#[tokio::test]
async fn health_reports_server_stats() {
    let dir = site();
    let app = router_with(&dir, |_| {});

    // Generate some traffic first so the counters move.
    get(&app, "/").await;
    get(&app, "/").await;

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["uptime"].is_number());
    assert!(body["server"]["requests"].as_u64().unwrap() >= 2);
    assert!(body["system"]["platform"].is_string());
}

#[tokio::test]
async fn health_omits_absent_process_and_tunnel() {
    let dir = site();
    let app = router_with(&dir, |_| {});

    let body = json_body(get(&app, "/health").await).await;
    assert!(body["process"].is_null());
    assert!(body["tunnel"].is_null());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_supervised_process_and_tunnel() {
    use gangway_processes::{RunOptions, Supervisor, direct};
    use gangway_tunnel::TunnelManager;
    use std::sync::Arc;

    let dir = site();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let supervisor = Arc::new(Supervisor::new(tx));
    let options = RunOptions {
        cwd: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    supervisor
        .start(direct("sleep 5", &options).unwrap())
        .expect("start failed");

    let config = ServerConfig::new(dir.path().to_path_buf());
    let state = build_state(
        &config,
        Some(Arc::clone(&supervisor)),
        Some(Arc::new(TunnelManager::new())),
    )
    .unwrap();
    let app = build_router(state, &config);

    let body = json_body(get(&app, "/health").await).await;
    assert_eq!(body["process"]["running"], true);
    assert_eq!(body["process"]["state"], "running");
    assert_eq!(body["process"]["command"], "sleep 5");
    // Tunnel handle present but no session open.
    assert!(body["tunnel"]["provider"].is_null());
    assert!(body["tunnel"]["url"].is_null());

    supervisor.stop();
}

#[tokio::test]
async fn health_alias_route_matches() {
    let dir = site();
    let app = router_with(&dir, |_| {});

    let response = get(&app, "/_health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn rate_limit_rejects_after_the_window_fills() {
    let dir = site();
    let app = router_with(&dir, |config| config.rate_limit = true);

    for _ in 0..100 {
        let response = get(&app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = get(&app, "/").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn rate_limit_is_tracked_per_client() {
    let dir = site();
    let app = router_with(&dir, |config| config.rate_limit = true);

    for _ in 0..101 {
        get(&app, "/").await;
    }
    // A request carrying a distinct client address still gets through.
    let request = Request::get("/")
        .header("x-forwarded-for", "10.0.0.9")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_stores_the_file_and_reports_it() {
    let dir = site();
    let app = router_with(&dir, |config| config.upload = true);

    let boundary = "test-boundary-7f3a";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         hello upload\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(payload))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["file"]["originalname"], "notes.txt");
    assert_eq!(body["file"]["size"], 12);

    let stored_name = body["file"]["filename"].as_str().unwrap();
    assert!(stored_name.starts_with("file-"));
    assert!(stored_name.ends_with(".txt"));
    let stored = dir.path().join("uploads").join(stored_name);
    assert_eq!(std::fs::read_to_string(stored).unwrap(), "hello upload");
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let dir = site();
    let app = router_with(&dir, |config| config.upload = true);

    let boundary = "test-boundary-7f3a";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"other\"\r\n\r\n\
         nothing here\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(payload))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn upload_route_is_absent_when_disabled() {
    let dir = site();
    let app = router_with(&dir, |_| {});

    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn request_log_writes_json_lines() {
    let dir = site();
    let log_path = dir.path().join("access.log");
    let app = router_with(&dir, |config| config.log_file = Some(log_path.clone()));

    get(&app, "/").await;
    get(&app, "/health").await;

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["method"], "GET");
    assert_eq!(first["path"], "/");
}
