//! Hash-based SPA routing: non-root paths are 302-redirected to `/#<path>`
//! so the client router takes over after the index loads.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpaMode {
    #[default]
    Off,
    /// Redirect every non-root GET/HEAD path, assets included.
    All,
    /// Redirect only extension-less paths; asset requests are served.
    IgnoreAssets,
}

pub async fn spa_redirect(mode: SpaMode, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let applies = mode != SpaMode::Off
        && matches!(*request.method(), Method::GET | Method::HEAD)
        && path != "/"
        && (mode == SpaMode::All || !has_extension(path));

    if applies {
        let location = format!("/#{path}");
        if let Ok(response) = Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, location)
            .body(Body::empty())
        {
            return response;
        }
    }
    next.run(request).await
}

fn has_extension(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|segment| segment.contains('.'))
}
