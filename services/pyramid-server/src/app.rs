//! Application router and request handlers.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Extension, Path as UrlPath};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::ServerConfig;

/// Startup-time server errors. Per-request failures never surface here;
/// they become 404 responses.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("served directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Shared request state.
struct AppState {
    data_dir: PathBuf,
}

/// Build the application router for one server instance.
///
/// Fails when the served directory does not exist; everything else about
/// the store is discovered per request.
pub fn build_router(config: &ServerConfig) -> Result<Router, ServerError> {
    config.validate().map_err(ServerError::InvalidConfig)?;

    if !config.data_dir.is_dir() {
        return Err(ServerError::DirectoryNotFound(config.data_dir.clone()));
    }

    let state = Arc::new(AppState {
        data_dir: config.data_dir.clone(),
    });

    let route = format!("{}/*path", config.route_prefix.trim_end_matches('/'));

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(&route, get(file_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(config.cors.layer());

    Ok(router)
}

/// Health check.
async fn health_handler() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": "ok",
            "service": "pyramid-server",
        })
        .to_string(),
    )
        .into_response()
}

/// Serve one file under the store directory.
async fn file_handler(
    Extension(state): Extension<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    let Some(full_path) = resolve_path(&state.data_dir, &path) else {
        debug!(path = %path, "Rejected unsafe request path");
        return not_found();
    };

    match tokio::fs::read(&full_path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&full_path))],
            bytes,
        )
            .into_response(),
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Resolve a request path under the served directory.
///
/// Only plain path components are accepted; anything that could escape the
/// directory resolves to `None`.
fn resolve_path(data_dir: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path);

    let mut resolved = data_dir.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            _ => return None,
        }
    }

    Some(resolved)
}

/// Best-effort content type from the file extension. Zarr chunk files have
/// no extension and are served as raw bytes.
fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("html") => "text/html",
        Some("txt") => "text/plain",
        _ => {
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == ".zmetadata" || n == "zarr.json" || n.starts_with(".z"))
                .unwrap_or(false)
            {
                "application/json"
            } else {
                "application/octet-stream"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_plain() {
        let resolved = resolve_path(Path::new("/srv/data"), "regridded.zarr/0/pr/c/0/0/0");
        assert_eq!(
            resolved,
            Some(PathBuf::from("/srv/data/regridded.zarr/0/pr/c/0/0/0"))
        );
    }

    #[test]
    fn test_resolve_path_rejects_traversal() {
        assert_eq!(resolve_path(Path::new("/srv/data"), "../etc/passwd"), None);
        assert_eq!(resolve_path(Path::new("/srv/data"), "a/../../b"), None);
        assert_eq!(resolve_path(Path::new("/srv/data"), "/absolute"), None);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(
            content_type_for(Path::new("store/.zmetadata")),
            "application/json"
        );
        assert_eq!(
            content_type_for(Path::new("store/0/zarr.json")),
            "application/json"
        );
        assert_eq!(
            content_type_for(Path::new("store/0/pr/c/0/0/0")),
            "application/octet-stream"
        );
    }
}
