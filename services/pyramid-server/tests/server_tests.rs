//! Tests for the pyramid server HTTP surface.
//!
//! Drives the router directly with `tower::ServiceExt::oneshot`, so each
//! test gets its own independent server instance over a temp directory.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use pyramid_server::{build_router, CorsPolicy, ServerConfig, ServerError};

const ORIGIN: &str = "http://localhost:3000";

fn write_store_fixture(root: &Path) {
    let store = root.join("regridded.zarr");
    std::fs::create_dir_all(store.join("0/pr/c/0/0")).unwrap();
    std::fs::write(
        store.join(".zmetadata"),
        br#"{"zarr_consolidated_format":1,"metadata":{}}"#,
    )
    .unwrap();
    std::fs::write(store.join("0/pr/c/0/0/0"), [1u8, 2, 3, 4]).unwrap();
}

fn test_config(data_dir: &Path) -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".to_string(),
        route_prefix: "/data".to_string(),
        data_dir: data_dir.to_path_buf(),
        cors: CorsPolicy::AllowAny,
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::ORIGIN, ORIGIN)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_serves_existing_file_with_cors() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_store_fixture(temp_dir.path());

    let app = build_router(&test_config(temp_dir.path())).unwrap();
    let response = app
        .oneshot(get_request("/data/regridded.zarr/0/pr/c/0/0/0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], &[1u8, 2, 3, 4]);
}

#[tokio::test]
async fn test_serves_consolidated_metadata_as_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_store_fixture(temp_dir.path());

    let app = build_router(&test_config(temp_dir.path())).unwrap();
    let response = app
        .oneshot(get_request("/data/regridded.zarr/.zmetadata"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_missing_path_is_not_found_with_cors() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_store_fixture(temp_dir.path());

    let app = build_router(&test_config(temp_dir.path())).unwrap();
    let response = app
        .oneshot(get_request("/data/regridded.zarr/9/pr/c/0/0/0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    // CORS headers are present on misses as well.
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_traversal_is_not_found() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_store_fixture(temp_dir.path());
    std::fs::write(temp_dir.path().join("outside.txt"), b"secret").unwrap();

    let config = ServerConfig {
        data_dir: temp_dir.path().join("regridded.zarr"),
        ..test_config(temp_dir.path())
    };

    let app = build_router(&config).unwrap();
    let response = app
        .oneshot(get_request("/data/../outside.txt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_credentialed_cors_for_any_origin() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_store_fixture(temp_dir.path());

    let app = build_router(&test_config(temp_dir.path())).unwrap();
    let response = app
        .oneshot(get_request("/data/regridded.zarr/.zmetadata"))
        .await
        .unwrap();

    // The development posture mirrors the request origin and allows
    // credentialed requests.
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        ORIGIN
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_store_fixture(temp_dir.path());

    let app = build_router(&test_config(temp_dir.path())).unwrap();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_directory_fails_startup() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(&temp_dir.path().join("does-not-exist"));

    let result = build_router(&config);
    assert!(matches!(result, Err(ServerError::DirectoryNotFound(_))));
}
