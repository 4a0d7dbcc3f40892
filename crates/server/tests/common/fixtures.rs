//! Test fixtures: zip archives and request helpers.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use tower::ServiceExt;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Secret whose digest is `AdminConfig::for_testing().token_hash`.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A minimal valid site.
#[allow(dead_code)]
pub const INDEX_HTML: &[u8] = b"<!doctype html><title>hi</title><h1>hello</h1>\n";

/// Build an in-memory zip from `(name, contents)` pairs.
#[allow(dead_code)]
pub fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A one-page site archive.
#[allow(dead_code)]
pub fn simple_site() -> Vec<u8> {
    build_zip(&[("index.html", INDEX_HTML), ("style.css", b"h1{color:red}")])
}

/// Compute SHA-256 hash of data as hex string.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    send(router, builder.body(body).unwrap()).await
}

/// POST a raw zip body to /v1/sites.
#[allow(dead_code)]
pub async fn upload_raw(
    router: &axum::Router,
    token: &str,
    filename: &str,
    content_type: &str,
    bytes: Vec<u8>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/sites")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", content_type)
        .header("Content-Length", bytes.len())
        .header("X-Filename", filename)
        .body(Body::from(bytes))
        .unwrap();
    send(router, request).await
}

/// POST a zip as a `file` field of a multipart form to /v1/sites.
#[allow(dead_code)]
pub async fn upload_multipart(
    router: &axum::Router,
    token: &str,
    filename: &str,
    bytes: &[u8],
) -> (StatusCode, Value) {
    let boundary = "plinth-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/zip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/sites")
        .header("Authorization", format!("Bearer {}", token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(router, request).await
}
