// ABOUTME: In-process stand-in for the upstream file API used by tests
// ABOUTME: Serves getFile metadata and file content on a loopback port

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const MOCK_TOKEN: &str = "123:abc";
pub const FULL_BODY: &[u8] = b"0123456789";

#[derive(Clone, Default)]
struct Hits {
    metadata: Arc<AtomicUsize>,
    content: Arc<AtomicUsize>,
}

pub struct MockUpstream {
    pub base: String,
    pub metadata_hits: Arc<AtomicUsize>,
    pub content_hits: Arc<AtomicUsize>,
}

#[derive(Deserialize)]
struct GetFileQuery {
    file_id: String,
}

pub async fn spawn() -> MockUpstream {
    let hits = Hits::default();
    let app = Router::new()
        .route("/:bot/getFile", get(get_file))
        .route("/file/:bot/*path", get(get_content))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream {
        base: format!("http://{}", addr),
        metadata_hits: hits.metadata,
        content_hits: hits.content,
    }
}

/// Base URL of a port nothing listens on
pub async fn closed_base() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn get_file(
    State(hits): State<Hits>,
    Path(bot): Path<String>,
    Query(query): Query<GetFileQuery>,
) -> Response {
    hits.metadata.fetch_add(1, Ordering::SeqCst);

    if bot != format!("bot{}", MOCK_TOKEN) {
        return (StatusCode::UNAUTHORIZED, r#"{"ok":false}"#).into_response();
    }

    match query.file_id.as_str() {
        "missing" => {
            let body = r#"{"ok":true,"result":{"file_id":"missing"}}"#;
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        "garbled" => "<html>gateway hiccup</html>".into_response(),
        id => {
            let body = serde_json::json!({
                "ok": true,
                "result": { "file_id": id, "file_path": format!("videos/{}.mp4", id) }
            });
            ([(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
        }
    }
}

async fn get_content(
    State(hits): State<Hits>,
    Path(params): Path<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    hits.content.fetch_add(1, Ordering::SeqCst);

    if params.get("bot").map(String::as_str) != Some(format!("bot{}", MOCK_TOKEN).as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let path = params.get("path").cloned().unwrap_or_default();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // Panicking drops the connection before any response bytes are written
    if path.contains("vanished") {
        panic!("content node vanished");
    }

    if path.contains("broken") {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"01")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone")),
        ];
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "video/mp4")
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();
    }

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::SET_COOKIE, "upstream_session=1")
        .header("x-upstream-internal", "node-7")
        .header("x-seen-user-agent", user_agent);

    match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some("bytes=0-3") => {
            builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, "bytes 0-3/10")
                .header(header::CONTENT_LENGTH, "4");
            builder
                .body(Body::from(Bytes::copy_from_slice(&FULL_BODY[..4])))
                .unwrap()
        }
        Some(_) => builder
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, "bytes */10")
            .body(Body::empty())
            .unwrap(),
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, FULL_BODY.len().to_string())
            .body(Body::from(Bytes::from_static(FULL_BODY)))
            .unwrap(),
    }
}
