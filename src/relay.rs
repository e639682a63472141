// ABOUTME: Stream relay from the upstream content response to the client
// ABOUTME: Header allow-listing, chunked forwarding, throttling and disconnect handling

use crate::admission::AdmissionSlot;
use crate::throttle::Throttle;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use std::fmt::Display;
use std::io;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// Marker added to every relayed response
pub const PROXY_HEADER: HeaderName = HeaderName::from_static("x-proxied-by");
pub const PROXY_HEADER_VALUE: &str = "signed-stream-proxy";

/// Upstream response headers that reach the client. Everything else is dropped.
pub const FORWARDED_HEADERS: [HeaderName; 7] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::CONTENT_DISPOSITION,
    header::CACHE_CONTROL,
    header::LAST_MODIFIED,
];

/// How a relay loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    UpstreamError,
    ClientGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub outcome: RelayOutcome,
    pub bytes: u64,
}

pub fn forward_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in FORWARDED_HEADERS.iter() {
        for value in upstream.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(PROXY_HEADER, HeaderValue::from_static(PROXY_HEADER_VALUE));
    headers
}

/// Build the client response for an upstream content response.
///
/// Status passes through unchanged. The body is fed by a spawned pump task
/// which owns `slot`, so the slot is released when the pump ends for any reason.
pub fn relay(
    upstream: reqwest::Response,
    throttle: Option<Throttle>,
    slot: AdmissionSlot,
    file_id: String,
) -> Response {
    let status = upstream.status();
    let headers = forward_headers(upstream.headers());

    // One in-flight chunk per stream
    let (tx, rx) = mpsc::channel(1);
    let chunks = upstream.bytes_stream().map_err(|e| e.without_url());
    tokio::spawn(async move {
        let report = pump(chunks, tx, throttle, slot).await;
        info!(
            "Stream {} ended: {:?} after {} bytes",
            file_id, report.outcome, report.bytes
        );
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Forward chunks in upstream order until completion, upstream failure, or
/// client disconnect. The slot is dropped before the body channel closes.
///
/// An upstream failure is passed on as a body error so the connection is
/// aborted instead of ending like a complete response.
pub async fn pump<S, E>(
    upstream: S,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    mut throttle: Option<Throttle>,
    slot: AdmissionSlot,
) -> RelayReport
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut bytes = 0u64;

    let outcome = loop {
        let chunk = match upstream.next().await {
            None => break RelayOutcome::Completed,
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                warn!("Upstream read failed after {} bytes: {}", bytes, e);
                break RelayOutcome::UpstreamError;
            }
        };

        let len = chunk.len();
        if tx.send(Ok(chunk)).await.is_err() || tx.is_closed() {
            break RelayOutcome::ClientGone;
        }
        bytes += len as u64;

        if let Some(throttle) = throttle.as_mut() {
            tokio::select! {
                _ = throttle.consume(len) => {}
                _ = tx.closed() => break RelayOutcome::ClientGone,
            }
        }
    };

    drop(slot);
    if outcome == RelayOutcome::UpstreamError {
        let _ = tx
            .send(Err(io::Error::new(io::ErrorKind::Other, "upstream read failed")))
            .await;
    }
    RelayReport { outcome, bytes }
}
