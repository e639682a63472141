// ABOUTME: Error types for the stream proxy
// ABOUTME: Maps each failure to a status code and a short plain-text body

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures of the metadata call that resolves a file id to a content location
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("metadata request failed: {0}")]
    NetworkFailure(#[source] reqwest::Error),
    #[error("metadata request rejected with status {0}")]
    UpstreamRejected(StatusCode),
    #[error("metadata response unparseable: {0}")]
    BadMetadata(#[source] serde_json::Error),
    #[error("metadata response has no file path")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing params")]
    MissingParams,
    #[error("server misconfigured")]
    Misconfigured,
    #[error("url expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("too many concurrent streams")]
    TooManyStreams,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("content request failed: {0}")]
    ContentFetch(#[source] reqwest::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingParams => StatusCode::BAD_REQUEST,
            ProxyError::Misconfigured | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Expired | ProxyError::InvalidSignature => StatusCode::FORBIDDEN,
            ProxyError::TooManyStreams => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Resolve(ResolveError::NotFound) => StatusCode::NOT_FOUND,
            ProxyError::Resolve(_) | ProxyError::ContentFetch(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Client-facing body. Never includes upstream details.
    pub fn message(&self) -> &'static str {
        match self {
            ProxyError::MissingParams => "missing params",
            ProxyError::Misconfigured => "server misconfigured",
            ProxyError::Expired => "url expired",
            ProxyError::InvalidSignature => "invalid signature",
            ProxyError::TooManyStreams => "too many concurrent streams",
            ProxyError::Resolve(ResolveError::NotFound) => "file not found",
            ProxyError::Resolve(ResolveError::BadMetadata(_)) => "metadata parse failed",
            ProxyError::Resolve(_) => "metadata fetch failed",
            ProxyError::ContentFetch(_) => "content fetch failed",
            ProxyError::Internal(_) => "internal error",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message(),
        )
            .into_response()
    }
}
