// ABOUTME: Request orchestration for GET /stream and the service router
// ABOUTME: Params -> expiry -> signature -> admission -> resolve -> relay

use crate::admission::Admission;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::relay::{self, FORWARDED_HEADERS, PROXY_HEADER};
use crate::throttle::Throttle;
use crate::token;
use crate::upstream::UpstreamClient;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing::{error, info, warn};

// App state shared across handlers
pub struct AppState {
    pub config: Config,
    pub admission: Arc<Admission>,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: Config) -> std::result::Result<Self, reqwest::Error> {
        let upstream = UpstreamClient::new(&config.api_base)?;
        let admission = Admission::new(config.max_concurrent_streams);
        Ok(Self {
            config,
            admission,
            upstream,
        })
    }
}

/// Query parameters of a signed link
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    file_id: Option<String>,
    expires: Option<String>,
    sig: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut exposed = FORWARDED_HEADERS.to_vec();
    exposed.push(PROXY_HEADER);

    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::RANGE])
        .expose_headers(exposed)
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/stream", get(handle_stream))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn handle_stream(
    State(state): State<Arc<AppState>>,
    params: Option<Query<StreamParams>>,
    headers: HeaderMap,
) -> Response {
    let params = params.map(|Query(p)| p).unwrap_or_default();

    match stream(&state, params, &headers).await {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                error!("Stream request failed: {}", e);
            } else {
                warn!("Stream request rejected: {}", e);
            }
            e.into_response()
        }
    }
}

async fn stream(state: &AppState, params: StreamParams, headers: &HeaderMap) -> Result<Response> {
    let (file_id, expires, sig) = match (
        present(params.file_id),
        present(params.expires),
        present(params.sig),
    ) {
        (Some(file_id), Some(expires), Some(sig)) => (file_id, expires, sig),
        _ => return Err(ProxyError::MissingParams),
    };

    let (secret, bot_token) = state.config.credentials().ok_or(ProxyError::Misconfigured)?;

    // Cheaper check first
    if token::is_expired(&expires) {
        return Err(ProxyError::Expired);
    }
    if !token::verify(&file_id, &expires, &sig, secret) {
        return Err(ProxyError::InvalidSignature);
    }

    // Held from here on; dropped on every early return below
    let slot = state
        .admission
        .acquire_slot()
        .ok_or(ProxyError::TooManyStreams)?;
    info!(
        "Stream {} admitted ({}/{})",
        file_id,
        state.admission.in_flight(),
        state.admission.max()
    );

    let location = state.upstream.resolve(bot_token, &file_id).await?;

    let range = headers.get(header::RANGE);
    let upstream = state.upstream.fetch_content(&location, range).await?;
    info!(
        "Stream {} upstream status {} (range: {})",
        file_id,
        upstream.status(),
        range.and_then(|r| r.to_str().ok()).unwrap_or("none")
    );

    let throttle = Throttle::new(state.config.throttle_bytes_per_sec);
    Ok(relay::relay(upstream, throttle, slot, file_id))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "in_flight": state.admission.in_flight(),
        "max_concurrent": state.admission.max(),
    }))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);
    ProxyError::Internal(detail.to_string()).into_response()
}
