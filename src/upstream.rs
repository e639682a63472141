// ABOUTME: Upstream file API client: metadata resolution and content fetch
// ABOUTME: The bot token stays server-side, embedded only in outbound URLs

use crate::error::{ProxyError, ResolveError};
use axum::http::{header, HeaderValue};
use serde::Deserialize;

/// Fixed user agent for every outbound request
pub const USER_AGENT: &str = concat!("signed-stream-proxy/", env!("CARGO_PKG_VERSION"));

/// getFile response envelope
#[derive(Debug, Deserialize)]
struct GetFileResponse {
    #[serde(default)]
    result: Option<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    api_base: String,
}

impl UpstreamClient {
    pub fn new(api_base: &str) -> std::result::Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve `file_id` to a directly fetchable content location.
    ///
    /// Single attempt, no retries. Errors are stripped of URLs since the
    /// request path carries the bot token.
    pub async fn resolve(&self, bot_token: &str, file_id: &str) -> Result<String, ResolveError> {
        let url = format!("{}/bot{}/getFile", self.api_base, bot_token);

        let response = self
            .http
            .get(&url)
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| ResolveError::NetworkFailure(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::UpstreamRejected(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ResolveError::NetworkFailure(e.without_url()))?;

        let parsed: GetFileResponse =
            serde_json::from_slice(&body).map_err(ResolveError::BadMetadata)?;

        let file_path = parsed
            .result
            .and_then(|r| r.file_path)
            .filter(|p| !p.is_empty())
            .ok_or(ResolveError::NotFound)?;

        Ok(self.content_location(bot_token, &file_path))
    }

    fn content_location(&self, bot_token: &str, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            bot_token,
            file_path.trim_start_matches('/')
        )
    }

    /// GET the content, forwarding the client's Range header verbatim.
    /// Any upstream status is returned as-is for passthrough.
    pub async fn fetch_content(
        &self,
        location: &str,
        range: Option<&HeaderValue>,
    ) -> crate::error::Result<reqwest::Response> {
        let mut request = self.http.get(location);
        if let Some(range) = range {
            request = request.header(header::RANGE, range.clone());
        }
        request
            .send()
            .await
            .map_err(|e| ProxyError::ContentFetch(e.without_url()))
    }
}
