// ABOUTME: Environment configuration for the stream proxy
// ABOUTME: Read once at startup; secrets are validated per request

use std::env;

pub const DEFAULT_MAX_CONCURRENT_STREAMS: usize = 10;
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct Config {
    /// Service credential for the upstream API (never sent to clients)
    pub bot_token: Option<String>,
    /// Shared HMAC secret used to verify signed links
    pub signing_secret: Option<String>,
    /// Admission ceiling for this process
    pub max_concurrent_streams: usize,
    /// Default throttle rate, 0 disables throttling
    pub throttle_bytes_per_sec: u64,
    /// Base URL of the upstream API
    pub api_base: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bot_token: non_empty(env::var("BOT_TOKEN").ok()),
            signing_secret: non_empty(env::var("SIGNING_SECRET").ok()),
            max_concurrent_streams: env::var("MAX_CONCURRENT_STREAMS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT_STREAMS),
            throttle_bytes_per_sec: env::var("THROTTLE_BYTES_PER_SEC")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            api_base: env::var("UPSTREAM_API_BASE")
                .ok()
                .map(|v| v.trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        }
    }

    /// Returns `(signing_secret, bot_token)` when both are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.signing_secret, &self.bot_token) {
            (Some(secret), Some(token)) => Some((secret.as_str(), token.as_str())),
            _ => None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
