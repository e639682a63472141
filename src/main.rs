// ABOUTME: Entry point for the signed-URL streaming proxy
// ABOUTME: Serves GET /stream over HTTP/1 and HTTP/2 with hyper's auto builder

mod admission;
mod config;
mod error;
mod handler;
#[cfg(test)]
mod mock_upstream;
mod relay;
mod throttle;
mod token;
mod upstream;

use crate::config::Config;
use crate::handler::{router, AppState};
use anyhow::{anyhow, Result};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::sync::Arc;
use tower::Service;
use tracing::{error, info, warn};

/// Validity of links printed by `sign` when no ttl is given
const DEFAULT_LINK_TTL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signed_stream_proxy=info".parse()?),
        )
        .init();

    let config = Config::from_env();
    let port = config.port;

    // `sign <file_id> [ttl_secs]` prints a signed query string and exits
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("sign") {
        return print_signed_query(&config, &args[1..]);
    }

    if config.credentials().is_none() {
        warn!("BOT_TOKEN or SIGNING_SECRET not set; stream requests will fail with 500");
    }
    info!(
        "Admission ceiling {} streams, throttle {}",
        config.max_concurrent_streams,
        match config.throttle_bytes_per_sec {
            0 => "disabled".to_string(),
            rate => format!("{} B/s", rate),
        }
    );

    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting stream proxy on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Use hyper's auto builder which supports both HTTP/1 and HTTP/2
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let app = app.clone();

        tokio::spawn(async move {
            let builder = Builder::new(hyper_util::rt::TokioExecutor::new());
            if let Err(e) = builder
                .serve_connection(
                    io,
                    hyper::service::service_fn(move |req| {
                        let mut app = app.clone();
                        async move { app.call(req).await }
                    }),
                )
                .await
            {
                error!("Connection error: {}", e);
            }
        });
    }
}

fn print_signed_query(config: &Config, args: &[String]) -> Result<()> {
    let secret = config
        .signing_secret
        .as_deref()
        .ok_or_else(|| anyhow!("SIGNING_SECRET is not set"))?;
    let file_id = args
        .first()
        .ok_or_else(|| anyhow!("usage: signed-stream-proxy sign <file_id> [ttl_secs]"))?;
    let ttl = match args.get(1) {
        Some(ttl) => ttl.parse().map_err(|_| anyhow!("invalid ttl: {}", ttl))?,
        None => DEFAULT_LINK_TTL_SECS,
    };
    println!("/stream?{}", token::signed_query(secret, file_id, ttl));
    Ok(())
}
