// src/http.rs
//! Shared reqwest plumbing for feed fetches and judge calls.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

pub const USER_AGENT: &str = concat!("bargain-watch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(StatusCode),
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status(s) => Some(*s),
            HttpError::Transport(e) => e.status(),
        }
    }
}

pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
}

/// 429 and 5xx are worth another attempt; other statuses are final.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_transport(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift)
}

/// Sends the request built by `make`, retrying transient failures up to
/// `max_retries` extra times. Non-success statuses come back as
/// `HttpError::Status`.
pub async fn send_with_retry<F>(
    make: F,
    max_retries: u32,
    base_backoff: Duration,
    target: &str,
) -> Result<Response, HttpError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let retries_left = attempt <= max_retries;
        match make().send().await {
            Ok(rsp) if rsp.status().is_success() => {
                debug!(target: "http", %target, attempt, status = %rsp.status(), "request ok");
                return Ok(rsp);
            }
            Ok(rsp) => {
                let status = rsp.status();
                if retries_left && is_retryable_status(status) {
                    warn!(target: "http", %target, attempt, %status, "retryable status; backing off");
                    tokio::time::sleep(backoff_delay(base_backoff, attempt)).await;
                    continue;
                }
                return Err(HttpError::Status(status));
            }
            Err(e) => {
                if retries_left && is_retryable_transport(&e) {
                    warn!(target: "http", %target, attempt, error = %e, "transport error; backing off");
                    tokio::time::sleep(backoff_delay(base_backoff, attempt)).await;
                    continue;
                }
                return Err(HttpError::Transport(e));
            }
        }
    }
}
