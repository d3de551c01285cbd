// src/ingest/poller.rs
//! Per-feed polling state: when to fetch next, whether content changed,
//! failure streak and the feed's circuit breaker.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerSettings, BreakerState, CircuitBreaker};
use crate::http::{build_client, send_with_retry, HttpError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("failed to read feed body: {0}")]
    Body(reqwest::Error),
    #[error("circuit open for {0}")]
    CircuitOpen(String),
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: StdDuration,
    pub timeout: StdDuration,
    pub max_retries: u32,
    pub retry_backoff: StdDuration,
    pub breaker: BreakerSettings,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(300),
            timeout: StdDuration::from_secs(30),
            max_retries: 3,
            retry_backoff: StdDuration::from_millis(1000),
            breaker: BreakerSettings::default(),
        }
    }
}

/// Cheap, cloneable handle that performs the actual GET. Cloned out of the
/// poller so fetches can run concurrently while the poller stays put.
#[derive(Clone)]
pub struct FeedFetcher {
    url: String,
    client: reqwest::Client,
    max_retries: u32,
    backoff: StdDuration,
}

impl FeedFetcher {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<String, FetchError> {
        let rsp = send_with_retry(
            || self.client.get(&self.url),
            self.max_retries,
            self.backoff,
            &self.url,
        )
        .await?;
        rsp.text().await.map_err(FetchError::Body)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedPollerState {
    pub last_poll: Option<DateTime<Utc>>,
    pub last_fingerprint: Option<String>,
    pub consecutive_failures: u32,
    pub active: bool,
}

pub struct FeedPoller {
    fetcher: FeedFetcher,
    interval: Duration,
    max_retries: u32,
    state: FeedPollerState,
    breaker: CircuitBreaker,
}

impl FeedPoller {
    pub fn new(url: &str, settings: &PollerSettings) -> Result<Self, FetchError> {
        let client = build_client(settings.timeout).map_err(HttpError::from)?;
        Ok(Self {
            fetcher: FeedFetcher {
                url: url.to_string(),
                client,
                max_retries: settings.max_retries,
                backoff: settings.retry_backoff,
            },
            interval: Duration::from_std(settings.interval).unwrap_or(Duration::seconds(300)),
            max_retries: settings.max_retries,
            state: FeedPollerState {
                active: true,
                ..FeedPollerState::default()
            },
            breaker: CircuitBreaker::new(format!("feed:{url}"), settings.breaker),
        })
    }

    pub fn url(&self) -> &str {
        self.fetcher.url()
    }

    pub fn state(&self) -> &FeedPollerState {
        &self.state
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn deactivate(&mut self) {
        self.state.active = false;
    }

    /// Due when active and never polled or the interval has elapsed.
    pub fn should_poll(&self, now: DateTime<Utc>) -> bool {
        if !self.state.active {
            return false;
        }
        match self.state.last_poll {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Healthy while the failure streak stays under twice the retry budget
    /// (a budget of zero counts as one).
    pub fn is_healthy(&self) -> bool {
        self.state.consecutive_failures < self.max_retries.max(1).saturating_mul(2)
    }

    /// Gate a fetch through the breaker. `None` means the circuit is open
    /// and the feed is skipped this round without counting a failure.
    pub fn begin_fetch(&mut self, now: DateTime<Utc>) -> Option<FeedFetcher> {
        if self.breaker.allow(now) {
            Some(self.fetcher.clone())
        } else {
            debug!(target: "ingest", url = %self.url(), "feed circuit open; skipping");
            None
        }
    }

    /// Fold a fetch outcome into the poller state.
    pub fn record_fetch(
        &mut self,
        result: Result<String, FetchError>,
        now: DateTime<Utc>,
    ) -> Result<String, FetchError> {
        match result {
            Ok(body) => {
                self.state.last_poll = Some(now);
                self.state.consecutive_failures = 0;
                self.breaker.record_success();
                counter!("ingest_fetch_total", "outcome" => "ok").increment(1);
                Ok(body)
            }
            Err(e) => {
                self.state.consecutive_failures += 1;
                self.breaker.record_failure(now);
                counter!("ingest_fetch_total", "outcome" => "error").increment(1);
                warn!(
                    target: "ingest",
                    url = %self.url(),
                    failures = self.state.consecutive_failures,
                    error = %e,
                    "feed fetch failed"
                );
                Err(e)
            }
        }
    }

    /// Gate, fetch and record in one go.
    pub async fn fetch(&mut self) -> Result<String, FetchError> {
        let now = Utc::now();
        let Some(fetcher) = self.begin_fetch(now) else {
            return Err(FetchError::CircuitOpen(self.url().to_string()));
        };
        let result = fetcher.fetch().await;
        self.record_fetch(result, now)
    }

    /// True when the payload's SHA-256 differs from the last one seen. The
    /// first payload always counts as changed.
    pub fn has_changed(&mut self, content: &str) -> bool {
        let fingerprint = fingerprint(content);
        let changed = self.state.last_fingerprint.as_deref() != Some(fingerprint.as_str());
        if changed {
            self.state.last_fingerprint = Some(fingerprint);
        } else {
            counter!("ingest_feed_unchanged_total").increment(1);
            info!(target: "ingest", url = %self.url(), "feed content unchanged");
        }
        changed
    }
}

pub fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
