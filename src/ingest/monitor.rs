// src/ingest/monitor.rs
//! The scheduling loop.
//!
//! Every tick: drop unhealthy feeds, fetch every due feed concurrently, wait
//! for all of those fetches, then push each changed payload through detection
//! and the deal pipeline one entry at a time, in feed order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::gauge;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use url::Url;

use super::detector::DealDetector;
use super::poller::{FeedPoller, FetchError, PollerSettings};
use crate::breaker::BreakerState;
use crate::deal::is_http_url;
use crate::metrics::ensure_metrics_described;
use crate::pipeline::{CycleReport, DealPipeline, PipelineContext};
use crate::sink::DealSink;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub tick: Duration,
    pub max_feeds: usize,
    pub poller: PollerSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            max_feeds: 10,
            poller: PollerSettings::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("feed limit of {0} reached")]
    LimitReached(usize),
    #[error("invalid feed URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Client(#[from] FetchError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStatus {
    pub url: String,
    pub domain: String,
    pub active: bool,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_poll: Option<chrono::DateTime<Utc>>,
    pub breaker: BreakerState,
}

pub struct FeedMonitor {
    settings: MonitorSettings,
    pollers: Vec<FeedPoller>,
    detector: DealDetector,
    pipeline: Arc<DealPipeline>,
    sink: Arc<dyn DealSink>,
}

fn stopped(stop: Option<&watch::Receiver<bool>>) -> bool {
    stop.is_some_and(|rx| *rx.borrow())
}

impl FeedMonitor {
    pub fn new(
        settings: MonitorSettings,
        detector: DealDetector,
        pipeline: Arc<DealPipeline>,
        sink: Arc<dyn DealSink>,
    ) -> Self {
        Self {
            settings,
            pollers: Vec::new(),
            detector,
            pipeline,
            sink,
        }
    }

    pub fn detector(&self) -> &DealDetector {
        &self.detector
    }

    pub fn pipeline(&self) -> &DealPipeline {
        &self.pipeline
    }

    /// `Ok(false)` when the URL is already monitored.
    pub fn add_feed(&mut self, url: &str) -> Result<bool, MonitorError> {
        let url = url.trim();
        if !is_http_url(url) {
            return Err(MonitorError::InvalidUrl(url.to_string()));
        }
        if self.pollers.iter().any(|p| p.url() == url) {
            return Ok(false);
        }
        if self.pollers.len() >= self.settings.max_feeds {
            return Err(MonitorError::LimitReached(self.settings.max_feeds));
        }
        self.pollers.push(FeedPoller::new(url, &self.settings.poller)?);
        gauge!("monitor_feeds_active").set(self.pollers.len() as f64);
        info!(target: "monitor", feed = %url, "feed added");
        Ok(true)
    }

    pub fn remove_feed(&mut self, url: &str) -> bool {
        let url = url.trim();
        let before = self.pollers.len();
        self.pollers.retain(|p| p.url() != url);
        let removed = self.pollers.len() != before;
        if removed {
            gauge!("monitor_feeds_active").set(self.pollers.len() as f64);
            info!(target: "monitor", feed = %url, "feed removed");
        }
        removed
    }

    /// Make the monitored set equal `urls`. Returns `(added, removed)`.
    pub fn reload_feeds(&mut self, urls: &[String]) -> Result<(usize, usize), MonitorError> {
        let wanted: Vec<&str> = urls.iter().map(|u| u.trim()).collect();
        let stale: Vec<String> = self
            .pollers
            .iter()
            .filter(|p| !wanted.contains(&p.url()))
            .map(|p| p.url().to_string())
            .collect();
        let removed = stale.iter().filter(|u| self.remove_feed(u)).count();
        let mut added = 0;
        for url in wanted {
            if self.add_feed(url)? {
                added += 1;
            }
        }
        info!(target: "monitor", added, removed, total = self.pollers.len(), "feeds reloaded");
        Ok((added, removed))
    }

    pub fn feed_status(&self) -> Vec<FeedStatus> {
        self.pollers
            .iter()
            .map(|p| FeedStatus {
                url: p.url().to_string(),
                domain: Url::parse(p.url())
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_default(),
                active: p.state().active,
                healthy: p.is_healthy(),
                consecutive_failures: p.state().consecutive_failures,
                last_poll: p.state().last_poll,
                breaker: p.breaker_state(),
            })
            .collect()
    }

    /// One scheduler tick without a stop signal.
    pub async fn tick(&mut self, ctx: &mut PipelineContext) {
        self.tick_with_stop(ctx, None).await
    }

    async fn tick_with_stop(
        &mut self,
        ctx: &mut PipelineContext,
        stop: Option<&watch::Receiver<bool>>,
    ) {
        let now = Utc::now();
        gauge!("monitor_last_tick_ts").set(now.timestamp() as f64);

        let before = self.pollers.len();
        self.pollers.retain(|p| {
            let healthy = p.is_healthy();
            if !healthy {
                error!(
                    target: "monitor",
                    feed = %p.url(),
                    failures = p.state().consecutive_failures,
                    "feed unhealthy; removing from monitoring"
                );
            }
            healthy
        });
        let removed = before - self.pollers.len();
        if removed > 0 {
            ctx.report_mut().feeds_removed += removed as u64;
            gauge!("monitor_feeds_active").set(self.pollers.len() as f64);
            if self.pollers.is_empty() {
                warn!(target: "monitor", "no feeds left to monitor");
            }
        }

        // Fetch all due feeds concurrently and wait for every one of them.
        let mut set = JoinSet::new();
        for (idx, poller) in self.pollers.iter_mut().enumerate() {
            if !poller.should_poll(now) {
                continue;
            }
            match poller.begin_fetch(now) {
                Some(fetcher) => {
                    set.spawn(async move { (idx, fetcher.fetch().await) });
                }
                None => ctx.report_mut().feeds_circuit_open += 1,
            }
        }
        let mut fetched = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(r) => fetched.push(r),
                Err(e) => error!(target: "monitor", error = %e, "fetch task aborted"),
            }
        }
        fetched.sort_by_key(|(idx, _)| *idx);

        let mut payloads = Vec::with_capacity(fetched.len());
        for (idx, result) in fetched {
            let Some(poller) = self.pollers.get_mut(idx) else {
                continue;
            };
            ctx.report_mut().feeds_polled += 1;
            match poller.record_fetch(result, now) {
                Ok(body) => payloads.push((idx, body)),
                Err(_) => ctx.report_mut().fetch_failures += 1,
            }
        }

        for (idx, body) in payloads {
            if stopped(stop) {
                info!(target: "monitor", "stop requested; skipping remaining payloads");
                break;
            }
            let Some(poller) = self.pollers.get_mut(idx) else {
                continue;
            };
            if !poller.has_changed(&body) {
                ctx.report_mut().feeds_unchanged += 1;
                continue;
            }
            let feed = poller.url().to_string();
            let detection = self.detector.detect(&body);
            {
                let r = ctx.report_mut();
                r.entries_new += detection.deals.len() as u64;
                r.entries_duplicate += detection.duplicates as u64;
                r.entries_stale += detection.stale as u64;
                r.entries_invalid += detection.invalid as u64;
            }
            if !detection.deals.is_empty() {
                info!(target: "monitor", %feed, new = detection.deals.len(), "new entries detected");
            }
            for raw in &detection.deals {
                if stopped(stop) {
                    break;
                }
                self.pipeline
                    .process_and_deliver(raw, self.sink.as_ref(), ctx)
                    .await;
            }
        }
    }

    /// Run until `stop` flips to `true` (or its sender is dropped). Returns
    /// the totals across all cycles.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> CycleReport {
        ensure_metrics_described();
        let mut ctx = PipelineContext::new();
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            target: "monitor",
            feeds = self.pollers.len(),
            tick_ms = self.settings.tick.as_millis() as u64,
            "monitor started"
        );

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    ctx.begin_cycle();
                    self.tick_with_stop(&mut ctx, Some(&stop)).await;
                    ctx.finish_cycle();
                }
            }
        }

        ctx.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserCriteria;
    use crate::evaluate::{Evaluator, KeywordFallback, PromptTemplate};
    use crate::filter::FilterEngine;
    use crate::parse::DealParser;
    use crate::sink::MemorySink;

    fn monitor(max_feeds: usize) -> FeedMonitor {
        let evaluator = Evaluator::new(
            PromptTemplate::default_template(),
            KeywordFallback::default(),
            Duration::from_secs(1),
        );
        let pipeline = DealPipeline::new(
            DealParser::default(),
            evaluator,
            FilterEngine::new(UserCriteria::default()),
        );
        FeedMonitor::new(
            MonitorSettings {
                max_feeds,
                ..MonitorSettings::default()
            },
            DealDetector::new(),
            Arc::new(pipeline),
            Arc::new(MemorySink::new()),
        )
    }

    #[test]
    fn add_remove_and_limit() {
        let mut m = monitor(2);
        assert!(m.add_feed("https://a.example/rss").unwrap());
        assert!(!m.add_feed("https://a.example/rss").unwrap(), "duplicate is a no-op");
        assert!(m.add_feed("https://b.example/rss").unwrap());
        assert!(matches!(
            m.add_feed("https://c.example/rss"),
            Err(MonitorError::LimitReached(2))
        ));
        assert!(matches!(
            m.add_feed("not a url"),
            Err(MonitorError::InvalidUrl(_))
        ));

        assert!(m.remove_feed("https://a.example/rss"));
        assert!(!m.remove_feed("https://a.example/rss"));
        assert_eq!(m.feed_status().len(), 1);
    }

    #[test]
    fn reload_diffs_the_feed_set() {
        let mut m = monitor(5);
        m.add_feed("https://a.example/rss").unwrap();
        m.add_feed("https://b.example/rss").unwrap();
        let (added, removed) = m
            .reload_feeds(&["https://b.example/rss".into(), "https://c.example/rss".into()])
            .unwrap();
        assert_eq!((added, removed), (1, 1));
        let urls: Vec<String> = m.feed_status().into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["https://b.example/rss", "https://c.example/rss"]);
    }

    #[test]
    fn status_reports_domain_and_health() {
        let mut m = monitor(5);
        m.add_feed("https://www.ozbargain.com.au/deals/feed").unwrap();
        let s = &m.feed_status()[0];
        assert_eq!(s.domain, "www.ozbargain.com.au");
        assert!(s.active && s.healthy);
        assert_eq!(s.breaker, BreakerState::Closed);
        assert!(s.last_poll.is_none());
    }

    #[tokio::test]
    async fn run_exits_when_stop_is_set() {
        let m = monitor(1);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(m.run(rx));
        tx.send(true).unwrap();
        let totals = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor stopped in time")
            .expect("task joined");
        assert_eq!(totals.delivered, 0);
    }
}
