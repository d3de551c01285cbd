// src/metrics.rs
//! Prometheus recorder plus the series descriptions.

use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. With `listen` set, `/metrics`
    /// is served from a task on the current runtime.
    pub fn init(listen: Option<SocketAddr>) -> Result<Self> {
        let handle = match listen {
            Some(addr) => {
                let (recorder, exporter) = PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .build()
                    .map_err(|e| anyhow!("prometheus: build recorder: {e}"))?;
                let handle = recorder.handle();
                metrics::set_global_recorder(recorder)
                    .map_err(|_| anyhow!("prometheus: a metrics recorder is already installed"))?;
                tokio::spawn(exporter);
                info!(%addr, "serving /metrics");
                handle
            }
            None => PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| anyhow!("prometheus: install recorder: {e}"))?,
        };

        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_fetch_total", "Feed fetches by outcome (ok/error).");
        describe_counter!("ingest_feed_unchanged_total", "Fetches whose payload matched the last fingerprint.");
        describe_counter!("ingest_parse_errors_total", "Payloads that stopped early on malformed XML.");
        describe_counter!("ingest_entries_total", "Feed entries read.");
        describe_counter!("ingest_duplicates_total", "Entries skipped because their link was already seen.");
        describe_counter!("ingest_invalid_entries_total", "Entries skipped by validation.");
        describe_histogram!("ingest_parse_ms", "Payload scan time in milliseconds.");
        describe_counter!("deals_parsed_total", "Deals built from raw entries.");
        describe_counter!("deals_rejected_total", "Deals dropped, by stage.");
        describe_counter!("deals_delivered_total", "Deals handed to the sink.");
        describe_counter!("deals_delivery_errors_total", "Sink failures.");
        describe_counter!("evaluator_calls_total", "Evaluations by answering tier.");
        describe_counter!("evaluator_failures_total", "Judge call failures by tier.");
        describe_counter!("evaluator_timeouts_total", "Evaluations that hit the outer deadline.");
        describe_histogram!("evaluator_latency_ms", "Judge round-trip time in milliseconds.");
        describe_counter!("filter_passed_total", "Deals that passed every filter.");
        describe_counter!("filter_rejected_total", "Deals rejected by at least one filter.");
        describe_gauge!("monitor_feeds_active", "Feeds currently monitored.");
        describe_gauge!("monitor_last_tick_ts", "Unix ts of the last scheduler tick.");
    });
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use crate::deal::RawDeal;
    use crate::parse::DealParser;

    #[test]
    fn parser_counters_reach_the_prometheus_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let raw = RawDeal {
            title: "Cheap SSD $59".into(),
            description: "1TB NVMe, was $99".into(),
            link: "https://www.ozbargain.com.au/node/31337".into(),
            pub_date: String::new(),
            category: None,
        };

        metrics::with_local_recorder(&recorder, || {
            let parser = DealParser::default();
            parser.parse(&raw).unwrap();
            parser.parse(&raw).unwrap();
        });

        let text = handle.render();
        assert!(text.contains("deals_parsed_total 2"), "{text}");
    }
}
