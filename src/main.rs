//! bargain-watch: binary entrypoint.
//! Loads config, wires feeds → parser → judges → filters → log sink, and runs
//! the monitor until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bargain_watch::metrics::Metrics;
use bargain_watch::{build_monitor, AppConfig, LogSink};

/// `RUST_LOG` wins; otherwise our targets at info and everything else at warn.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "bargain_watch=info,monitor=info,ingest=info,parser=info,evaluator=info,\
             filter=info,pipeline=info,breaker=info,http=warn,warn",
        )
    });

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local .env is optional; BARGAIN_CONFIG_PATH and API keys may live there.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    info!(feeds = cfg.feeds.len(), judge = ?cfg.llm.kind, "configuration loaded");
    let metrics = Metrics::init(cfg.metrics_addr).context("installing metrics recorder")?;

    let monitor = build_monitor(&cfg, Arc::new(LogSink))?;
    for (judge, ok) in monitor.pipeline().evaluator().probe_judges().await {
        if !ok {
            warn!(%judge, "judge not reachable at startup");
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(monitor.run(stop_rx));

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown requested");
    let _ = stop_tx.send(true);

    let totals = handle.await.context("monitor task")?;
    info!(
        delivered = totals.delivered,
        evaluated = totals.evaluated(),
        "bye"
    );
    debug!(snapshot = %metrics.render(), "final metrics");
    Ok(())
}
