// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod breaker;
pub mod config;
pub mod deal;
pub mod evaluate;
pub mod filter;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod parse;
pub mod pipeline;
pub mod sink;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::deal::{Deal, DealError, RawDeal};
pub use crate::evaluate::{Evaluation, EvaluationResult, Evaluator};
pub use crate::filter::{FilterEngine, FilterResult, UrgencyLevel};
pub use crate::ingest::{DealDetector, FeedMonitor};
pub use crate::pipeline::{CycleReport, DealPipeline, PipelineContext, PipelineOutcome};
pub use crate::sink::{DealSink, LogSink};

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::evaluate::{JudgeClient, KeywordFallback, PromptTemplate};
use crate::parse::DealParser;

/// Build the evaluator from config: prompt file (created with the default
/// template when missing), judges in configured order, keyword fallback.
pub fn build_evaluator(cfg: &AppConfig) -> anyhow::Result<Evaluator> {
    let path = Path::new(&cfg.criteria.prompt_template_path);
    let template = PromptTemplate::load_or_create_default(path)
        .with_context(|| format!("loading prompt template {}", path.display()))?;
    let (primary, secondary) = JudgeClient::from_config(&cfg.llm)?;

    let mut evaluator = Evaluator::new(
        template,
        KeywordFallback::from_criteria(&cfg.criteria),
        cfg.evaluation_timeout(),
    )
    .with_breaker(cfg.breaker)
    .with_primary(Arc::new(primary));
    if let Some(secondary) = secondary {
        evaluator = evaluator.with_secondary(Arc::new(secondary));
    }
    Ok(evaluator)
}

/// Wire a ready-to-run monitor for every configured feed.
pub fn build_monitor(cfg: &AppConfig, sink: Arc<dyn DealSink>) -> anyhow::Result<FeedMonitor> {
    build_monitor_with(cfg, build_evaluator(cfg)?, sink)
}

/// Like [`build_monitor`] but with a caller-supplied evaluator.
pub fn build_monitor_with(
    cfg: &AppConfig,
    evaluator: Evaluator,
    sink: Arc<dyn DealSink>,
) -> anyhow::Result<FeedMonitor> {
    let pipeline = DealPipeline::new(
        DealParser::default(),
        evaluator,
        FilterEngine::new(cfg.criteria.clone()),
    );
    let mut monitor = FeedMonitor::new(
        cfg.monitor_settings(),
        DealDetector::with_max_age_hours(cfg.max_deal_age_hours),
        Arc::new(pipeline),
        sink,
    );
    for feed in &cfg.feeds {
        monitor
            .add_feed(feed)
            .with_context(|| format!("adding feed {feed}"))?;
    }
    info!(target: "monitor", feeds = cfg.feeds.len(), "monitor built");
    Ok(monitor)
}
