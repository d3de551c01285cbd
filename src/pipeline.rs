// src/pipeline.rs
//! One raw entry through parse → evaluate → filter → deliver, with the
//! per-cycle bookkeeping carried in an explicit `PipelineContext`.

use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::deal::{Deal, RawDeal};
use crate::evaluate::{Evaluation, EvaluationTier, Evaluator};
use crate::filter::{FilterEngine, FilterResult};
use crate::parse::DealParser;
use crate::sink::DealSink;

// ------------------------------------------------------------
// Cycle bookkeeping
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub feeds_polled: u64,
    pub feeds_circuit_open: u64,
    pub feeds_removed: u64,
    pub fetch_failures: u64,
    pub feeds_unchanged: u64,
    pub entries_new: u64,
    pub entries_duplicate: u64,
    pub entries_stale: u64,
    pub entries_invalid: u64,
    pub parsed: u64,
    pub parse_rejected: u64,
    pub evaluated_primary: u64,
    pub evaluated_secondary: u64,
    pub evaluated_keyword: u64,
    pub passed: u64,
    pub filtered: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
}

impl CycleReport {
    pub fn evaluated(&self) -> u64 {
        self.evaluated_primary + self.evaluated_secondary + self.evaluated_keyword
    }

    fn absorb(&mut self, o: &CycleReport) {
        self.feeds_polled += o.feeds_polled;
        self.feeds_circuit_open += o.feeds_circuit_open;
        self.feeds_removed += o.feeds_removed;
        self.fetch_failures += o.fetch_failures;
        self.feeds_unchanged += o.feeds_unchanged;
        self.entries_new += o.entries_new;
        self.entries_duplicate += o.entries_duplicate;
        self.entries_stale += o.entries_stale;
        self.entries_invalid += o.entries_invalid;
        self.parsed += o.parsed;
        self.parse_rejected += o.parse_rejected;
        self.evaluated_primary += o.evaluated_primary;
        self.evaluated_secondary += o.evaluated_secondary;
        self.evaluated_keyword += o.evaluated_keyword;
        self.passed += o.passed;
        self.filtered += o.filtered;
        self.delivered += o.delivered;
        self.delivery_failures += o.delivery_failures;
    }

    fn record_tier(&mut self, tier: EvaluationTier) {
        match tier {
            EvaluationTier::Primary => self.evaluated_primary += 1,
            EvaluationTier::Secondary => self.evaluated_secondary += 1,
            EvaluationTier::Keyword => self.evaluated_keyword += 1,
        }
    }
}

/// Owned by the run loop: created before the first tick, reset after each
/// tick, and dropped through [`shutdown`](Self::shutdown) when the loop ends.
#[derive(Debug, Default)]
pub struct PipelineContext {
    cycle: u64,
    current: CycleReport,
    totals: CycleReport,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.current = CycleReport::default();
        self.cycle
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn report(&self) -> &CycleReport {
        &self.current
    }

    pub fn report_mut(&mut self) -> &mut CycleReport {
        &mut self.current
    }

    pub fn totals(&self) -> &CycleReport {
        &self.totals
    }

    /// Log the cycle summary, fold it into the totals and return it.
    pub fn finish_cycle(&mut self) -> CycleReport {
        let report = std::mem::take(&mut self.current);
        self.totals.absorb(&report);
        let r = &report;
        info!(
            target: "monitor",
            cycle = self.cycle,
            feeds_polled = r.feeds_polled,
            feeds_circuit_open = r.feeds_circuit_open,
            feeds_removed = r.feeds_removed,
            fetch_failures = r.fetch_failures,
            feeds_unchanged = r.feeds_unchanged,
            entries_new = r.entries_new,
            parsed = r.parsed,
            parse_rejected = r.parse_rejected,
            evaluated = r.evaluated(),
            evaluated_secondary = r.evaluated_secondary,
            evaluated_keyword = r.evaluated_keyword,
            passed = r.passed,
            filtered = r.filtered,
            delivered = r.delivered,
            delivery_failures = r.delivery_failures,
            "cycle complete"
        );
        report
    }

    pub fn shutdown(self) -> CycleReport {
        let t = &self.totals;
        info!(
            target: "monitor",
            cycles = self.cycle,
            parsed = t.parsed,
            evaluated = t.evaluated(),
            passed = t.passed,
            delivered = t.delivered,
            "monitor stopped"
        );
        self.totals
    }
}

// ------------------------------------------------------------
// Pipeline
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Evaluate,
    Filter,
    Deliver,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Rejected {
        link: String,
        stage: Stage,
        reason: String,
    },
    Filtered {
        deal: Deal,
        evaluation: Evaluation,
        result: FilterResult,
    },
    Passed {
        deal: Deal,
        evaluation: Evaluation,
        result: FilterResult,
    },
}

pub struct DealPipeline {
    parser: DealParser,
    evaluator: Evaluator,
    filter: FilterEngine,
}

impl DealPipeline {
    pub fn new(parser: DealParser, evaluator: Evaluator, filter: FilterEngine) -> Self {
        Self {
            parser,
            evaluator,
            filter,
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Parse, evaluate and filter one entry. Never fails: every problem ends
    /// as a `Rejected` or `Filtered` outcome with its reason logged.
    pub async fn process(&self, raw: &RawDeal, ctx: &mut PipelineContext) -> PipelineOutcome {
        let deal = match self.parser.parse(raw) {
            Ok(d) => d,
            Err(e) => {
                ctx.report_mut().parse_rejected += 1;
                warn!(target: "pipeline", link = %raw.link, stage = "parse", reason = %e, "entry rejected");
                return PipelineOutcome::Rejected {
                    link: raw.link.clone(),
                    stage: Stage::Parse,
                    reason: e.to_string(),
                };
            }
        };
        ctx.report_mut().parsed += 1;

        let evaluation = self.evaluator.evaluate(&deal).await;
        ctx.report_mut().record_tier(evaluation.tier);

        let result = self.filter.apply(&deal, &evaluation.result);
        if result.passes_filters {
            ctx.report_mut().passed += 1;
            counter!("filter_passed_total").increment(1);
            PipelineOutcome::Passed {
                deal,
                evaluation,
                result,
            }
        } else {
            ctx.report_mut().filtered += 1;
            counter!("filter_rejected_total").increment(1);
            counter!("deals_rejected_total", "stage" => "filter").increment(1);
            PipelineOutcome::Filtered {
                deal,
                evaluation,
                result,
            }
        }
    }

    /// [`process`](Self::process), then hand a passing deal to `sink`. Only
    /// fully evaluated and filtered deals ever reach the sink.
    pub async fn process_and_deliver(
        &self,
        raw: &RawDeal,
        sink: &dyn DealSink,
        ctx: &mut PipelineContext,
    ) -> PipelineOutcome {
        let outcome = self.process(raw, ctx).await;
        if let PipelineOutcome::Passed { deal, result, .. } = &outcome {
            match sink.deliver(deal, result).await {
                Ok(()) => {
                    ctx.report_mut().delivered += 1;
                    counter!("deals_delivered_total").increment(1);
                }
                Err(e) => {
                    ctx.report_mut().delivery_failures += 1;
                    counter!("deals_delivery_errors_total").increment(1);
                    error!(
                        target: "pipeline",
                        deal_id = %deal.id,
                        sink = sink.name(),
                        stage = "deliver",
                        error = ?e,
                        "delivery failed"
                    );
                }
            }
        }
        outcome
    }
}
