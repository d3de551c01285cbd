// src/evaluate/mod.rs
//! Deal evaluation with a fallback chain:
//! primary judge → secondary judge → keyword heuristic.
//!
//! The whole chain runs under one deadline. Each judge slot sits behind its
//! own circuit breaker; an open breaker counts as a failed call and the
//! chain moves on.

pub mod fallback;
pub mod judge;
pub mod prompt;
pub mod response;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerSettings, CircuitBreaker};
use crate::deal::Deal;
pub use fallback::KeywordFallback;
pub use judge::{Judge, JudgeClient, JudgeError, JudgeResponse, MockJudge};
pub use prompt::{PromptError, PromptStore, PromptTemplate};
pub use response::parse_response;

pub const MAX_REASONING_CHARS: usize = 1000;
const NO_REASONING: &str = "No reasoning provided";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub is_relevant: bool,
    pub confidence_score: f64,
    pub reasoning: String,
}

impl EvaluationResult {
    /// Confidence is clamped to [0, 1]; reasoning is trimmed and capped.
    pub fn new(is_relevant: bool, confidence: f64, reasoning: impl Into<String>) -> Self {
        let confidence_score = if confidence.is_nan() {
            0.5
        } else {
            confidence.clamp(0.0, 1.0)
        };
        let reasoning = reasoning.into();
        let reasoning = reasoning.trim();
        let reasoning = if reasoning.is_empty() {
            NO_REASONING.to_string()
        } else {
            reasoning.chars().take(MAX_REASONING_CHARS).collect()
        };
        Self {
            is_relevant,
            confidence_score,
            reasoning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationTier {
    Primary,
    Secondary,
    Keyword,
}

impl EvaluationTier {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationTier::Primary => "primary",
            EvaluationTier::Secondary => "secondary",
            EvaluationTier::Keyword => "keyword",
        }
    }
}

/// Verdict plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub result: EvaluationResult,
    pub tier: EvaluationTier,
    pub judge: Option<String>,
}

impl Evaluation {
    pub fn is_degraded(&self) -> bool {
        self.tier == EvaluationTier::Keyword
    }
}

// ------------------------------------------------------------
// Statistics
// ------------------------------------------------------------

#[derive(Debug, Default)]
struct EvaluationStats {
    total: AtomicU64,
    primary: AtomicU64,
    secondary: AtomicU64,
    keyword: AtomicU64,
    timeouts: AtomicU64,
    judge_latency_ms_sum: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationStatsSnapshot {
    pub total: u64,
    pub primary: u64,
    pub secondary: u64,
    pub keyword: u64,
    pub timeouts: u64,
    pub avg_judge_latency_ms: f64,
}

impl EvaluationStatsSnapshot {
    /// Share of evaluations answered by a judge.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.primary + self.secondary) as f64 / self.total as f64
    }

    /// Share of evaluations that needed any fallback tier.
    pub fn fallback_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.secondary + self.keyword) as f64 / self.total as f64
    }
}

// ------------------------------------------------------------
// Evaluator
// ------------------------------------------------------------

struct JudgeSlot {
    tier: EvaluationTier,
    judge: Arc<dyn Judge>,
    breaker: Mutex<CircuitBreaker>,
}

impl JudgeSlot {
    fn new(tier: EvaluationTier, judge: Arc<dyn Judge>, settings: BreakerSettings) -> Self {
        let breaker = CircuitBreaker::new(format!("judge:{}", judge.name()), settings);
        Self {
            tier,
            judge,
            breaker: Mutex::new(breaker),
        }
    }

    fn allow(&self) -> bool {
        match self.breaker.lock() {
            Ok(mut b) => b.allow(Utc::now()),
            Err(poisoned) => poisoned.into_inner().allow(Utc::now()),
        }
    }

    fn record(&self, ok: bool) {
        let mut b = match self.breaker.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        if ok {
            b.record_success();
        } else {
            b.record_failure(Utc::now());
        }
    }
}

pub struct Evaluator {
    slots: Vec<JudgeSlot>,
    template: PromptTemplate,
    fallback: KeywordFallback,
    deadline: Duration,
    breaker: BreakerSettings,
    stats: EvaluationStats,
}

impl Evaluator {
    pub fn new(template: PromptTemplate, fallback: KeywordFallback, deadline: Duration) -> Self {
        Self {
            slots: Vec::new(),
            template,
            fallback,
            deadline,
            breaker: BreakerSettings::default(),
            stats: EvaluationStats::default(),
        }
    }

    /// Breaker settings for judges added after this call.
    pub fn with_breaker(mut self, settings: BreakerSettings) -> Self {
        self.breaker = settings;
        self
    }

    pub fn with_primary(mut self, judge: Arc<dyn Judge>) -> Self {
        self.slots.retain(|s| s.tier != EvaluationTier::Primary);
        self.slots
            .insert(0, JudgeSlot::new(EvaluationTier::Primary, judge, self.breaker));
        self
    }

    pub fn with_secondary(mut self, judge: Arc<dyn Judge>) -> Self {
        self.slots.retain(|s| s.tier != EvaluationTier::Secondary);
        self.slots
            .push(JudgeSlot::new(EvaluationTier::Secondary, judge, self.breaker));
        self
    }

    pub fn judges(&self) -> impl Iterator<Item = &Arc<dyn Judge>> {
        self.slots.iter().map(|s| &s.judge)
    }

    /// Probe every configured judge and log the outcome.
    pub async fn probe_judges(&self) -> Vec<(String, bool)> {
        let mut out = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let ok = slot.judge.probe().await;
            let name = slot.judge.name();
            if ok {
                info!(target: "evaluator", tier = slot.tier.as_str(), judge = %name, "judge reachable");
            } else {
                warn!(target: "evaluator", tier = slot.tier.as_str(), judge = %name, "judge probe failed; fallbacks stay available");
            }
            out.push((name, ok));
        }
        out
    }

    /// Never fails: the keyword heuristic is the last tier.
    pub async fn evaluate(&self, deal: &Deal) -> Evaluation {
        let prompt = self.template.render(deal);
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        let outcome = match tokio::time::timeout(self.deadline, self.run_chain(&deal.id, &prompt)).await
        {
            Ok(Some(eval)) => eval,
            Ok(None) => self.keyword(deal, "judge unavailable"),
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                counter!("evaluator_timeouts_total").increment(1);
                warn!(
                    target: "evaluator",
                    deal_id = %deal.id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "evaluation deadline exceeded"
                );
                self.keyword(deal, "evaluation timed out")
            }
        };

        let counter_slot = match outcome.tier {
            EvaluationTier::Primary => &self.stats.primary,
            EvaluationTier::Secondary => &self.stats.secondary,
            EvaluationTier::Keyword => &self.stats.keyword,
        };
        counter_slot.fetch_add(1, Ordering::Relaxed);
        counter!("evaluator_calls_total", "tier" => outcome.tier.as_str()).increment(1);
        debug!(
            target: "evaluator",
            deal_id = %deal.id,
            tier = outcome.tier.as_str(),
            relevant = outcome.result.is_relevant,
            confidence = outcome.result.confidence_score,
            "deal evaluated"
        );
        outcome
    }

    async fn run_chain(&self, deal_id: &str, prompt: &str) -> Option<Evaluation> {
        for slot in &self.slots {
            let name = slot.judge.name();
            if !slot.allow() {
                warn!(target: "evaluator", %deal_id, tier = slot.tier.as_str(), judge = %name, "judge circuit open; falling through");
                continue;
            }
            match slot.judge.evaluate(prompt).await {
                Ok(rsp) => {
                    slot.record(true);
                    let ms = rsp.latency.as_millis() as u64;
                    self.stats.judge_latency_ms_sum.fetch_add(ms, Ordering::Relaxed);
                    histogram!("evaluator_latency_ms", "tier" => slot.tier.as_str()).record(ms as f64);
                    return Some(Evaluation {
                        result: parse_response(&rsp.content),
                        tier: slot.tier,
                        judge: Some(name),
                    });
                }
                Err(e) => {
                    slot.record(false);
                    counter!("evaluator_failures_total", "tier" => slot.tier.as_str()).increment(1);
                    warn!(target: "evaluator", %deal_id, tier = slot.tier.as_str(), judge = %name, error = %e, "judge call failed");
                }
            }
        }
        None
    }

    fn keyword(&self, deal: &Deal, why: &str) -> Evaluation {
        warn!(target: "evaluator", deal_id = %deal.id, reason = why, "using keyword fallback");
        Evaluation {
            result: self.fallback.evaluate(deal, why),
            tier: EvaluationTier::Keyword,
            judge: None,
        }
    }

    pub fn stats(&self) -> EvaluationStatsSnapshot {
        let s = &self.stats;
        let primary = s.primary.load(Ordering::Relaxed);
        let secondary = s.secondary.load(Ordering::Relaxed);
        let answered = primary + secondary;
        let latency_sum = s.judge_latency_ms_sum.load(Ordering::Relaxed);
        EvaluationStatsSnapshot {
            total: s.total.load(Ordering::Relaxed),
            primary,
            secondary,
            keyword: s.keyword.load(Ordering::Relaxed),
            timeouts: s.timeouts.load(Ordering::Relaxed),
            avg_judge_latency_ms: if answered == 0 {
                0.0
            } else {
                latency_sum as f64 / answered as f64
            },
        }
    }
}
