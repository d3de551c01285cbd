// src/filter/mod.rs
//! User-criteria filtering and urgency scoring.
//!
//! Expiration is the only short-circuit. Every other check runs and is
//! logged even after an earlier one failed, so a rejection lists all reasons.

pub mod authenticity;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::UserCriteria;
use crate::deal::Deal;
use crate::evaluate::EvaluationResult;
pub use authenticity::{AuthenticityAssessor, DEFAULT_QUESTIONABLE_THRESHOLD};

static EXPIRED_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\[\s*expired\s*\]",
        r"(?i)\bexpired\b",
        r"(?i)\bended\b",
        r"(?i)\bsold\s*out\b",
        r"(?i)\bout\s+of\s+stock\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("expiry regex"))
    .collect()
});

const URGENCY_KEYWORDS: &[&str] = &[
    "limited time",
    "expires",
    "while stocks last",
    "flash sale",
    "today only",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Urgent,
}

impl UrgencyLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 5 => UrgencyLevel::Urgent,
            s if s >= 3 => UrgencyLevel::High,
            s if s >= 1 => UrgencyLevel::Medium,
            _ => UrgencyLevel::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCheck {
    Expired,
    Price,
    Discount,
    Authenticity,
    Category,
    Keyword,
    Judge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterResult {
    pub passes_filters: bool,
    pub price_match: bool,
    pub authenticity_score: f64,
    pub urgency_level: UrgencyLevel,
    pub failed_checks: Vec<FilterCheck>,
}

impl FilterResult {
    fn expired() -> Self {
        Self {
            passes_filters: false,
            price_match: false,
            authenticity_score: 0.0,
            urgency_level: UrgencyLevel::Low,
            failed_checks: vec![FilterCheck::Expired],
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterEngine {
    criteria: UserCriteria,
    assessor: AuthenticityAssessor,
}

impl FilterEngine {
    pub fn new(criteria: UserCriteria) -> Self {
        Self {
            criteria,
            assessor: AuthenticityAssessor::default(),
        }
    }

    pub fn criteria(&self) -> &UserCriteria {
        &self.criteria
    }

    pub fn assessor(&self) -> &AuthenticityAssessor {
        &self.assessor
    }

    pub fn apply(&self, deal: &Deal, evaluation: &EvaluationResult) -> FilterResult {
        let text = deal.search_text();
        if let Some(re) = EXPIRED_RES.iter().find(|re| re.is_match(&text)) {
            info!(target: "filter", deal_id = %deal.id, pattern = re.as_str(), "deal looks expired");
            return FilterResult::expired();
        }

        let price_match = self.check_price(deal);
        let discount_match = self.check_discount(deal);
        let authenticity_score = self.assessor.assess(deal);
        let authenticity_match = authenticity_score >= self.criteria.min_authenticity_score;
        let category_match = self.check_category(deal);
        let keyword_match = self.check_keywords(deal);
        let judge_match = evaluation.is_relevant;

        let mut failed_checks = Vec::new();
        for (ok, check) in [
            (price_match, FilterCheck::Price),
            (discount_match, FilterCheck::Discount),
            (authenticity_match, FilterCheck::Authenticity),
            (category_match, FilterCheck::Category),
            (keyword_match, FilterCheck::Keyword),
            (judge_match, FilterCheck::Judge),
        ] {
            debug!(target: "filter", deal_id = %deal.id, check = ?check, passed = ok, "filter check");
            if !ok {
                failed_checks.push(check);
            }
        }

        let passes_filters = failed_checks.is_empty();
        let urgency_level = self.urgency_level(deal, evaluation, authenticity_score);
        if passes_filters {
            info!(
                target: "filter",
                deal_id = %deal.id,
                urgency = urgency_level.as_str(),
                authenticity = authenticity_score,
                "deal passed filters"
            );
        } else {
            info!(target: "filter", deal_id = %deal.id, failed = ?failed_checks, "deal rejected by filters");
        }

        FilterResult {
            passes_filters,
            price_match,
            authenticity_score,
            urgency_level,
            failed_checks,
        }
    }

    /// Missing price or no ceiling both pass.
    fn check_price(&self, deal: &Deal) -> bool {
        match (self.criteria.max_price, deal.price) {
            (Some(max), Some(price)) => price <= max,
            _ => true,
        }
    }

    fn check_discount(&self, deal: &Deal) -> bool {
        match (self.criteria.min_discount_percentage, deal.discount_percentage) {
            (Some(min), Some(d)) => d >= min,
            _ => true,
        }
    }

    fn check_category(&self, deal: &Deal) -> bool {
        if self.criteria.categories.is_empty() {
            return true;
        }
        let category = deal.category.trim().to_lowercase();
        self.criteria
            .categories
            .iter()
            .any(|c| c.trim().to_lowercase() == category)
    }

    fn check_keywords(&self, deal: &Deal) -> bool {
        if self.criteria.keywords.is_empty() {
            return true;
        }
        let text = deal.search_text().to_lowercase();
        self.criteria
            .keywords
            .iter()
            .any(|k| text.contains(&k.trim().to_lowercase()))
    }

    pub fn urgency_level(
        &self,
        deal: &Deal,
        evaluation: &EvaluationResult,
        authenticity_score: f64,
    ) -> UrgencyLevel {
        UrgencyLevel::from_score(urgency_score(deal, evaluation, authenticity_score))
    }
}

/// Additive urgency points; see [`UrgencyLevel::from_score`] for the bands.
pub fn urgency_score(deal: &Deal, evaluation: &EvaluationResult, authenticity_score: f64) -> u32 {
    let mut score = 0;

    match deal.discount_percentage {
        Some(d) if d >= 50.0 => score += 2,
        Some(d) if d >= 30.0 => score += 1,
        _ => {}
    }
    match deal.price {
        Some(p) if p <= 50.0 => score += 2,
        Some(p) if p <= 100.0 => score += 1,
        _ => {}
    }
    if authenticity_score >= 0.8 {
        score += 1;
    }
    if evaluation.confidence_score >= 0.8 {
        score += 1;
    }
    let text = deal.search_text().to_lowercase();
    if URGENCY_KEYWORDS.iter().any(|k| text.contains(k)) {
        score += 1;
    }
    score
}
