// src/evaluate/fallback.rs
//! Keyword heuristic used when no judge produced an answer.

use super::EvaluationResult;
use crate::config::UserCriteria;
use crate::deal::Deal;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("computing", &["laptop", "computer", "pc", "cpu", "gpu"]),
    ("electronics", &["phone", "tablet", "camera", "headphones"]),
    ("gaming", &["game", "console", "xbox", "playstation", "nintendo"]),
];

const PER_MATCH: f64 = 0.15;
const MAX_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Default)]
pub struct KeywordFallback {
    keywords: Vec<String>,
}

impl KeywordFallback {
    pub fn new(keywords: impl IntoIterator<Item = String>) -> Self {
        let mut out: Vec<String> = Vec::new();
        for k in keywords {
            let k = k.trim().to_lowercase();
            if !k.is_empty() && !out.contains(&k) {
                out.push(k);
            }
        }
        Self { keywords: out }
    }

    /// User keywords plus fixed expansions for known categories.
    pub fn from_criteria(criteria: &UserCriteria) -> Self {
        let expanded = criteria.categories.iter().flat_map(|c| {
            let c = c.trim().to_lowercase();
            CATEGORY_KEYWORDS
                .iter()
                .find(|(name, _)| *name == c)
                .map(|(_, words)| words.iter().map(|w| w.to_string()).collect::<Vec<_>>())
                .unwrap_or_default()
        });
        Self::new(criteria.keywords.iter().cloned().chain(expanded))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn evaluate(&self, deal: &Deal, why: &str) -> EvaluationResult {
        let text = format!("{} {}", deal.search_text(), deal.category).to_lowercase();
        let matched: Vec<&str> = self
            .keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .map(String::as_str)
            .collect();

        let confidence = (matched.len() as f64 * PER_MATCH).min(MAX_CONFIDENCE);
        let reasoning = if matched.is_empty() {
            format!("Degraded evaluation ({why}): keyword fallback found no matching keywords")
        } else {
            format!(
                "Degraded evaluation ({why}): keyword fallback matched {}: {}",
                matched.len(),
                matched.join(", ")
            )
        };
        EvaluationResult::new(!matched.is_empty(), confidence, reasoning)
    }
}
