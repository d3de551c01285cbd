// src/evaluate/response.rs
//! Judge reply → EvaluationResult.
//!
//! Structured JSON replies are read first (several tolerated shapes); any
//! other text is scored by relevance and confidence indicator words.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use super::EvaluationResult;

const POSITIVE: &[&str] = &[
    "yes",
    "relevant",
    "matches",
    "interested",
    "good deal",
    "recommend",
    "recommended",
];
const NEGATIVE: &[&str] = &[
    "no",
    "not relevant",
    "irrelevant",
    "doesn't match",
    "not interested",
    "poor deal",
    "skip",
];

fn word_regexes(words: &[&str]) -> Vec<Regex> {
    words
        .iter()
        .map(|w| Regex::new(&format!(r"\b{}\b", regex::escape(w))).expect("indicator regex"))
        .collect()
}

static POSITIVE_RES: Lazy<Vec<Regex>> = Lazy::new(|| word_regexes(POSITIVE));
static NEGATIVE_RES: Lazy<Vec<Regex>> = Lazy::new(|| word_regexes(NEGATIVE));

static JSON_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("json block regex"));

/// Models quote scalars freely: `"true"`, `"0.85"`, `"85%"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Num(f64),
    Text(String),
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Loose::deserialize(d)? {
        Loose::Bool(b) => b,
        Loose::Num(n) => n != 0.0,
        Loose::Text(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "relevant"
        ),
    })
}

fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Num(n)) => Some(n),
        Some(Loose::Text(s)) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|p| p / 100.0),
                None => s.parse().ok(),
            }
        }
        Some(Loose::Bool(_)) | None => None,
    })
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(alias = "relevant", deserialize_with = "lenient_bool")]
    is_relevant: bool,
    #[serde(default, alias = "confidence", deserialize_with = "lenient_score")]
    confidence_score: Option<f64>,
    #[serde(default, alias = "reason")]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerdictAny {
    Flat(Verdict),
    Wrapped { evaluation: Verdict },
}

impl VerdictAny {
    fn into_verdict(self) -> Verdict {
        match self {
            VerdictAny::Flat(v) | VerdictAny::Wrapped { evaluation: v } => v,
        }
    }
}

pub fn parse_response(content: &str) -> EvaluationResult {
    if let Some(v) = parse_structured(content) {
        return EvaluationResult::new(
            v.is_relevant,
            v.confidence_score.unwrap_or(0.5),
            v.reasoning.unwrap_or_default(),
        );
    }
    EvaluationResult::new(
        extract_relevance(content),
        extract_confidence(content),
        content.trim(),
    )
}

/// The outermost `{...}` block, fenced in ``` or not.
fn parse_structured(content: &str) -> Option<Verdict> {
    let block = JSON_BLOCK_RE.find(content)?;
    serde_json::from_str::<VerdictAny>(block.as_str())
        .ok()
        .map(VerdictAny::into_verdict)
}

fn count_hits(res: &[Regex], text: &str) -> usize {
    res.iter().filter(|re| re.is_match(text)).count()
}

/// Relevant when positive indicators outnumber negative ones.
pub fn extract_relevance(content: &str) -> bool {
    let lower = content.to_lowercase();
    count_hits(&POSITIVE_RES, &lower) > count_hits(&NEGATIVE_RES, &lower)
}

pub fn extract_confidence(content: &str) -> f64 {
    let lower = content.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if any(&["very confident", "definitely", "absolutely"]) {
        0.9
    } else if any(&["confident", "likely", "probably"]) {
        0.7
    } else if any(&["maybe", "possibly", "uncertain"]) {
        0.4
    } else {
        0.5
    }
}
