//! Price, discount and urgency extraction from free-form deal text.
//!
//! Every function normalizes its input first (markup stripped, whitespace
//! collapsed), so callers can pass raw feed text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::normalize_text;

/// `1,234.56` or `1234.56`. Alternation order matters: the grouped form wins.
const NUM: &str = r"(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)";

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("price regex"))
        .collect()
}

static ORIGINAL_PRICE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(r"(?i)\(was\s*\$?{NUM}\)"),
        format!(r"(?i)\b(?:was|originally|rrp|retail)\s*:?\s*\$?{NUM}"),
    ])
});

// Priority order; first pattern with a usable match wins.
static CURRENT_PRICE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(r"(?i)\b(?:starting\s+from|from)\s*\$\s*{NUM}"),
        format!(r"(?i)(?:AU\$|\bAUD)\s*{NUM}"),
        format!(r"\${NUM}"),
        format!(r"(?i)\b(?:price|cost|now|sale|deal)\s*:?\s*{NUM}"),
    ])
});

static DISCOUNT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(\d{1,3}(?:\.\d+)?)\s*%\s*(?:off|discount|save)".to_string(),
        r"(?i)\b(?:save|savings?)\s*(\d{1,3}(?:\.\d+)?)\s*%".to_string(),
        r"(?i)\((\d{1,3}(?:\.\d+)?)\s*%\s*off\)".to_string(),
    ])
});

static URGENCY_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(?:limited\s*time|expires?\s*(?:today|tomorrow|soon))\b".to_string(),
        r"(?i)\b(?:hurry|quick|fast|urgent)\b".to_string(),
        r"(?i)\b(?:while\s*stocks?\s*last|limited\s*stock)\b".to_string(),
        r"(?i)\b(?:flash\s*sale|lightning\s*deal)\b".to_string(),
        r"(?i)\bends?\s*(?:in\s*)?\d+\s*(?:hours?|mins?|minutes?)\b".to_string(),
        r"(?i)\bonly\s*\d+\s*(?:left|remaining)\b".to_string(),
    ])
});

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

/// Returns `(current_price, original_price)`.
///
/// The original price ("was $X", "RRP $X") is found first and its match is
/// masked out before searching for the current price, so the same amount is
/// never reported twice.
pub fn extract_prices(text: &str) -> (Option<f64>, Option<f64>) {
    let clean = normalize_text(text);

    let mut original = None;
    let mut masked = clean.clone();
    for re in ORIGINAL_PRICE_RES.iter() {
        if let Some(caps) = re.captures(&clean) {
            if let Some(v) = caps.get(1).and_then(|m| parse_amount(m.as_str())) {
                original = Some(v);
                if let Some(whole) = caps.get(0) {
                    masked = format!("{} {}", &clean[..whole.start()], &clean[whole.end()..]);
                }
                break;
            }
        }
    }

    let mut current = None;
    'patterns: for re in CURRENT_PRICE_RES.iter() {
        for caps in re.captures_iter(&masked) {
            let Some(m) = caps.get(1) else { continue };
            // "Sale 50% off" is a discount, not a price.
            if masked[m.end()..].trim_start().starts_with('%') {
                continue;
            }
            if let Some(v) = parse_amount(m.as_str()) {
                current = Some(v);
                break 'patterns;
            }
        }
    }

    (current, original)
}

/// Stated percentage wins; otherwise derive it from the price pair.
pub fn extract_discount_percentage(
    text: &str,
    current: Option<f64>,
    original: Option<f64>,
) -> Option<f64> {
    let clean = normalize_text(text);
    for re in DISCOUNT_RES.iter() {
        if let Some(v) = re
            .captures(&clean)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        {
            return Some(v.clamp(0.0, 100.0));
        }
    }

    match (current, original) {
        (Some(c), Some(o)) if o > 0.0 && o > c => Some(round1((o - c) / o * 100.0)),
        _ => None,
    }
}

/// All urgency phrases, lower-cased, de-duplicated in first-seen order.
pub fn extract_urgency_indicators(text: &str) -> Vec<String> {
    let clean = normalize_text(text);
    let mut out: Vec<String> = Vec::new();
    for re in URGENCY_RES.iter() {
        for m in re.find_iter(&clean) {
            let phrase = m.as_str().trim().to_lowercase();
            if !phrase.is_empty() && !out.contains(&phrase) {
                out.push(phrase);
            }
        }
    }
    out
}

pub(crate) fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_separator_is_stripped() {
        let (price, _) = extract_prices("Gaming laptop now only $1,234.56 delivered");
        assert_eq!(price, Some(1234.56));
        let (price, _) = extract_prices("Monitor $1234.56");
        assert_eq!(price, Some(1234.56));
    }

    #[test]
    fn original_price_is_not_reused_as_current() {
        let (price, original) = extract_prices("Flash Sale - 50% off, was $200, now $100");
        assert_eq!(original, Some(200.0));
        assert_eq!(price, Some(100.0));
    }

    #[test]
    fn priority_from_beats_bare_dollar() {
        let (price, _) = extract_prices("Bundle $10 shipping, starting from $499");
        assert_eq!(price, Some(499.0));
    }

    #[test]
    fn aud_prefix_and_keyword_forms() {
        assert_eq!(extract_prices("Headphones AUD 89.95").0, Some(89.95));
        assert_eq!(extract_prices("Headphones AU$89").0, Some(89.0));
        assert_eq!(extract_prices("Price: 45.50 at the usual place").0, Some(45.5));
        assert_eq!(extract_prices("Flash Sale 50% off everything").0, None);
    }

    #[test]
    fn rrp_and_parenthesised_was() {
        assert_eq!(extract_prices("Kettle $39 (was $79)").1, Some(79.0));
        assert_eq!(extract_prices("Kettle $39 RRP $79").1, Some(79.0));
        assert_eq!(extract_prices("Kettle $39 RRP $79").0, Some(39.0));
    }

    #[test]
    fn explicit_discount_wins_over_price_pair() {
        let d = extract_discount_percentage("Now 30% off", Some(50.0), Some(100.0));
        assert_eq!(d, Some(30.0));
        let d = extract_discount_percentage("Save 15% storewide", None, None);
        assert_eq!(d, Some(15.0));
        let d = extract_discount_percentage("Bonus (40% off)", None, None);
        assert_eq!(d, Some(40.0));
    }

    #[test]
    fn discount_is_clamped_and_derived() {
        assert_eq!(
            extract_discount_percentage("150% off!?", None, None),
            Some(100.0)
        );
        assert_eq!(
            extract_discount_percentage("no stated discount", Some(66.0), Some(99.0)),
            Some(33.3)
        );
        assert_eq!(
            extract_discount_percentage("no stated discount", Some(99.0), Some(99.0)),
            None
        );
    }

    #[test]
    fn urgency_phrases_are_lowercased_and_deduped() {
        let got = extract_urgency_indicators(
            "FLASH SALE! Hurry, while stocks last. Flash sale ends in 3 hours, only 5 left",
        );
        assert_eq!(
            got,
            vec![
                "hurry",
                "while stocks last",
                "flash sale",
                "ends in 3 hours",
                "only 5 left"
            ]
        );
    }

    #[test]
    fn urgency_words_need_boundaries() {
        assert!(extract_urgency_indicators("Breakfast cereal $3").is_empty());
    }

    #[test]
    fn markup_is_ignored() {
        let (price, original) = extract_prices("<p>Now <b>$19.99</b> (was $29.99)</p>");
        assert_eq!(price, Some(19.99));
        assert_eq!(original, Some(29.99));
    }
}
