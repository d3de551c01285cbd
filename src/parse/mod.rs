// src/parse/mod.rs
//! RawDeal → Deal.
//!
//! Pulls prices, discount, urgency phrases and community counts out of the
//! entry text, assigns a stable id and runs the business-rule validator.

pub mod price;
pub mod validate;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

use crate::deal::{Deal, DealError, RawDeal, DEFAULT_CATEGORY};
pub use price::{extract_discount_percentage, extract_prices, extract_urgency_indicators};
pub use validate::DealValidator;

pub const CANONICAL_HOST: &str = "ozbargain.com.au";

static VOTE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d+)\s*(?:votes?|ups?)\b",
        r"\bvoted?\s*(\d+)",
        r"\bscore[:\s]*(-?\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("vote regex"))
    .collect()
});

static COMMENT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d+)\s*comments?\b",
        r"(\d+)\s*repl(?:y|ies)\b",
        r"discuss\s*\((\d+)\)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("comment regex"))
    .collect()
});

#[derive(Debug, Clone, Default)]
pub struct DealParser {
    validator: DealValidator,
}

impl DealParser {
    pub fn new(validator: DealValidator) -> Self {
        Self { validator }
    }

    pub fn parse(&self, raw: &RawDeal) -> Result<Deal, DealError> {
        self.parse_at(raw, Utc::now())
    }

    /// Same as [`parse`](Self::parse) with an explicit clock, for tests.
    pub fn parse_at(&self, raw: &RawDeal, now: DateTime<Utc>) -> Result<Deal, DealError> {
        raw.validate()?;

        let text = format!("{} {}", raw.title, raw.description);
        let (price, original_price) = extract_prices(&text);
        let discount_percentage = extract_discount_percentage(&text, price, original_price);
        let urgency_indicators = extract_urgency_indicators(&text);
        let (votes, comments) = extract_community_data(&raw.description);

        let category = raw
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string();

        let timestamp = parse_pub_date(&raw.pub_date).unwrap_or_else(|| {
            if !raw.pub_date.trim().is_empty() {
                warn!(target: "parser", pub_date = %raw.pub_date, "unparseable publication date; using now");
            }
            now
        });

        let deal = Deal {
            id: generate_deal_id(raw),
            title: raw.title.trim().to_string(),
            description: raw.description.trim().to_string(),
            price,
            original_price,
            discount_percentage,
            category,
            url: raw.link.trim().to_string(),
            timestamp,
            votes,
            comments,
            urgency_indicators,
        };

        if let Err(e) = self.validator.validate_at(&deal, now) {
            counter!("deals_rejected_total", "stage" => "parse").increment(1);
            warn!(target: "parser", deal_id = %deal.id, error = %e, "deal failed validation");
            return Err(e);
        }

        counter!("deals_parsed_total").increment(1);
        debug!(
            target: "parser",
            deal_id = %deal.id,
            price = ?deal.price,
            original_price = ?deal.original_price,
            discount = ?deal.discount_percentage,
            votes = ?deal.votes,
            comments = ?deal.comments,
            "deal parsed"
        );
        Ok(deal)
    }
}

/// Node id for canonical-host links (`/node/123456` → `node123456`), else
/// `deal_` + 8 hex chars of SHA-256 over title, link and pub_date.
pub fn generate_deal_id(raw: &RawDeal) -> String {
    if let Some(id) = node_id_from_link(&raw.link) {
        return id;
    }
    let mut hasher = Sha256::new();
    hasher.update(raw.title.as_bytes());
    hasher.update(raw.link.as_bytes());
    hasher.update(raw.pub_date.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("deal_{hex}")
}

/// `host` is `canonical` itself or one of its subdomains.
pub(crate) fn is_canonical_host(host: &str, canonical: &str) -> bool {
    host == canonical
        || host
            .strip_suffix(canonical)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn node_id_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    if !is_canonical_host(url.host_str()?, CANONICAL_HOST) {
        return None;
    }
    for seg in url.path_segments()? {
        if seg.starts_with("node") && seg.len() > 4 {
            return Some(seg.to_string());
        }
        if seg.len() >= 5 && seg.bytes().all(|b| b.is_ascii_digit()) {
            return Some(format!("node{seg}"));
        }
    }
    None
}

/// Lenient publication-date parser: RFC 2822, RFC 3339, then a few naive
/// layouts read as UTC. `None` for empty or unrecognised input.
pub fn parse_pub_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let from_time = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond()));
    if from_time.is_some() {
        return from_time;
    }

    // chrono accepts obsolete zone names ("GMT", "EST") that `time` rejects.
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d %b %Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

/// `(votes, comments)` mentioned in the description, first matching pattern wins.
pub fn extract_community_data(description: &str) -> (Option<i64>, Option<u32>) {
    let lower = description.to_lowercase();
    let votes = VOTE_RES.iter().find_map(|re| {
        re.captures(&lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    });
    let comments = COMMENT_RES.iter().find_map(|re| {
        re.captures(&lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    });
    (votes, comments)
}
