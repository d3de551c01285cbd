// src/ingest/detector.rs
//! New-entry detection across polls.
//!
//! Remembers every link it has emitted and only yields entries it has not
//! seen before. A link is remembered only once its entry validated, so a
//! broken entry gets another chance on the next poll.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use tracing::{debug, warn};

use super::feed::{read_entries, FeedEntry};
use crate::deal::RawDeal;
use crate::parse::parse_pub_date;

/// What one payload yielded.
#[derive(Debug, Default)]
pub struct Detection {
    pub deals: Vec<RawDeal>,
    pub entries: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub invalid: usize,
}

#[derive(Debug, Default)]
pub struct DealDetector {
    seen: HashSet<String>,
    max_age: Option<Duration>,
}

impl DealDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries published more than `hours` ago are skipped (and not remembered).
    pub fn with_max_age_hours(hours: u32) -> Self {
        Self {
            seen: HashSet::new(),
            max_age: Some(Duration::hours(i64::from(hours))),
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, link: &str) -> bool {
        self.seen.contains(link.trim())
    }

    pub fn detect_new_deals(&mut self, payload: &str) -> Vec<RawDeal> {
        self.detect(payload).deals
    }

    pub fn detect(&mut self, payload: &str) -> Detection {
        self.detect_at(payload, Utc::now())
    }

    pub fn detect_at(&mut self, payload: &str, now: DateTime<Utc>) -> Detection {
        let t0 = std::time::Instant::now();
        let parsed = read_entries(payload);
        if let Some(err) = &parsed.error {
            warn!(
                target: "ingest",
                error = %err,
                recovered = parsed.entries.len(),
                "feed payload malformed; keeping entries read so far"
            );
            counter!("ingest_parse_errors_total").increment(1);
        }

        let mut out = Detection {
            entries: parsed.entries.len(),
            ..Detection::default()
        };

        for entry in parsed.entries {
            let link = entry.link.trim().to_string();
            if link.is_empty() {
                out.invalid += 1;
                debug!(target: "ingest", title = %entry.title, "entry without link skipped");
                continue;
            }
            if self.seen.contains(&link) {
                out.duplicates += 1;
                continue;
            }
            if self.is_stale(&entry, now) {
                out.stale += 1;
                debug!(target: "ingest", %link, published = %entry.published, "entry older than age window");
                continue;
            }

            let raw = to_raw_deal(entry, link.clone());
            match raw.validate() {
                Ok(()) => {
                    self.seen.insert(link);
                    out.deals.push(raw);
                }
                Err(e) => {
                    out.invalid += 1;
                    warn!(target: "ingest", %link, error = %e, "invalid feed entry skipped");
                }
            }
        }

        counter!("ingest_entries_total").increment(out.entries as u64);
        counter!("ingest_duplicates_total").increment(out.duplicates as u64);
        counter!("ingest_invalid_entries_total").increment(out.invalid as u64);
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1000.0);
        debug!(
            target: "ingest",
            entries = out.entries,
            new = out.deals.len(),
            duplicates = out.duplicates,
            stale = out.stale,
            invalid = out.invalid,
            "payload scanned"
        );
        out
    }

    fn is_stale(&self, entry: &FeedEntry, now: DateTime<Utc>) -> bool {
        let Some(max_age) = self.max_age else {
            return false;
        };
        parse_pub_date(&entry.published).is_some_and(|ts| now - ts > max_age)
    }
}

fn to_raw_deal(entry: FeedEntry, link: String) -> RawDeal {
    RawDeal {
        title: entry.title,
        description: entry.description,
        link,
        pub_date: entry.published,
        category: entry.category,
    }
}
