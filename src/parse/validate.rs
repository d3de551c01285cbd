// src/parse/validate.rs
//! Business-rule checks run on every parsed deal.
//!
//! Hard failures come back as `DealError`; soft problems (odd host, stated
//! discount that disagrees with the prices, old timestamp) are only logged.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use url::Url;

use super::price::round1;
use super::{is_canonical_host, CANONICAL_HOST};
use crate::deal::{Deal, DealError};

/// Percentage points a stated discount may differ from the computed one.
const DISCOUNT_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct DealValidator {
    pub canonical_host: String,
    pub max_future_skew: Duration,
    pub stale_after: Duration,
}

impl Default for DealValidator {
    fn default() -> Self {
        Self {
            canonical_host: CANONICAL_HOST.to_string(),
            max_future_skew: Duration::days(1),
            stale_after: Duration::days(30),
        }
    }
}

impl DealValidator {
    pub fn validate(&self, deal: &Deal) -> Result<(), DealError> {
        self.validate_at(deal, Utc::now())
    }

    pub fn validate_at(&self, deal: &Deal, now: DateTime<Utc>) -> Result<(), DealError> {
        deal.validate()?;
        self.check_discount_consistency(deal);
        self.check_host(deal);
        self.check_timestamp(deal.timestamp, now, &deal.id)
    }

    fn check_discount_consistency(&self, deal: &Deal) {
        let (Some(price), Some(original), Some(stated)) =
            (deal.price, deal.original_price, deal.discount_percentage)
        else {
            return;
        };
        if original <= 0.0 {
            return;
        }
        let computed = round1((original - price) / original * 100.0);
        if (computed - stated).abs() > DISCOUNT_TOLERANCE {
            warn!(
                target: "parser",
                deal_id = %deal.id,
                stated,
                computed,
                "stated discount disagrees with prices"
            );
        }
    }

    fn check_host(&self, deal: &Deal) {
        let host = Url::parse(&deal.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
        match host {
            Some(h) if is_canonical_host(&h, &self.canonical_host) => {}
            other => warn!(
                target: "parser",
                deal_id = %deal.id,
                host = ?other,
                expected = %self.canonical_host,
                "deal link is not on the canonical host"
            ),
        }
    }

    fn check_timestamp(
        &self,
        ts: DateTime<Utc>,
        now: DateTime<Utc>,
        deal_id: &str,
    ) -> Result<(), DealError> {
        if ts > now + self.max_future_skew {
            return Err(DealError::TimestampInFuture(ts));
        }
        if ts < now - self.stale_after {
            warn!(target: "parser", %deal_id, timestamp = %ts, "deal timestamp is very old");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::tests::sample_deal;

    #[test]
    fn future_timestamps_beyond_a_day_are_rejected() {
        let v = DealValidator::default();
        let now = Utc::now();
        let mut d = sample_deal();

        d.timestamp = now + Duration::hours(23);
        assert!(v.validate_at(&d, now).is_ok());

        d.timestamp = now + Duration::days(2);
        assert!(matches!(
            v.validate_at(&d, now),
            Err(DealError::TimestampInFuture(_))
        ));
    }

    #[test]
    fn soft_problems_do_not_reject() {
        let v = DealValidator::default();
        let now = Utc::now();
        let mut d = sample_deal();
        d.url = "https://shop.example.com/item".into();
        d.discount_percentage = Some(20.0); // prices say 50%
        d.timestamp = now - Duration::days(90);
        assert!(v.validate_at(&d, now).is_ok());
    }

    #[test]
    fn structural_errors_propagate() {
        let v = DealValidator::default();
        let mut d = sample_deal();
        d.price = Some(-1.0);
        assert_eq!(v.validate(&d), Err(DealError::Negative("price")));
    }
}
