//! deal.rs: raw feed entries and structured offers.
//!
//! `RawDeal` is what the detector pulls out of a feed; `Deal` is what the parser
//! builds from it. Both validate themselves structurally; business rules that
//! depend on the clock live in `parse::validate`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;
pub const MAX_CATEGORY_CHARS: usize = 100;
pub const DEFAULT_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DealError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("{field} too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },
    #[error("{0} cannot be negative")]
    Negative(&'static str),
    #[error("discount percentage must be between 0 and 100, got {0}")]
    DiscountOutOfRange(f64),
    #[error("price {price} is higher than original price {original}")]
    PriceAboveOriginal { price: f64, original: f64 },
    #[error("timestamp too far in future: {0}")]
    TimestampInFuture(DateTime<Utc>),
}

/// One feed entry, as read from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDeal {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: String,
    pub category: Option<String>,
}

impl RawDeal {
    pub fn validate(&self) -> Result<(), DealError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("link", &self.link)?;
        if !is_http_url(&self.link) {
            return Err(DealError::InvalidUrl(self.link.clone()));
        }
        check_len("title", &self.title, MAX_TITLE_CHARS)?;
        check_len("description", &self.description, MAX_DESCRIPTION_CHARS)?;
        Ok(())
    }
}

/// A validated offer. Built once by the parser and read by every later stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub category: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    /// Net community score; may be negative.
    pub votes: Option<i64>,
    pub comments: Option<u32>,
    pub urgency_indicators: Vec<String>,
}

impl Deal {
    pub fn validate(&self) -> Result<(), DealError> {
        require_text("id", &self.id)?;
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("category", &self.category)?;
        require_text("url", &self.url)?;
        if !is_http_url(&self.url) {
            return Err(DealError::InvalidUrl(self.url.clone()));
        }

        if self.price.is_some_and(|p| p < 0.0) {
            return Err(DealError::Negative("price"));
        }
        if self.original_price.is_some_and(|p| p < 0.0) {
            return Err(DealError::Negative("original price"));
        }
        if let Some(d) = self.discount_percentage {
            if !(0.0..=100.0).contains(&d) {
                return Err(DealError::DiscountOutOfRange(d));
            }
        }
        if let (Some(price), Some(original)) = (self.price, self.original_price) {
            if price > original {
                return Err(DealError::PriceAboveOriginal { price, original });
            }
        }

        check_len("title", &self.title, MAX_TITLE_CHARS)?;
        check_len("description", &self.description, MAX_DESCRIPTION_CHARS)?;
        check_len("category", &self.category, MAX_CATEGORY_CHARS)?;
        Ok(())
    }

    /// Title and description joined, the text most checks run against.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Absolute http(s) URL with a host.
pub fn is_http_url(s: &str) -> bool {
    match Url::parse(s.trim()) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), DealError> {
    if value.trim().is_empty() {
        Err(DealError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), DealError> {
    if value.chars().count() > max {
        Err(DealError::TooLong { field, max })
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_deal() -> Deal {
        Deal {
            id: "node123456".into(),
            title: "Test Deal".into(),
            description: "Test description".into(),
            price: Some(100.0),
            original_price: Some(200.0),
            discount_percentage: Some(50.0),
            category: "Computing".into(),
            url: "https://www.ozbargain.com.au/node/123456".into(),
            timestamp: Utc::now(),
            votes: Some(10),
            comments: Some(5),
            urgency_indicators: vec![],
        }
    }

    #[test]
    fn raw_deal_rejects_empty_and_malformed_links() {
        let mut raw = RawDeal {
            title: "Cheap SSD".into(),
            description: "1TB for $59".into(),
            link: "https://www.ozbargain.com.au/node/1".into(),
            pub_date: String::new(),
            category: None,
        };
        assert!(raw.validate().is_ok());

        raw.link = "not a url".into();
        assert!(matches!(raw.validate(), Err(DealError::InvalidUrl(_))));

        raw.link = "ftp://example.com/x".into();
        assert!(matches!(raw.validate(), Err(DealError::InvalidUrl(_))));

        raw.link = "   ".into();
        assert_eq!(raw.validate(), Err(DealError::EmptyField("link")));
    }

    #[test]
    fn price_consistency_is_enforced() {
        let mut d = sample_deal();
        assert!(d.validate().is_ok());

        d.price = Some(250.0);
        assert!(matches!(
            d.validate(),
            Err(DealError::PriceAboveOriginal { .. })
        ));

        d.price = Some(200.0);
        assert!(d.validate().is_ok(), "equal prices are allowed");
    }

    #[test]
    fn discount_bounds_and_lengths() {
        let mut d = sample_deal();
        d.discount_percentage = Some(101.0);
        assert!(matches!(
            d.validate(),
            Err(DealError::DiscountOutOfRange(_))
        ));

        let mut d = sample_deal();
        d.title = "x".repeat(MAX_TITLE_CHARS + 1);
        assert_eq!(
            d.validate(),
            Err(DealError::TooLong {
                field: "title",
                max: MAX_TITLE_CHARS
            })
        );
    }

    #[test]
    fn negative_votes_are_a_valid_net_score() {
        let mut d = sample_deal();
        d.votes = Some(-4);
        assert!(d.validate().is_ok());
    }
}
