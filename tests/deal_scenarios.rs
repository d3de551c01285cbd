// tests/deal_scenarios.rs
// Parse → evaluate → filter behaviour on hand-written entries.
use std::sync::Arc;
use std::time::Duration;

use bargain_watch::config::UserCriteria;
use bargain_watch::evaluate::{EvaluationTier, KeywordFallback, MockJudge, PromptTemplate};
use bargain_watch::filter::{AuthenticityAssessor, FilterCheck};
use bargain_watch::parse::{extract_discount_percentage, extract_prices, DealParser};
use bargain_watch::{DealError, Evaluator, FilterEngine, RawDeal, UrgencyLevel};

fn raw(title: &str, description: &str, node: u32) -> RawDeal {
    RawDeal {
        title: title.into(),
        description: description.into(),
        link: format!("https://www.ozbargain.com.au/node/{node}"),
        pub_date: String::new(),
        category: Some("Computing".into()),
    }
}

#[test]
fn flash_sale_entry() {
    let deal = DealParser::default()
        .parse(&raw(
            "Flash Sale - 50% off, was $200, now $100",
            "Hurry, while stocks last! 20 votes, 5 comments",
            424242,
        ))
        .unwrap();
    assert_eq!(deal.price, Some(100.0));
    assert_eq!(deal.original_price, Some(200.0));
    assert_eq!(deal.discount_percentage, Some(50.0));
    assert!(deal.urgency_indicators.iter().any(|u| u == "flash sale"));
    assert!(deal.urgency_indicators.iter().any(|u| u == "while stocks last"));
    assert_eq!(deal.votes, Some(20));
    assert_eq!(deal.comments, Some(5));
}

#[test]
fn thousands_and_explicit_discount() {
    assert_eq!(extract_prices("Now $1,234.56 shipped").0, Some(1234.56));
    // Stated percentage wins even though the prices imply 50%.
    assert_eq!(
        extract_discount_percentage("15% off, was $200 now $100", Some(100.0), Some(200.0)),
        Some(15.0)
    );
}

#[test]
fn price_above_original_fails_validation_only_then() {
    let parser = DealParser::default();
    let ok = parser.parse(&raw("Monitor", "was $300 now $300", 1)).unwrap();
    assert_eq!(ok.price, ok.original_price);

    let err = parser.parse(&raw("Monitor", "was $300 now $301", 2)).unwrap_err();
    assert!(matches!(err, DealError::PriceAboveOriginal { .. }));
}

#[test]
fn questionable_is_strictly_below_threshold() {
    let a = AuthenticityAssessor::default();
    for (score, threshold) in [(0.0, 0.0), (0.39, 0.4), (0.4, 0.4), (1.0, 0.5), (0.5, 1.0)] {
        assert_eq!(a.is_questionable(score, threshold), score < threshold);
    }
}

#[tokio::test]
async fn failing_judge_without_secondary_uses_keywords() {
    let criteria = UserCriteria {
        keywords: vec!["laptop".into()],
        ..UserCriteria::default()
    };
    let evaluator = Evaluator::new(
        PromptTemplate::default_template(),
        KeywordFallback::new(criteria.keywords.clone()),
        Duration::from_secs(5),
    )
    .with_primary(Arc::new(MockJudge::failing()));

    let deal = DealParser::default()
        .parse(&raw("Mechanical keyboard $89", "Tactile switches, 4 votes", 3))
        .unwrap();
    assert_eq!(deal.category, "Computing");

    let out = evaluator.evaluate(&deal).await;
    assert_eq!(out.tier, EvaluationTier::Keyword);
    assert!(!out.result.is_relevant);
    assert!(out.result.confidence_score <= 0.2);

    let result = FilterEngine::new(criteria).apply(&deal, &out.result);
    assert!(!result.passes_filters);
    assert!(result.failed_checks.contains(&FilterCheck::Keyword));
    assert!(result.failed_checks.contains(&FilterCheck::Judge));
}

#[tokio::test]
async fn expired_deal_never_passes() {
    let evaluator = Evaluator::new(
        PromptTemplate::default_template(),
        KeywordFallback::default(),
        Duration::from_secs(5),
    )
    .with_primary(Arc::new(MockJudge::replying("RELEVANT, definitely")));
    let deal = DealParser::default()
        .parse(&raw("[EXPIRED] Laptop $20 (was $900)", "Huge discount. 90 votes, 40 comments", 4))
        .unwrap();
    let out = evaluator.evaluate(&deal).await;
    assert!(out.result.is_relevant);

    let result = FilterEngine::new(UserCriteria::default()).apply(&deal, &out.result);
    assert!(!result.passes_filters);
    assert_eq!(result.authenticity_score, 0.0);
    assert_eq!(result.urgency_level, UrgencyLevel::Low);
}
