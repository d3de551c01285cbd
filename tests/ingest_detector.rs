// tests/ingest_detector.rs
use bargain_watch::ingest::feed::read_entries;
use bargain_watch::ingest::DealDetector;
use bargain_watch::parse::DealParser;
use chrono::{TimeZone, Utc};

const FIXTURE: &str = include_str!("fixtures/deals_rss.xml");

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 19, 0, 0, 0).unwrap()
}

#[test]
fn fixture_reads_every_item() {
    let parsed = read_entries(FIXTURE);
    assert!(parsed.error.is_none());
    assert_eq!(parsed.entries.len(), 5);
    assert_eq!(
        parsed.entries[0].description,
        "Was $200, now $100. Hurry, while stocks last! 20 votes, 5 comments"
    );
    assert_eq!(
        parsed.entries[1].category.as_deref(),
        Some("Electronics & Computing")
    );
    assert!(parsed.entries[3].link.is_empty());
}

#[test]
fn first_scan_counts_each_kind_of_skip() {
    let mut det = DealDetector::with_max_age_hours(24);
    let d = det.detect_at(FIXTURE, now());
    assert_eq!(d.entries, 5);
    assert_eq!(d.deals.len(), 2);
    assert_eq!(d.duplicates, 1, "repeated link inside one payload");
    assert_eq!(d.invalid, 1, "entry without link");
    assert_eq!(d.stale, 1, "September entry is outside 24h");
    assert_eq!(det.seen_count(), 2);

    let links: Vec<&str> = d.deals.iter().map(|r| r.link.as_str()).collect();
    assert_eq!(
        links,
        vec![
            "https://www.ozbargain.com.au/node/123456",
            "https://www.ozbargain.com.au/node/223344",
        ]
    );
}

#[test]
fn rescanning_yields_nothing_new() {
    let mut det = DealDetector::with_max_age_hours(24);
    det.detect_at(FIXTURE, now());
    let again = det.detect_at(FIXTURE, now());
    assert!(again.deals.is_empty());
    assert_eq!(again.duplicates, 3);
    assert_eq!(again.stale, 1, "stale entries are never remembered");
}

#[test]
fn without_age_window_old_entries_are_new() {
    let mut det = DealDetector::new();
    let d = det.detect_at(FIXTURE, now());
    assert_eq!(d.deals.len(), 3);
    assert_eq!(d.stale, 0);
    assert!(det.has_seen("https://www.ozbargain.com.au/node/100001"));
}

#[test]
fn truncated_payload_keeps_completed_items() {
    let cut = FIXTURE.find("<title>Entry without a link").unwrap();
    let truncated = format!("{}<title>broken", &FIXTURE[..cut]);
    let mut det = DealDetector::new();
    let d = det.detect_at(&truncated, now());
    // Items before the cut survive; the open item never completes.
    assert_eq!(d.deals.len(), 2);
    assert_eq!(d.duplicates, 1);
}

#[test]
fn detected_entries_parse_into_deals() {
    let mut det = DealDetector::with_max_age_hours(24);
    let parser = DealParser::default();
    let deals: Vec<_> = det
        .detect_at(FIXTURE, now())
        .deals
        .iter()
        .map(|raw| parser.parse_at(raw, now()).expect("valid deal"))
        .collect();

    let laptop = &deals[0];
    assert_eq!(laptop.id, "node123456");
    assert_eq!(laptop.price, Some(100.0));
    assert_eq!(laptop.original_price, Some(200.0));
    assert_eq!(laptop.discount_percentage, Some(50.0));
    assert_eq!(laptop.votes, Some(20));
    assert_eq!(laptop.comments, Some(5));
    assert_eq!(laptop.category, "Computing");
    assert_eq!(
        laptop.timestamp,
        Utc.with_ymd_and_hms(2025, 10, 18, 22, 0, 0).unwrap()
    );

    let phones = &deals[1];
    assert_eq!(phones.id, "node223344");
    assert_eq!(phones.price, Some(149.0));
    assert_eq!(phones.original_price, Some(299.0));
    let disc = phones.discount_percentage.expect("computed discount");
    assert!((disc - 50.2).abs() < 0.05, "got {disc}");
}
