//! Feed fetching over HTTP: retries, failure accounting, the per-feed
//! breaker and change detection.

use std::time::Duration;

use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bargain_watch::breaker::{BreakerSettings, BreakerState};
use bargain_watch::http::HttpError;
use bargain_watch::ingest::{FeedPoller, FetchError, PollerSettings};

const FIXTURE: &str = include_str!("fixtures/deals_rss.xml");

fn settings(max_retries: u32) -> PollerSettings {
    PollerSettings {
        interval: Duration::from_secs(60),
        timeout: Duration::from_secs(5),
        max_retries,
        retry_backoff: Duration::from_millis(10),
        breaker: BreakerSettings {
            failure_threshold: 3,
            recovery_secs: 3600,
        },
    }
}

#[tokio::test]
async fn fetch_returns_body_and_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&server)
        .await;

    let mut poller = FeedPoller::new(&format!("{}/feed", server.uri()), &settings(0)).unwrap();
    let body = poller.fetch().await.expect("fetched");
    assert!(body.contains("Flash Sale"));
    assert!(poller.state().last_poll.is_some());
    assert_eq!(poller.state().consecutive_failures, 0);
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .mount(&server)
        .await;

    let mut poller = FeedPoller::new(&format!("{}/feed", server.uri()), &settings(2)).unwrap();
    assert!(poller.fetch().await.is_ok());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn not_found_fails_without_retry_and_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut poller = FeedPoller::new(&format!("{}/feed", server.uri()), &settings(3)).unwrap();
    let err = poller.fetch().await.unwrap_err();
    match err {
        FetchError::Http(e) => assert_eq!(e.status().map(|s| s.as_u16()), Some(404)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(poller.state().consecutive_failures, 1);
    assert!(poller.state().last_poll.is_none(), "failures do not stamp last_poll");
    assert!(poller.is_healthy());
}

#[tokio::test]
async fn breaker_opens_and_poller_turns_unhealthy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    // max_retries = 2 → unhealthy at 4 consecutive failures; breaker at 3.
    let mut poller = FeedPoller::new(&format!("{}/feed", server.uri()), &settings(2)).unwrap();
    for _ in 0..3 {
        assert!(matches!(poller.fetch().await, Err(FetchError::Http(HttpError::Status(_)))));
    }
    assert_eq!(poller.breaker_state(), BreakerState::Open);
    assert!(poller.is_healthy());

    let err = poller.fetch().await.unwrap_err();
    assert!(matches!(err, FetchError::CircuitOpen(_)));
    assert_eq!(
        poller.state().consecutive_failures,
        3,
        "skipped fetches are not failures"
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn unchanged_payload_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .mount(&server)
        .await;

    let mut poller = FeedPoller::new(&format!("{}/feed", server.uri()), &settings(0)).unwrap();
    let first = poller.fetch().await.unwrap();
    assert!(poller.has_changed(&first));
    let second = poller.fetch().await.unwrap();
    assert!(!poller.has_changed(&second));
}
