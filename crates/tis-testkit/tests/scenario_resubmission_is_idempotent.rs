//! Scenario: re-running the same feed sends nothing.
//!
//! GREEN when:
//! - Run 1 submits every indicator once and records fingerprint -> remote id.
//! - Run 2 over the same feed makes zero bulk calls and zero deletes.
//! - A feed whose only change is `lastReportedDateTime` is still "the same".
//! - An indicator repeated inside one run is submitted once.

use tis_reconcile::{fingerprint, run_session, Indicator};
use tis_testkit::{ip_indicator, noon, test_config, FakeGateway, FakeTokens, ManualClock};

fn feed() -> Vec<Indicator> {
    (1..=3).map(ip_indicator).collect()
}

#[test]
fn second_run_over_same_feed_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    let first = run_session(&cfg, &gateway, &tokens, &clock, 3, feed()).unwrap();
    assert_eq!(first.success, 3);
    assert_eq!(first.error, 0);
    assert_eq!(gateway.bulk_batches(), vec![3]);
    assert_eq!(gateway.remote_len(), 3);

    clock.advance(chrono::Duration::hours(6));
    let second = run_session(&cfg, &gateway, &tokens, &clock, 3, feed()).unwrap();
    assert_eq!(second.sent(), 0, "nothing new to send");
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.deleted, 0);
    assert_eq!(gateway.bulk_batches(), vec![3], "no second bulk call");
    assert!(gateway.deletes().is_empty());
    assert_eq!(gateway.remote_len(), 3);
}

#[test]
fn last_reported_change_is_not_a_new_indicator() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 3, feed()).unwrap();

    let refreshed: Vec<Indicator> = feed()
        .into_iter()
        .map(|i| i.with("lastReportedDateTime", "2026-10-20T08:00:00Z"))
        .collect();
    clock.advance(chrono::Duration::days(1));
    let report = run_session(&cfg, &gateway, &tokens, &clock, 3, refreshed).unwrap();

    assert_eq!(report.sent(), 0);
    assert_eq!(gateway.submitted_total(), 3);
}

#[test]
fn submitted_indicators_carry_their_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 3, feed()).unwrap();

    let expected: std::collections::BTreeSet<String> = feed().iter().map(fingerprint).collect();
    assert_eq!(gateway.remote_request_hashes(), expected);

    let state = std::fs::read_to_string(dir.path().join("existing_indicators_hash.json")).unwrap();
    let known: std::collections::BTreeMap<String, String> = serde_json::from_str(&state).unwrap();
    assert_eq!(known.keys().cloned().collect::<std::collections::BTreeSet<_>>(), expected);
    assert!(known.values().all(|id| id.starts_with("ti-")));
}

#[test]
fn duplicate_within_one_run_is_sent_once() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    let feed = vec![ip_indicator(7), ip_indicator(8), ip_indicator(7)];
    let report = run_session(&cfg, &gateway, &tokens, &clock, 3, feed).unwrap();

    assert_eq!(report.success, 2);
    assert_eq!(report.unchanged, 1);
    assert_eq!(gateway.submitted_total(), 2);
}
