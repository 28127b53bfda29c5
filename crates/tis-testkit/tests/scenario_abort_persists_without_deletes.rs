//! Scenario: a run that fails part-way.
//!
//! GREEN when:
//! - A transport failure on a bulk call aborts the run with a gateway error.
//! - What the remote already confirmed (earlier batches, earlier runs) is
//!   persisted, so it is not resubmitted next time.
//! - No deletions happen on the aborted run, even for indicators that were
//!   not seen before the failure.
//! - A bulk response that does not decode is fatal and not retried.
//! - Dropping an open session without closing it behaves the same way.

use std::collections::BTreeMap;
use tis_graph::GraphError;
use tis_reconcile::{fingerprint, run_session, ReconciliationSession, SyncError};
use tis_testkit::{ip_indicator, noon, test_config, FakeGateway, FakeTokens, ManualClock};

fn persisted(dir: &std::path::Path) -> BTreeMap<String, String> {
    let raw = std::fs::read_to_string(dir.join("existing_indicators_hash.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn bulk_transport_failure_keeps_confirmed_work_and_skips_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.batch_size = 2;
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    // Run 1 knows 1..=4 (bulk calls 1 and 2).
    run_session(&cfg, &gateway, &tokens, &clock, 4, (1..=4).map(ip_indicator)).unwrap();

    // Run 2: feed 5..=8. Call 3 (5,6) succeeds, call 4 (7,8) fails.
    gateway.fail_bulk_call(4);
    let err = run_session(&cfg, &gateway, &tokens, &clock, 4, (5..=8).map(ip_indicator)).unwrap_err();
    assert!(
        matches!(err, SyncError::Gateway(GraphError::Transport(_))),
        "got {err}"
    );

    assert!(gateway.deletes().is_empty(), "no deletions on an aborted run");
    let known = persisted(dir.path());
    assert_eq!(known.len(), 6, "run 1 plus the confirmed batch of run 2");
    for n in 1..=6 {
        assert!(known.contains_key(&fingerprint(&ip_indicator(n))), "missing {n}");
    }
    assert!(!known.contains_key(&fingerprint(&ip_indicator(7))));

    // Run 3 with the same feed only sends what never made it.
    let report = run_session(&cfg, &gateway, &tokens, &clock, 4, (5..=8).map(ip_indicator)).unwrap();
    assert_eq!(report.success, 2);
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.deleted, 4, "1..=4 are finally deleted");
}

#[test]
fn undecodable_bulk_response_is_fatal_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    gateway.garble_bulk_responses();
    let err = run_session(&cfg, &gateway, &tokens, &clock, 3, (1..=3).map(ip_indicator)).unwrap_err();

    assert!(matches!(err, SyncError::Gateway(GraphError::Decode(_))), "got {err}");
    assert_eq!(gateway.bulk_batches(), vec![3], "single attempt");
    assert!(persisted(dir.path()).is_empty());
}

#[test]
fn dropping_an_unclosed_session_persists_without_deleting() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.batch_size = 1;
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 2, (1..=2).map(ip_indicator)).unwrap();

    {
        let mut session = ReconciliationSession::open(&cfg, &gateway, &tokens, &clock, 1).unwrap();
        session.submit(ip_indicator(3)).unwrap();
        assert_eq!(session.pending_deletion().len(), 2);
        // Dropped here without close().
    }

    assert!(gateway.deletes().is_empty());
    let known = persisted(dir.path());
    assert_eq!(known.len(), 3);
    assert!(known.contains_key(&fingerprint(&ip_indicator(3))));
}
