//! Scenario: indicators that leave the feed are deleted remotely.
//!
//! GREEN when:
//! - Feed {A,B,C} then {A,C}: exactly B's remote id is deleted and the
//!   persisted map holds exactly {A,C}.
//! - A 404 on delete counts as deleted (already gone).
//! - Any other HTTP status is counted as a failed delete, but the entry is
//!   still dropped from the map.
//! - A transport failure mid-deletion aborts the run and keeps the entry,
//!   so the next run retries it.

use std::collections::{BTreeMap, BTreeSet};
use tis_reconcile::{fingerprint, run_session, Indicator, SyncError};
use tis_testkit::{ip_indicator, noon, test_config, FakeGateway, FakeTokens, ManualClock};

fn a() -> Indicator {
    ip_indicator(1)
}
fn b() -> Indicator {
    ip_indicator(2)
}
fn c() -> Indicator {
    ip_indicator(3)
}

fn persisted(dir: &std::path::Path) -> BTreeMap<String, String> {
    let raw = std::fs::read_to_string(dir.join("existing_indicators_hash.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn dropped_indicator_is_deleted_and_forgotten() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 3, vec![a(), b(), c()]).unwrap();
    let b_id = persisted(dir.path())[&fingerprint(&b())].clone();

    clock.advance(chrono::Duration::days(1));
    let report = run_session(&cfg, &gateway, &tokens, &clock, 2, vec![a(), c()]).unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.delete_failed, 0);
    assert_eq!(report.sent(), 0);
    assert_eq!(gateway.deletes(), vec![b_id.clone()]);
    assert!(!gateway.remote_ids().contains(&b_id));

    let expected: BTreeSet<String> = [fingerprint(&a()), fingerprint(&c())].into_iter().collect();
    assert_eq!(persisted(dir.path()).keys().cloned().collect::<BTreeSet<_>>(), expected);
}

#[test]
fn empty_feed_deletes_everything_known() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 3, vec![a(), b(), c()]).unwrap();
    let report = run_session(&cfg, &gateway, &tokens, &clock, 0, Vec::new()).unwrap();

    assert_eq!(report.deleted, 3);
    assert_eq!(gateway.remote_len(), 0);
    assert!(persisted(dir.path()).is_empty());
    assert_eq!(gateway.bulk_batches(), vec![3], "no bulk call for an empty run");
}

#[test]
fn already_gone_counts_as_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 2, vec![a(), b()]).unwrap();
    let b_id = persisted(dir.path())[&fingerprint(&b())].clone();
    gateway.delete_answers(&b_id, 404);

    let report = run_session(&cfg, &gateway, &tokens, &clock, 1, vec![a()]).unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.delete_failed, 0);
    assert!(!persisted(dir.path()).contains_key(&fingerprint(&b())));
}

#[test]
fn refused_delete_is_counted_but_still_forgotten() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 2, vec![a(), b()]).unwrap();
    let b_id = persisted(dir.path())[&fingerprint(&b())].clone();
    gateway.delete_answers(&b_id, 500);

    let report = run_session(&cfg, &gateway, &tokens, &clock, 1, vec![a()]).unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.delete_failed, 1);
    assert!(!persisted(dir.path()).contains_key(&fingerprint(&b())));

    // Not retried on the next run.
    let again = run_session(&cfg, &gateway, &tokens, &clock, 1, vec![a()]).unwrap();
    assert_eq!(again.deleted + again.delete_failed, 0);
    assert_eq!(gateway.deletes(), vec![b_id]);
}

#[test]
fn transport_failure_during_deletion_keeps_entry_for_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let gateway = FakeGateway::new();
    let tokens = FakeTokens::new();
    let clock = ManualClock::at(noon(2026, 10, 19));

    run_session(&cfg, &gateway, &tokens, &clock, 3, vec![a(), b(), c()]).unwrap();
    gateway.fail_delete_call(1);

    let err = run_session(&cfg, &gateway, &tokens, &clock, 1, vec![a()]).unwrap_err();
    assert!(matches!(err, SyncError::Gateway(_)), "got {err}");

    // Neither stale entry was confirmed gone; both survive for the retry.
    let after_abort = persisted(dir.path());
    assert!(after_abort.contains_key(&fingerprint(&b())));
    assert!(after_abort.contains_key(&fingerprint(&c())));

    let report = run_session(&cfg, &gateway, &tokens, &clock, 1, vec![a()]).unwrap();
    assert_eq!(report.deleted, 2);
    assert_eq!(persisted(dir.path()).len(), 1);
    assert_eq!(gateway.remote_len(), 1);
}
