//! Scenario: `tis sync` against a mock token endpoint and indicator API.
//!
//! GREEN when:
//! - Run 1 over {A,B} submits both in one bulk call and prints success=2.
//! - Run 2 over {A} submits nothing and deletes B's remote id.
//! - `tis state show` reports exactly one known indicator afterwards.
//! - `tis audit verify` accepts the audit log the runs produced.

use assert_cmd::prelude::*;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;
use tis_reconcile::{fingerprint, Indicator};

fn indicator_a() -> Value {
    json!({"action": "alert", "targetProduct": "Azure Sentinel", "networkIPv4": "203.0.113.10",
           "lastReportedDateTime": "2026-10-19T08:00:00Z"})
}

fn indicator_b() -> Value {
    json!({"action": "alert", "targetProduct": "Azure Sentinel", "domainName": "evil.example",
           "lastReportedDateTime": "2026-10-19T08:00:00Z"})
}

fn fp(v: Value) -> String {
    fingerprint(&Indicator::from_value(v).unwrap())
}

fn write_feed(path: &Path, items: &[Value]) {
    let lines: Vec<String> = items.iter().map(|v| v.to_string()).collect();
    std::fs::write(path, lines.join("\n")).unwrap();
}

fn tis(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tis").unwrap();
    cmd.current_dir(workdir)
        .env("TIS_CLIENT_ID", "cid")
        .env("TIS_CLIENT_SECRET", "csecret")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn sync_submits_then_deletes_what_left_the_feed() -> anyhow::Result<()> {
    let server = MockServer::start();
    let dir = tempfile::tempdir()?;
    let work = dir.path();

    let token = server.mock(|when, then| {
        when.method(POST).path("/contoso/oauth2/v2.0/token");
        then.status(200)
            .json_body(json!({"token_type": "Bearer", "access_token": "tok-e2e"}));
    });
    let bulk = server.mock(|when, then| {
        when.method(POST)
            .path("/beta/security/tiIndicators/submitTiIndicators")
            .header("Authorization", "Bearer tok-e2e");
        then.status(200).json_body(json!({"value": [
            {"id": "ti-a", "requestHash": fp(indicator_a())},
            {"id": "ti-b", "requestHash": fp(indicator_b())}
        ]}));
    });
    let delete_b = server.mock(|when, then| {
        when.method(DELETE).path("/beta/security/tiIndicators/ti-b");
        then.status(204);
    });

    let config = work.join("sync.yaml");
    std::fs::write(
        &config,
        format!(
            "graph:\n  tenant: contoso\n  base_url: '{base}/beta'\n  authority_base_url: '{base}'\nstate:\n  dir: '{state}'\n  log_dir: '{logs}'\n",
            base = server.base_url(),
            state = work.display(),
            logs = work.join("logs").display(),
        ),
    )?;
    let config_arg = config.to_string_lossy().to_string();

    let feed = work.join("feed.jsonl");
    write_feed(&feed, &[indicator_a(), indicator_b()]);
    tis(work)
        .args(["sync", "--config", &config_arg, "--feed"])
        .arg(&feed)
        .assert()
        .success()
        .stdout(predicate::str::contains("success=2"))
        .stdout(predicate::str::contains("deleted=0"));

    write_feed(&feed, &[indicator_a()]);
    tis(work)
        .args(["sync", "--config", &config_arg, "--feed"])
        .arg(&feed)
        .assert()
        .success()
        .stdout(predicate::str::contains("sent=0"))
        .stdout(predicate::str::contains("unchanged=1"))
        .stdout(predicate::str::contains("deleted=1"));

    token.assert_hits(2);
    bulk.assert_hits(1);
    delete_b.assert_hits(1);

    tis(work)
        .args(["state", "show", "--config", &config_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("origin=loaded"))
        .stdout(predicate::str::contains("known_indicators=1"));

    tis(work)
        .args(["audit", "verify", "--path"])
        .arg(work.join("logs").join("audit.jsonl"))
        .assert()
        .success()
        .stdout(predicate::str::contains("audit_chain=valid lines=1"));

    Ok(())
}

#[test]
fn sync_without_credentials_names_the_missing_env_var() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("sync.yaml");
    std::fs::write(
        &config,
        "graph:\n  tenant: contoso\n  keys_env:\n    client_id: TIS_TEST_UNSET_CLIENT_ID_0f3a\n",
    )?;
    let feed = dir.path().join("feed.jsonl");
    write_feed(&feed, &[indicator_a()]);

    tis(dir.path())
        .args(["sync", "--config"])
        .arg(&config)
        .arg("--feed")
        .arg(&feed)
        .assert()
        .failure()
        .stderr(predicate::str::contains("TIS_TEST_UNSET_CLIENT_ID_0f3a"));

    assert!(!dir.path().join("existing_indicators_hash.json").exists());
    Ok(())
}
