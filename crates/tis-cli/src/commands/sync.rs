use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use tis_graph::{GraphClient, OAuthClient};
use tis_reconcile::{run_session, SystemClock};

use super::feed::load_feed;
use super::load_sync_config;

/// `tis sync`: one reconciliation session over the feed file.
pub fn run(config_paths: &[String], feed_path: &Path, strict_config: bool) -> Result<()> {
    let (loaded, cfg) = load_sync_config(config_paths, strict_config)?;
    let feed = load_feed(feed_path)?;
    info!(
        config_hash = %loaded.config_hash,
        feed = %feed_path.display(),
        indicators = feed.len(),
        "starting sync"
    );

    let gateway = GraphClient::new(&cfg.graph_base_url).context("build graph client")?;
    let tokens = OAuthClient::new(&cfg.authority_base_url).context("build token client")?;

    let total_expected = feed.len() as u64;
    let report = run_session(&cfg, gateway, tokens, SystemClock, total_expected, feed)?;

    println!("config_hash={}", loaded.config_hash);
    println!("total_expected={}", report.total_expected);
    println!("sent={}", report.sent());
    println!("success={}", report.success);
    println!("error={}", report.error);
    println!("unchanged={}", report.unchanged);
    println!("deleted={}", report.deleted);
    println!("delete_failed={}", report.delete_failed);
    println!("audit_failed={}", report.audit_failed);
    println!("elapsed_secs={:.3}", report.elapsed.as_secs_f64());
    Ok(())
}
