//! tis-testkit
//!
//! In-process fakes for driving a sync session without a network:
//! - `FakeGateway`: in-memory remote indicator store with failure injection
//! - `FakeTokens`: token source that counts exchanges
//! - `ManualClock`: clock the test advances by hand
//! - `test_config`: a `SyncConfig` rooted in a temp directory

mod fakes;

pub use fakes::{FakeGateway, FakeTokens, ManualClock};

use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use tis_config::{SyncConfig, DEFAULT_AUTHORITY_BASE_URL, DEFAULT_GRAPH_BASE_URL};
use tis_graph::Indicator;

/// Config with state in `dir` and the audit log in `dir/logs`.
pub fn test_config(dir: &Path) -> SyncConfig {
    SyncConfig {
        tenant: "contoso.example".to_string(),
        client_id: "test-client-id".to_string(),
        client_secret: "test-client-secret".to_string(),
        days_to_expire: 30,
        verbose_log: false,
        batch_size: 100,
        state_dir: dir.to_path_buf(),
        log_dir: dir.join("logs"),
        graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
        authority_base_url: DEFAULT_AUTHORITY_BASE_URL.to_string(),
        token_lifetime_secs: 3500,
    }
}

/// A network indicator for `203.0.113.<n % 256>`, distinct per `n`.
pub fn ip_indicator(n: u32) -> Indicator {
    Indicator::new()
        .with("action", "alert")
        .with("targetProduct", "Azure Sentinel")
        .with("threatType", "WatchList")
        .with("tlpLevel", "amber")
        .with("description", format!("misp event attribute {n}"))
        .with("networkIPv4", format!("203.0.113.{}", n % 256))
        .with("externalId", format!("attr-{n}"))
        .with("lastReportedDateTime", "2026-10-19T08:00:00Z")
}

/// Noon UTC on the given day.
pub fn noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .unwrap_or_default()
}
