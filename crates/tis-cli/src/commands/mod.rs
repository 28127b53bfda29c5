//! Command handler modules for tis-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod feed;
pub mod remote;
pub mod state;
pub mod sync;

use anyhow::{bail, Result};
use std::path::Path;
use tis_audit::VerifyResult;
use tis_config::secrets::{resolve_secrets, ResolvedSecrets};
use tis_config::{LoadedConfig, SyncConfig, UnusedKeyPolicy};
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered YAML, check for unused keys and resolve secrets from env.
pub fn load_sync_config(paths: &[String], strict: bool) -> Result<(LoadedConfig, SyncConfig)> {
    let loaded = load_checked(paths, strict)?;
    let secrets = resolve_secrets(&loaded.config_json)?;
    let cfg = SyncConfig::from_config_json(&loaded.config_json, &secrets)?;
    Ok((loaded, cfg))
}

/// Like [`load_sync_config`] for commands that never talk to the remote:
/// secrets are not required and stay empty.
pub fn load_local_config(paths: &[String]) -> Result<(LoadedConfig, SyncConfig)> {
    let loaded = load_checked(paths, false)?;
    let no_secrets = ResolvedSecrets {
        client_id: String::new(),
        client_secret: String::new(),
    };
    let cfg = SyncConfig::from_config_json(&loaded.config_json, &no_secrets)?;
    Ok((loaded, cfg))
}

fn load_checked(paths: &[String], strict: bool) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = tis_config::load_layered_yaml(&path_refs)?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = tis_config::report_unused_keys(&loaded.config_json, policy)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys the sync does not read");
    }
    Ok(loaded)
}

/// `tis audit verify`: prints the verdict; a broken chain is an error exit.
pub fn audit_verify(path: &Path) -> Result<()> {
    match tis_audit::verify_hash_chain(path)? {
        VerifyResult::Valid { lines } => {
            println!("audit_chain=valid lines={}", lines);
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("audit_chain=broken line={} reason={}", line, reason);
            bail!("audit hash chain broken at line {line}: {reason}")
        }
    }
}
