//! tis-config
//!
//! Layered YAML configuration for the indicator sync.
//!
//! - Docs are merged in order: earlier docs are base, later docs override.
//! - The merged document is hashed (SHA-256 over canonical JSON) so every run
//!   can log which configuration it used.
//! - Literal secrets are rejected; YAML stores env var NAMES only and
//!   [`secrets::resolve_secrets`] turns them into values once at startup.
//! - [`SyncConfig`] is the explicit struct handed to the session constructor.

pub mod secrets;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use secrets::ResolvedSecrets;

/// Known secret-like prefixes. If any leaf string value in the effective config
/// starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "eyJ0eX",     // JWT / bearer token
];

/// Hard cap on the bulk-submit batch; the remote endpoint accepts at most 100.
pub const MAX_BATCH_SIZE: usize = 100;

pub const DEFAULT_DAYS_TO_EXPIRE: i64 = 30;
/// Ten years; keeps the expiration date well inside the calendar range.
pub const MAX_DAYS_TO_EXPIRE: i64 = 3650;
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3500;
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/beta";
pub const DEFAULT_AUTHORITY_BASE_URL: &str = "https://login.microsoftonline.com";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// JSON-pointer prefixes the sync actually reads. Keep in step with
/// [`SyncConfig::from_config_json`] and [`secrets::resolve_secrets`].
pub const CONSUMED_POINTERS: &[&str] = &[
    "/graph/tenant",
    "/graph/keys_env/client_id",
    "/graph/keys_env/client_secret",
    "/graph/base_url",
    "/graph/authority_base_url",
    "/graph/token_lifetime_secs",
    "/sync/days_to_expire",
    "/sync/verbose_log",
    "/sync/batch_size",
    "/state/dir",
    "/state/log_dir",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Report config leaves that no part of the sync reads.
/// With `UnusedKeyPolicy::Fail` a non-clean report is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<&str> = CONSUMED_POINTERS.iter().copied().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers
        );
    }

    Ok(report)
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Everything one sync run needs, resolved up front.
/// **Secret values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct SyncConfig {
    pub tenant: String,
    pub client_id: String,
    pub client_secret: String,
    pub days_to_expire: i64,
    pub verbose_log: bool,
    pub batch_size: usize,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub graph_base_url: String,
    pub authority_base_url: String,
    pub token_lifetime_secs: i64,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("tenant", &self.tenant)
            .field("client_id", &"<REDACTED>")
            .field("client_secret", &"<REDACTED>")
            .field("days_to_expire", &self.days_to_expire)
            .field("verbose_log", &self.verbose_log)
            .field("batch_size", &self.batch_size)
            .field("state_dir", &self.state_dir)
            .field("log_dir", &self.log_dir)
            .field("graph_base_url", &self.graph_base_url)
            .field("authority_base_url", &self.authority_base_url)
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .finish()
    }
}

impl SyncConfig {
    /// Build from the merged config JSON plus secrets already resolved from env.
    ///
    /// Required:
    /// - graph.tenant
    ///
    /// Optional (defaults in parentheses):
    /// - sync.days_to_expire (30), sync.verbose_log (false), sync.batch_size (100)
    /// - state.dir ("."), state.log_dir ("logs")
    /// - graph.base_url, graph.authority_base_url, graph.token_lifetime_secs (3500)
    pub fn from_config_json(cfg: &Value, secrets: &ResolvedSecrets) -> Result<Self> {
        let tenant = cfg
            .pointer("/graph/tenant")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .context("config missing graph.tenant")?;

        let days_to_expire = read_i64(cfg, "/sync/days_to_expire")?.unwrap_or(DEFAULT_DAYS_TO_EXPIRE);
        if !(1..=MAX_DAYS_TO_EXPIRE).contains(&days_to_expire) {
            return Err(anyhow!(
                "sync.days_to_expire must be between 1 and {MAX_DAYS_TO_EXPIRE} (got {days_to_expire})"
            ));
        }

        let verbose_log = match cfg.pointer("/sync/verbose_log") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => return Err(anyhow!("sync.verbose_log must be a bool (got {other})")),
        };

        let batch_size = read_i64(cfg, "/sync/batch_size")?.unwrap_or(MAX_BATCH_SIZE as i64);
        if !(1..=MAX_BATCH_SIZE as i64).contains(&batch_size) {
            return Err(anyhow!(
                "sync.batch_size out of bounds (1..={MAX_BATCH_SIZE}): {batch_size}"
            ));
        }

        let token_lifetime_secs =
            read_i64(cfg, "/graph/token_lifetime_secs")?.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        if token_lifetime_secs < 1 {
            return Err(anyhow!(
                "graph.token_lifetime_secs must be >= 1 (got {token_lifetime_secs})"
            ));
        }

        Ok(Self {
            tenant: tenant.to_string(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            days_to_expire,
            verbose_log,
            batch_size: batch_size as usize,
            state_dir: PathBuf::from(read_str(cfg, "/state/dir").unwrap_or(".")),
            log_dir: PathBuf::from(read_str(cfg, "/state/log_dir").unwrap_or("logs")),
            graph_base_url: read_str(cfg, "/graph/base_url")
                .unwrap_or(DEFAULT_GRAPH_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            authority_base_url: read_str(cfg, "/graph/authority_base_url")
                .unwrap_or(DEFAULT_AUTHORITY_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            token_lifetime_secs,
        })
    }
}

fn read_str<'a>(cfg: &'a Value, pointer: &str) -> Option<&'a str> {
    cfg.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Accept number or numeric string.
fn read_i64(cfg: &Value, pointer: &str) -> Result<Option<i64>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .with_context(|| format!("{pointer} must be an integer (got {n})")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .with_context(|| format!("{pointer} must be an integer (got '{s}')")),
        Some(other) => Err(anyhow!("{pointer} must be an integer (got {other})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pointer_respects_segment_boundary() {
        assert!(is_prefix_pointer("/sync", "/sync/batch_size"));
        assert!(is_prefix_pointer("/sync/batch_size", "/sync/batch_size"));
        assert!(!is_prefix_pointer("/sync", "/syncx/batch_size"));
    }

    #[test]
    fn short_strings_are_never_secrets() {
        assert!(!looks_like_secret("sk-1"));
        assert!(looks_like_secret("sk-proj-abcdefgh"));
    }
}
