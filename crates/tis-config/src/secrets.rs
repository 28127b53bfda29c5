//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"TIS_CLIENT_SECRET"`).
//! - At startup, callers invoke [`resolve_secrets`] once and pass the result
//!   into [`crate::SyncConfig::from_config_json`]; never scatter
//!   `std::env::var` calls across the codebase.
//! - `Debug` output redacts values.
//! - Error messages reference the env var **NAME**, never the value.

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_CLIENT_ID_ENV: &str = "TIS_CLIENT_ID";
pub const DEFAULT_CLIENT_SECRET_ENV: &str = "TIS_CLIENT_SECRET";

/// OAuth2 client credentials resolved from the environment.
/// **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("client_id", &"<REDACTED>")
            .field("client_secret", &"<REDACTED>")
            .finish()
    }
}

/// Read a non-empty string value at `pointer`, trimmed.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Unset and blank are the same thing here.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the client id and client secret named by
/// `graph.keys_env.client_id` / `graph.keys_env.client_secret`
/// (falling back to `TIS_CLIENT_ID` / `TIS_CLIENT_SECRET`).
///
/// # Errors
/// `SECRETS_MISSING` naming the first env var that is unset or blank.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let client_id_var = read_str_at(config_json, "/graph/keys_env/client_id")
        .unwrap_or_else(|| DEFAULT_CLIENT_ID_ENV.to_string());
    let client_secret_var = read_str_at(config_json, "/graph/keys_env/client_secret")
        .unwrap_or_else(|| DEFAULT_CLIENT_SECRET_ENV.to_string());

    let Some(client_id) = resolve_env(&client_id_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (client_id) is not set or empty",
            client_id_var
        );
    };
    let Some(client_secret) = resolve_env(&client_secret_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (client_secret) is not set or empty",
            client_secret_var
        );
    };

    Ok(ResolvedSecrets {
        client_id,
        client_secret,
    })
}
