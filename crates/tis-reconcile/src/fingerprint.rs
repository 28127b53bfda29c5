//! Content fingerprint of an indicator.
//!
//! SHA-256 over the sorted (field, stringified value) pairs, excluding the
//! fields that change every run without changing what the indicator is.
//! Stable across processes and independent of field insertion order.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use tis_graph::model::{EXPIRATION_DATE_TIME, LAST_REPORTED_DATE_TIME};
use tis_graph::Indicator;

pub const EXCLUDED_FIELDS: [&str; 2] = [EXPIRATION_DATE_TIME, LAST_REPORTED_DATE_TIME];

/// Hex-encoded SHA-256 fingerprint of `indicator`.
pub fn fingerprint(indicator: &Indicator) -> String {
    let canonical: BTreeMap<&str, String> = indicator
        .fields()
        .filter(|(k, _)| !EXCLUDED_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), stringify(v)))
        .collect();

    // Length-prefixed so ("ab","c") and ("a","bc") never collide.
    let mut hasher = Sha256::new();
    for (k, v) in &canonical {
        hasher.update((k.len() as u64).to_le_bytes());
        hasher.update(k.as_bytes());
        hasher.update((v.len() as u64).to_le_bytes());
        hasher.update(v.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// `5` and `"5"` stringify the same.
fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
