//! Wire model shared by the gateway and the session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stamped by the session on every indicator; excluded from fingerprints.
pub const EXPIRATION_DATE_TIME: &str = "expirationDateTime";
/// Feed-supplied, changes every run; excluded from fingerprints.
pub const LAST_REPORTED_DATE_TIME: &str = "lastReportedDateTime";
/// Fingerprint field, echoed back by the bulk endpoint per result item.
pub const REQUEST_HASH: &str = "requestHash";

/// One threat indicator: a flat mapping of field name to scalar value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Indicator(Map<String, Value>);

impl Indicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// `None` unless `value` is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn request_hash(&self) -> Option<&str> {
        self.get(REQUEST_HASH).and_then(Value::as_str)
    }
}

/// Outcome of one item in a bulk-submit response.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResult {
    /// The remote created the indicator.
    Accepted {
        request_hash: String,
        remote_id: String,
        raw: Value,
    },
    /// The item carried an `Error`, or lacked the `id`/`requestHash` needed
    /// to record it.
    Rejected {
        request_hash: Option<String>,
        raw: Value,
    },
}

impl SubmitResult {
    pub fn from_item(raw: Value) -> Self {
        let request_hash = raw
            .get(REQUEST_HASH)
            .and_then(Value::as_str)
            .map(str::to_string);
        let remote_id = raw.get("id").and_then(Value::as_str).map(str::to_string);
        let has_error = raw.get("Error").is_some_and(|e| !e.is_null());

        match (has_error, request_hash, remote_id) {
            (false, Some(request_hash), Some(remote_id)) => SubmitResult::Accepted {
                request_hash,
                remote_id,
                raw,
            },
            (_, request_hash, _) => SubmitResult::Rejected { request_hash, raw },
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResult::Accepted { .. })
    }

    pub fn raw(&self) -> &Value {
        match self {
            SubmitResult::Accepted { raw, .. } | SubmitResult::Rejected { raw, .. } => raw,
        }
    }
}

/// Response to a single delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub status: u16,
    pub body: String,
}

impl DeleteOutcome {
    /// 2xx, or 404 (already gone remotely).
    pub fn is_deleted(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 404
    }
}
