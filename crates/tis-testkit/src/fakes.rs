use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use tis_graph::model::REQUEST_HASH;
use tis_graph::{
    BearerToken, ClientCredentials, DeleteOutcome, GraphError, Indicator, IndicatorGateway,
    SubmitResult, TokenSource,
};
use tis_reconcile::Clock;

#[derive(Default)]
struct RemoteStore {
    indicators: BTreeMap<String, Indicator>,
    next_id: u64,
    bulk_batches: Vec<usize>,
    deletes: Vec<String>,
    tokens_seen: Vec<String>,
}

/// In-memory remote indicator store.
///
/// Accepts every indicator unless told otherwise, assigning ids `ti-1`,
/// `ti-2`, ... Deleting an unknown id answers 404.
#[derive(Default)]
pub struct FakeGateway {
    remote: RefCell<RemoteStore>,
    reject_marker: RefCell<Option<(String, Value)>>,
    fail_bulk_call: Cell<Option<usize>>,
    garbled_bulk: Cell<bool>,
    fail_delete_call: Cell<Option<usize>>,
    delete_status: RefCell<BTreeMap<String, u16>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject (per item) any indicator whose `field` equals `value`.
    pub fn reject_where(&self, field: &str, value: impl Into<Value>) {
        *self.reject_marker.borrow_mut() = Some((field.to_string(), value.into()));
    }

    /// The n-th bulk call (1-based) fails with a transport error.
    pub fn fail_bulk_call(&self, n: usize) {
        self.fail_bulk_call.set(Some(n));
    }

    /// Every bulk call answers with a body that is not the expected envelope.
    pub fn garble_bulk_responses(&self) {
        self.garbled_bulk.set(true);
    }

    /// The n-th delete call (1-based) fails with a transport error.
    pub fn fail_delete_call(&self, n: usize) {
        self.fail_delete_call.set(Some(n));
    }

    /// Answer deletes of `remote_id` with `status` (and keep the record).
    pub fn delete_answers(&self, remote_id: &str, status: u16) {
        self.delete_status
            .borrow_mut()
            .insert(remote_id.to_string(), status);
    }

    /// Seed an indicator as if an earlier run created it.
    pub fn seed(&self, remote_id: &str, indicator: Indicator) {
        self.remote
            .borrow_mut()
            .indicators
            .insert(remote_id.to_string(), indicator);
    }

    pub fn remote_ids(&self) -> BTreeSet<String> {
        self.remote.borrow().indicators.keys().cloned().collect()
    }

    pub fn remote_len(&self) -> usize {
        self.remote.borrow().indicators.len()
    }

    pub fn remote_request_hashes(&self) -> BTreeSet<String> {
        self.remote
            .borrow()
            .indicators
            .values()
            .filter_map(|i| i.request_hash().map(str::to_string))
            .collect()
    }

    /// Sizes of every bulk call, in order.
    pub fn bulk_batches(&self) -> Vec<usize> {
        self.remote.borrow().bulk_batches.clone()
    }

    pub fn submitted_total(&self) -> usize {
        self.remote.borrow().bulk_batches.iter().sum()
    }

    /// Remote ids passed to `delete`, in order.
    pub fn deletes(&self) -> Vec<String> {
        self.remote.borrow().deletes.clone()
    }

    /// Bearer tokens presented with each call, in order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.remote.borrow().tokens_seen.clone()
    }

    fn rejects(&self, indicator: &Indicator) -> bool {
        match &*self.reject_marker.borrow() {
            Some((field, value)) => indicator.get(field) == Some(value),
            None => false,
        }
    }
}

impl IndicatorGateway for FakeGateway {
    fn bulk_submit(
        &self,
        batch: &[Indicator],
        token: &BearerToken,
    ) -> Result<Vec<SubmitResult>, GraphError> {
        let mut remote = self.remote.borrow_mut();
        remote.tokens_seen.push(token.as_str().to_string());
        remote.bulk_batches.push(batch.len());
        let call = remote.bulk_batches.len();

        if self.fail_bulk_call.get() == Some(call) {
            return Err(GraphError::Transport(format!("injected failure on bulk call {call}")));
        }
        if self.garbled_bulk.get() {
            return Err(GraphError::Decode("bulk submit response did not decode".to_string()));
        }

        let mut results = Vec::with_capacity(batch.len());
        for indicator in batch {
            let request_hash = indicator.request_hash().unwrap_or_default().to_string();
            if self.rejects(indicator) {
                results.push(SubmitResult::from_item(json!({
                    REQUEST_HASH: request_hash,
                    "Error": { "code": "BadRequest", "message": "rejected by fake" },
                })));
                continue;
            }
            remote.next_id += 1;
            let remote_id = format!("ti-{}", remote.next_id);
            remote.indicators.insert(remote_id.clone(), indicator.clone());
            results.push(SubmitResult::from_item(json!({
                "id": remote_id,
                REQUEST_HASH: request_hash,
            })));
        }
        Ok(results)
    }

    fn delete(&self, remote_id: &str, token: &BearerToken) -> Result<DeleteOutcome, GraphError> {
        let mut remote = self.remote.borrow_mut();
        remote.tokens_seen.push(token.as_str().to_string());
        remote.deletes.push(remote_id.to_string());
        let call = remote.deletes.len();

        if self.fail_delete_call.get() == Some(call) {
            return Err(GraphError::Transport(format!("injected failure on delete call {call}")));
        }
        if let Some(status) = self.delete_status.borrow().get(remote_id) {
            return Ok(DeleteOutcome {
                status: *status,
                body: json!({ "error": { "code": "Forced" } }).to_string(),
            });
        }

        let status = match remote.indicators.remove(remote_id) {
            Some(_) => 204,
            None => 404,
        };
        Ok(DeleteOutcome {
            status,
            body: String::new(),
        })
    }

    fn list(&self, token: &BearerToken) -> Result<Value, GraphError> {
        let mut remote = self.remote.borrow_mut();
        remote.tokens_seen.push(token.as_str().to_string());
        let value: Vec<Value> = remote
            .indicators
            .iter()
            .map(|(id, ind)| {
                let mut item = serde_json::to_value(ind).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut item {
                    map.insert("id".to_string(), Value::String(id.clone()));
                }
                item
            })
            .collect();
        Ok(json!({ "value": value }))
    }
}

/// Hands out `token-1`, `token-2`, ... and counts exchanges.
#[derive(Default)]
pub struct FakeTokens {
    fetches: Cell<usize>,
    fail: Cell<bool>,
}

impl FakeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every exchange fails with an auth error.
    pub fn failing() -> Self {
        let tokens = Self::default();
        tokens.fail.set(true);
        tokens
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

impl TokenSource for FakeTokens {
    fn fetch_token(&self, creds: &ClientCredentials) -> Result<BearerToken, GraphError> {
        if self.fail.get() {
            return Err(GraphError::Auth(format!(
                "token exchange failed status=401: invalid client for tenant {}",
                creds.tenant
            )));
        }
        let n = self.fetches.get() + 1;
        self.fetches.set(n);
        Ok(BearerToken::new(format!("token-{n}")))
    }
}

/// Clock frozen at a set instant until the test moves it.
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
