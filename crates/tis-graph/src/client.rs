//! Threat-indicator endpoints: bulk submit, delete by id, list.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::auth::BearerToken;
use crate::error::{truncate_body, GraphError};
use crate::model::{DeleteOutcome, Indicator, SubmitResult};

/// Remote indicator store contract.
///
/// Every call is single-attempt with the token the caller supplies; callers
/// refresh the token before it expires.
pub trait IndicatorGateway {
    /// Submit up to one batch of indicators; one result per returned item.
    ///
    /// A response that does not decode as `{ "value": [...] }` is an error
    /// for the whole call.
    fn bulk_submit(
        &self,
        batch: &[Indicator],
        token: &BearerToken,
    ) -> Result<Vec<SubmitResult>, GraphError>;

    /// Delete one remote indicator. Any HTTP response is an `Ok` outcome;
    /// only transport failures are errors.
    fn delete(&self, remote_id: &str, token: &BearerToken) -> Result<DeleteOutcome, GraphError>;

    /// Fetch the remote indicator collection as returned by the API.
    fn list(&self, token: &BearerToken) -> Result<Value, GraphError>;
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    value: &'a [Indicator],
}

#[derive(Deserialize)]
struct BulkResponse {
    value: Vec<Value>,
}

/// HTTP implementation against `{base}/security/tiIndicators`.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GraphError> {
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn indicators_url(&self) -> String {
        format!("{}/security/tiIndicators", self.base_url)
    }

    fn bulk_url(&self) -> String {
        format!("{}/submitTiIndicators", self.indicators_url())
    }
}

impl IndicatorGateway for GraphClient {
    fn bulk_submit(
        &self,
        batch: &[Indicator],
        token: &BearerToken,
    ) -> Result<Vec<SubmitResult>, GraphError> {
        let resp = self
            .http
            .post(self.bulk_url())
            .bearer_auth(token.as_str())
            .json(&BulkRequest { value: batch })
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        debug!(status = status.as_u16(), items = batch.len(), "bulk submit responded");

        let decoded: BulkResponse = serde_json::from_str(&body).map_err(|e| {
            GraphError::Decode(format!(
                "bulk submit response status={} did not decode ({e}): {}",
                status.as_u16(),
                truncate_body(&body)
            ))
        })?;

        Ok(decoded.value.into_iter().map(SubmitResult::from_item).collect())
    }

    fn delete(&self, remote_id: &str, token: &BearerToken) -> Result<DeleteOutcome, GraphError> {
        let url = format!("{}/{}", self.indicators_url(), remote_id);
        let resp = self.http.delete(url).bearer_auth(token.as_str()).send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        debug!(status, remote_id, "delete responded");
        Ok(DeleteOutcome { status, body })
    }

    fn list(&self, token: &BearerToken) -> Result<Value, GraphError> {
        let resp = self
            .http
            .get(self.indicators_url())
            .bearer_auth(token.as_str())
            .send()?;
        let status = resp.status();
        let body = resp.text()?;

        if !status.is_success() {
            return Err(GraphError::Api {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            GraphError::Decode(format!("list response did not decode ({e}): {}", truncate_body(&body)))
        })
    }
}

impl<G: IndicatorGateway + ?Sized> IndicatorGateway for &G {
    fn bulk_submit(
        &self,
        batch: &[Indicator],
        token: &BearerToken,
    ) -> Result<Vec<SubmitResult>, GraphError> {
        (**self).bulk_submit(batch, token)
    }

    fn delete(&self, remote_id: &str, token: &BearerToken) -> Result<DeleteOutcome, GraphError> {
        (**self).delete(remote_id, token)
    }

    fn list(&self, token: &BearerToken) -> Result<Value, GraphError> {
        (**self).list(token)
    }
}
