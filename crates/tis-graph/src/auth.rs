//! OAuth2 client-credentials exchange.
//!
//! Tokens are not cached here; the session tracks expiry and asks again.

use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{truncate_body, GraphError};

pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tenant + client id + client secret. **Secret is redacted in `Debug` output.**
#[derive(Clone)]
pub struct ClientCredentials {
    pub tenant: String,
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn from_config(cfg: &tis_config::SyncConfig) -> Self {
        Self {
            tenant: cfg.tenant.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant", &self.tenant)
            .field("client_id", &"<REDACTED>")
            .field("client_secret", &"<REDACTED>")
            .finish()
    }
}

/// Short-lived bearer token. **Redacted in `Debug` output.**
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<REDACTED>)")
    }
}

/// Exchanges long-lived client credentials for a bearer token.
pub trait TokenSource {
    fn fetch_token(&self, creds: &ClientCredentials) -> Result<BearerToken, GraphError>;
}

/// Token endpoint at `{authority}/{tenant}/oauth2/v2.0/token`.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    authority_base_url: String,
    scope: String,
}

impl OAuthClient {
    pub fn new(authority_base_url: impl Into<String>) -> Result<Self, GraphError> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            authority_base_url: authority_base_url.into().trim_end_matches('/').to_string(),
            scope: DEFAULT_SCOPE.to_string(),
        })
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    fn token_url(&self, tenant: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_base_url, tenant)
    }
}

impl TokenSource for OAuthClient {
    fn fetch_token(&self, creds: &ClientCredentials) -> Result<BearerToken, GraphError> {
        let params = [
            ("client_id", creds.client_id.as_str()),
            ("scope", self.scope.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let resp = self
            .http
            .post(self.token_url(&creds.tenant))
            .form(&params)
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        debug!(status = status.as_u16(), "token endpoint responded");

        let json: Value = serde_json::from_str(&body).map_err(|e| {
            GraphError::Decode(format!(
                "token response status={} is not json ({e}): {}",
                status.as_u16(),
                truncate_body(&body)
            ))
        })?;

        match json.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(BearerToken::new(token)),
            _ => {
                let reason = json
                    .get("error_description")
                    .or_else(|| json.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("no access_token in response");
                Err(GraphError::Auth(format!(
                    "token exchange failed status={}: {}",
                    status.as_u16(),
                    reason
                )))
            }
        }
    }
}

impl<T: TokenSource + ?Sized> TokenSource for &T {
    fn fetch_token(&self, creds: &ClientCredentials) -> Result<BearerToken, GraphError> {
        (**self).fetch_token(creds)
    }
}
