//! tis-graph
//!
//! The HTTP boundary of the sync:
//! - [`OAuthClient`] exchanges client credentials for a bearer token.
//! - [`GraphClient`] bulk-submits, deletes and lists threat indicators.
//!
//! The session only sees the [`TokenSource`] and [`IndicatorGateway`] traits,
//! so tests swap in in-memory fakes.

mod auth;
mod client;
mod error;
pub mod model;

pub use auth::{BearerToken, ClientCredentials, OAuthClient, TokenSource, DEFAULT_SCOPE};
pub use client::{GraphClient, IndicatorGateway};
pub use error::GraphError;
pub use model::{DeleteOutcome, Indicator, SubmitResult};
