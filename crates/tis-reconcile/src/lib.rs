//! tis-reconcile
//!
//! Keeps a remote threat-indicator store in sync with a local feed:
//! - fingerprints each indicator by content (volatile timestamps excluded)
//! - submits only unknown fingerprints, in batches
//! - deletes remote indicators whose fingerprint was not seen this run
//! - persists fingerprint -> remote id between runs
//!
//! The network sits behind `IndicatorGateway`/`TokenSource` and time behind
//! `Clock`, so sessions run against fakes in tests.

mod clock;
mod error;
mod fingerprint;
mod session;

pub use clock::{Clock, SystemClock};
pub use error::SyncError;
pub use fingerprint::{fingerprint, EXCLUDED_FIELDS};
pub use session::{run_session, ReconciliationSession, SessionPhase, SessionReport};

pub use tis_graph::model::{EXPIRATION_DATE_TIME, LAST_REPORTED_DATE_TIME, REQUEST_HASH};
pub use tis_graph::Indicator;
pub use tis_state::KnownIndicatorMap;
