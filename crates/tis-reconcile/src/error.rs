use std::fmt;

use tis_graph::GraphError;

/// Fatal session errors. Per-item rejections are not errors; they are counted.
#[derive(Debug)]
pub enum SyncError {
    /// Token exchange, bulk submit or delete failed as a whole.
    Gateway(GraphError),
    /// Persisted state could not be read or written (IO, not corruption).
    State(anyhow::Error),
    /// The audit log directory could not be prepared at open.
    Audit(anyhow::Error),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Gateway(GraphError::Auth(_)))
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Gateway(e) => write!(f, "SYNC_ABORTED gateway: {e}"),
            SyncError::State(e) => write!(f, "SYNC_ABORTED state: {e:#}"),
            SyncError::Audit(e) => write!(f, "SYNC_ABORTED audit: {e:#}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Gateway(e) => Some(e),
            SyncError::State(e) | SyncError::Audit(e) => Some(e.as_ref()),
        }
    }
}

impl From<GraphError> for SyncError {
    fn from(e: GraphError) -> Self {
        SyncError::Gateway(e)
    }
}
