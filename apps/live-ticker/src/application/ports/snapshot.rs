//! Snapshot Port (Driven Port)
//!
//! Request/response source of baseline instrument prices.

use async_trait::async_trait;

use crate::domain::subscription::SubscriptionSet;
use crate::domain::ticker::Instrument;

/// What to ask the snapshot source for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRequest {
    /// Baselines for these symbols.
    Symbols(SubscriptionSet),
    /// The top `n` instruments by the source's own ranking.
    Top(usize),
}

/// Snapshot errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SnapshotError {
    /// Request could not be sent or the connection failed.
    #[error("snapshot request failed: {0}")]
    Network(String),

    /// Upstream answered with a non-success status.
    #[error("snapshot upstream returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("invalid snapshot body: {0}")]
    InvalidBody(String),

    /// No answer within the configured timeout.
    #[error("snapshot timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Port for fetching instrument baselines.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch instruments matching `request`.
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Instrument>, SnapshotError>;
}
