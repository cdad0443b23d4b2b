//! Stream Port (Driven Port)
//!
//! A continuous, multiplexed push channel of per-symbol ticker frames.
//! One connection carries every symbol of a `SubscriptionSet`.

use async_trait::async_trait;

use crate::domain::subscription::SubscriptionSet;

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text payload to be decoded by the ticker codec.
    Text(String),
    /// Heartbeat acknowledgement.
    Pong,
}

/// Stream transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// Connection could not be established.
    #[error("stream connection failed: {0}")]
    Connect(String),

    /// Error on an established connection.
    #[error("stream transport error: {0}")]
    Transport(String),

    /// Remote closed the connection.
    #[error("stream connection closed")]
    Closed,

    /// No frame or pong within the heartbeat timeout.
    #[error("heartbeat timeout after {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    /// Nothing to subscribe to.
    #[error("subscription set is empty")]
    EmptySubscription,
}

/// An open stream connection.
///
/// `next_frame` must be cancel-safe: it is polled inside `select!`.
#[async_trait]
pub trait StreamConnection: Send {
    /// Next frame, or `None` once the remote has closed.
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>>;

    /// Send a heartbeat ping.
    async fn ping(&mut self) -> Result<(), StreamError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Port for opening stream connections.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open one connection multiplexing every symbol in `subscription`.
    async fn open(
        &self,
        subscription: &SubscriptionSet,
    ) -> Result<Box<dyn StreamConnection>, StreamError>;
}
