//! Stream Worker
//!
//! Owns one logical ticker stream for a fixed `SubscriptionSet`: opens the
//! connection, pings it, forwards frames and reopens it with backoff when
//! it drops. Every reconnect re-applies the same set.
//!
//! ```text
//! open ──► Connected ──► Frame* ──► (drop) ──► Disconnected
//!   ▲                                              │
//!   └──────── sleep(backoff) ◄── Reconnecting ◄────┘
//!                                  │ attempts exhausted
//!                                  ▼
//!                                GaveUp
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use crate::application::ports::{Frame, StreamConnection, StreamError, StreamTransport};
use crate::domain::subscription::SubscriptionSet;
use crate::infrastructure::config::WebSocketSettings;
use crate::infrastructure::metrics;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the stream worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Connection opened.
    Connected,
    /// Raw text frame.
    Frame(String),
    /// Connection lost.
    Disconnected {
        /// Why the connection ended.
        reason: String,
    },
    /// Waiting before the next attempt.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Backoff before the attempt.
        delay: Duration,
    },
    /// Attempts exhausted; the worker has stopped.
    GaveUp {
        /// Attempts made.
        attempts: u32,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Connection-maintenance settings for a worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// Ping cadence and timeout.
    pub heartbeat: HeartbeatConfig,
}

impl WorkerConfig {
    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        Self {
            reconnect: ReconnectConfig::from_websocket_settings(settings),
            heartbeat: HeartbeatConfig::from_websocket_settings(settings),
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Drives one stream connection until cancelled or out of attempts.
pub struct StreamWorker {
    transport: Arc<dyn StreamTransport>,
    subscription: SubscriptionSet,
    config: WorkerConfig,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        subscription: SubscriptionSet,
        config: WorkerConfig,
        event_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            subscription,
            config,
            event_tx,
            cancel,
        }
    }

    /// Run the connection loop.
    ///
    /// # Errors
    ///
    /// Returns `ReconnectError::MaxAttemptsExceeded` when a finite attempt
    /// budget runs out.
    pub async fn run(self) -> Result<(), ReconnectError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!("Stream worker cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "Ticker stream connection error");
                    metrics::set_stream_connected(false);

                    let _ = self
                        .event_tx
                        .send(StreamEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;

                    let Some(delay) = policy.next_delay() else {
                        let attempts = policy.attempt_count();
                        tracing::error!(attempts, "Giving up on ticker stream");
                        let _ = self.event_tx.send(StreamEvent::GaveUp { attempts }).await;
                        return Err(ReconnectError::MaxAttemptsExceeded(attempts));
                    };

                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        symbols = self.subscription.len(),
                        "Reconnecting to ticker stream"
                    );
                    metrics::record_reconnect();
                    let _ = self
                        .event_tx
                        .send(StreamEvent::Reconnecting { attempt, delay })
                        .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::debug!("Stream worker cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Open one connection and pump it until error or cancellation.
    ///
    /// `Ok(())` means the worker should stop.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), StreamError> {
        let mut conn = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            opened = self.transport.open(&self.subscription) => opened?,
        };

        policy.reset();
        metrics::set_stream_connected(true);
        if self.event_tx.send(StreamEvent::Connected).await.is_err() {
            close_quietly(conn.as_mut()).await;
            return Ok(());
        }

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(8);
        let heartbeat_cancel = self.cancel.child_token();
        let heartbeat = tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel.clone(),
            )
            .run(),
        );

        let result = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    close_quietly(conn.as_mut()).await;
                    break Ok(());
                }
                event = heartbeat_rx.recv() => match event {
                    Some(HeartbeatEvent::SendPing) => {
                        heartbeat_state.mark_ping_sent();
                        if let Err(e) = conn.ping().await {
                            break Err(e);
                        }
                    }
                    Some(HeartbeatEvent::Timeout) => {
                        break Err(StreamError::HeartbeatTimeout(self.config.heartbeat.pong_timeout));
                    }
                    None => {
                        tracing::debug!("Heartbeat channel closed");
                    }
                },
                frame = conn.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        heartbeat_state.record_activity();
                        if self.event_tx.send(StreamEvent::Frame(text)).await.is_err() {
                            close_quietly(conn.as_mut()).await;
                            break Ok(());
                        }
                    }
                    Some(Ok(Frame::Pong)) => heartbeat_state.record_activity(),
                    Some(Err(e)) => break Err(e),
                    None => break Err(StreamError::Closed),
                },
            }
        };

        heartbeat_cancel.cancel();
        let _ = heartbeat.await;
        result
    }
}

async fn close_quietly(conn: &mut dyn StreamConnection) {
    match tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Error closing ticker stream"),
        Err(_) => tracing::debug!("Timed out closing ticker stream"),
    }
}
