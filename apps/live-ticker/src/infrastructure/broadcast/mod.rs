//! Broadcast Channel Adapters
//!
//! Implements change notification using tokio broadcast channels for
//! fan-out to every attached consumer.
//!
//! # Architecture
//!
//! The `BroadcastHub` provides one channel per notification kind:
//! - Price updates: the merged record after each applied stream update
//! - Connection status: state transitions of the sync instance
//!
//! Each channel supports multiple receivers with configurable capacity.
//! Slow receivers lag and skip ahead; they never block the writer.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::ticker::{LivePriceRecord, SyncState};
use crate::infrastructure::config::BroadcastSettings;

// =============================================================================
// Broadcast Messages
// =============================================================================

/// Merged record after an applied update.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct PriceUpdateBroadcast {
    /// The record after the merge.
    pub record: LivePriceRecord,
}

/// Connection state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusBroadcast {
    /// New lifecycle state.
    pub state: SyncState,
    /// Whether the stream is connected.
    pub is_connected: bool,
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Configuration for broadcast channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity for the price update channel.
    pub price_updates_capacity: usize,
    /// Capacity for the connection status channel.
    pub status_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            price_updates_capacity: 4_096,
            status_capacity: 64,
        }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            price_updates_capacity: settings.price_updates_capacity,
            status_capacity: settings.status_capacity,
        }
    }
}

/// Central hub for all broadcast channels.
///
/// # Example
///
/// ```rust
/// use live_ticker::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
///
/// let hub = BroadcastHub::new(BroadcastConfig::default());
/// let _rx = hub.price_updates_rx();
/// assert_eq!(hub.stats().total_receivers(), 1);
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    price_updates_tx: broadcast::Sender<PriceUpdateBroadcast>,
    status_tx: broadcast::Sender<ConnectionStatusBroadcast>,
}

impl BroadcastHub {
    /// Create a new broadcast hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            price_updates_tx: broadcast::channel(config.price_updates_capacity.max(1)).0,
            status_tx: broadcast::channel(config.status_capacity.max(1)).0,
        }
    }

    /// Create a new broadcast hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    // =========================================================================
    // Price Update Channel
    // =========================================================================

    /// Send a merged record to all subscribers.
    ///
    /// Returns the number of receivers that received the message, or `None`
    /// if there are no active receivers.
    pub fn send_price_update(&self, record: LivePriceRecord) -> Option<usize> {
        self.price_updates_tx
            .send(PriceUpdateBroadcast { record })
            .ok()
    }

    /// Get a new receiver for price updates.
    #[must_use]
    pub fn price_updates_rx(&self) -> broadcast::Receiver<PriceUpdateBroadcast> {
        self.price_updates_tx.subscribe()
    }

    /// Get the number of active price update receivers.
    #[must_use]
    pub fn price_updates_receiver_count(&self) -> usize {
        self.price_updates_tx.receiver_count()
    }

    // =========================================================================
    // Connection Status Channel
    // =========================================================================

    /// Send a state change to all subscribers.
    pub fn send_status(&self, state: SyncState, is_connected: bool) -> Option<usize> {
        self.status_tx
            .send(ConnectionStatusBroadcast {
                state,
                is_connected,
            })
            .ok()
    }

    /// Get a new receiver for state changes.
    #[must_use]
    pub fn status_rx(&self) -> broadcast::Receiver<ConnectionStatusBroadcast> {
        self.status_tx.subscribe()
    }

    /// Get the number of active status receivers.
    #[must_use]
    pub fn status_receiver_count(&self) -> usize {
        self.status_tx.receiver_count()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get statistics about all channels.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            price_update_receivers: self.price_updates_receiver_count(),
            status_receivers: self.status_receiver_count(),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Statistics about broadcast channels.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BroadcastStats {
    /// Number of price update receivers.
    pub price_update_receivers: usize,
    /// Number of status receivers.
    pub status_receivers: usize,
}

impl BroadcastStats {
    /// Get total number of receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.price_update_receivers + self.status_receivers
    }
}

// =============================================================================
// Tests
// =============================================================================
