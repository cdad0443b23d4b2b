use serde::Serialize;

/// Lifecycle state of a live ticker synchronization instance.
///
/// ```text
/// Idle ──initialize──► SnapshotLoading ──► Streaming ◄──► Reconnecting
///   any ──teardown──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No symbols, no connection.
    #[default]
    Idle,
    /// Awaiting the snapshot.
    SnapshotLoading,
    /// Baseline loaded, stream connection active or opening.
    Streaming,
    /// Connection dropped, waiting to reopen.
    Reconnecting,
    /// Torn down.
    Closed,
}

impl SyncState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SnapshotLoading => "snapshot_loading",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}
