//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `SnapshotSource`: request/response baseline prices
//! - `StreamTransport` / `StreamConnection`: the multiplexed ticker stream

mod snapshot;
mod stream;

pub use snapshot::{SnapshotError, SnapshotRequest, SnapshotSource};
pub use stream::{Frame, StreamConnection, StreamError, StreamTransport};
