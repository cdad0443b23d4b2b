//! Application Services
//!
//! - `LiveTickerSync`: snapshot and stream reconciliation for one symbol set
//! - `LiveTickerHub`: many consumers sharing one `LiveTickerSync`

mod hub;
mod sync;

pub use hub::{LiveTickerHub, TickerConsumer};
pub use sync::{FallbackPolicy, LiveTickerSync, SyncConfig, SyncStats};
