//! Live Price Domain Types
//!
//! Canonical internal representation of tracked instruments and their
//! continuously merged price state. These types are codec-agnostic: the
//! stream codec and the snapshot adapter both translate into them.
//!
//! # Merge Model
//!
//! ```text
//! snapshot (baseline) ──┐
//!                       ├──► PriceBook ──► LivePriceRecord per Symbol
//! stream (TickerUpdate)─┘
//! ```

mod book;
mod instrument;
mod record;
mod state;
mod symbol;
mod update;

pub use book::{ApplyOutcome, PriceBook};
pub use instrument::Instrument;
pub use record::{LivePriceRecord, PriceSource};
pub use state::SyncState;
pub use symbol::{Symbol, SymbolError};
pub use update::TickerUpdate;
