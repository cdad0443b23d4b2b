//! Domain Layer - Core price synchronization types and business logic.
//!
//! This layer contains the core domain types for live price tracking
//! with no I/O. All types here are pure Rust with serialization support.

/// Instruments, live price records and the merged price book.
pub mod ticker;

/// Subscription tracking and reference counting.
pub mod subscription;
