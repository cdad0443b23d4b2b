//! Application Layer - Use cases and port definitions.
//!
//! Services here drive the domain price book from the snapshot and stream
//! ports; adapters for those ports live in the infrastructure layer.

/// Port interfaces for the snapshot source and the ticker stream.
pub mod ports;

/// Synchronization and consumer-sharing services.
pub mod services;
