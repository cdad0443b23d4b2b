//! Configuration Module
//!
//! Configuration loading for the live ticker service.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, ProxySettings, ServerSettings, ServiceConfig,
    SnapshotSettings, StreamSettings, WebSocketSettings,
};
