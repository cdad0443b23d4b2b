//! Ticker Stream Adapters
//!
//! Everything needed to keep one multiplexed ticker stream alive:
//!
//! - `endpoint`: combined-stream URL construction
//! - `messages` / `codec`: tagged inbound messages and their decoding
//! - `reconnect` / `heartbeat`: backoff and liveness
//! - `ws`: the `tokio-tungstenite` transport
//! - `worker`: the connection loop that ties them together

mod codec;
mod endpoint;
mod heartbeat;
mod messages;
mod reconnect;
mod worker;
mod ws;

pub use codec::{CodecError, DecodedFrame, TickerCodec};
pub use endpoint::{StreamEndpoint, StreamKind};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{
    CombinedEnvelope, MiniTickerEvent, NormalizedEvent, StreamMessage, TickerEvent, TradeEvent,
};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use worker::{StreamEvent, StreamWorker, WorkerConfig};
pub use ws::WsTransport;
