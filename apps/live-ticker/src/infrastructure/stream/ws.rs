//! WebSocket Stream Transport
//!
//! Opens the combined ticker stream over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::endpoint::StreamEndpoint;
use crate::application::ports::{Frame, StreamConnection, StreamError, StreamTransport};
use crate::domain::subscription::SubscriptionSet;

/// Default limit on one connect and handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `StreamTransport` backed by a real WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsTransport {
    endpoint: StreamEndpoint,
    connect_timeout: Duration,
}

impl WsTransport {
    /// Create a transport for `endpoint`.
    #[must_use]
    pub const fn new(endpoint: StreamEndpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound the TCP, TLS and WebSocket handshake.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn open(
        &self,
        subscription: &SubscriptionSet,
    ) -> Result<Box<dyn StreamConnection>, StreamError> {
        if subscription.is_empty() {
            return Err(StreamError::EmptySubscription);
        }

        let url = self.endpoint.url_for(subscription);
        tracing::info!(url = %url, symbols = subscription.len(), "Connecting to ticker stream");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| StreamError::Connect(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        Ok(Box::new(WsConnection { ws }))
    }
}

struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Pong(_)) => return Some(Ok(Frame::Pong)),
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        return Some(Err(StreamError::Transport(e.to_string())));
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Server sent close frame");
                    return None;
                }
                Ok(_) => {
                    // Binary and raw frames carry nothing we decode
                }
                Err(e) => return Some(Err(StreamError::Transport(e.to_string()))),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), StreamError> {
        self.ws
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.ws
            .close(None)
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }
}
