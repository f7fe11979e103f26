//! Pluggable duplex channel transport.
//!
//! The session manager drives any [`ChannelTransport`]; production uses the
//! WebSocket implementation, tests run an in-memory channel.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::errors::RealtimeError;

/// Opens duplex channels to the realtime endpoint.
#[async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    /// Open a channel; resolves once the channel reports open.
    async fn connect(&self, url: &str) -> Result<Box<dyn ChannelConnection>, RealtimeError>;
}

/// One open duplex channel.
#[async_trait]
pub trait ChannelConnection: Send {
    /// Send a text frame.
    async fn send(&mut self, frame: String) -> Result<(), RealtimeError>;

    /// Next inbound text frame; `None` once the channel has closed.
    async fn recv(&mut self) -> Option<Result<String, RealtimeError>>;

    /// Close the channel with a clean-close signal.
    async fn close(&mut self) -> Result<(), RealtimeError>;
}

/// WebSocket transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChannelConnection>, RealtimeError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| RealtimeError::Connect(err.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChannelConnection for WsConnection {
    async fn send(&mut self, frame: String) -> Result<(), RealtimeError> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|err| RealtimeError::Transport(err.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                // Protocol-level ping/pong is handled by the library.
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(err) => return Some(Err(RealtimeError::Transport(err.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.stream.close(None).await.map_err(|err| RealtimeError::Transport(err.to_string()))
    }
}
