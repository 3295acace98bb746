mod websocket;

pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

/// What the physical connection reports to its subscribers.
///
/// The broadcast channel outlives individual connections, so a subscriber
/// sees every `Opened`/`Closed` pair across reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Opened,
    Frame(String),
    Closed(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn send(&self, text: &str) -> Result<(), TransportError>;
    fn subscribe(&self) -> broadcast::Receiver<TransportSignal>;
    fn is_connected(&self) -> bool;
    async fn disconnect(&self) -> Result<(), TransportError>;
}
