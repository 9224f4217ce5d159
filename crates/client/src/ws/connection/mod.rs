//! Low-level connection types shared by the transport and its connectors.

use async_trait::async_trait;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};

/// Connection state for the real-time channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection closed")]
    Closed,
}

/// An established connection, reduced to two text-frame channels.
///
/// Dropping `outbound` closes the connection; `inbound` ends when the peer
/// goes away.
pub struct Link {
    pub outbound: UnboundedSender<String>,
    pub inbound: UnboundedReceiver<String>,
}

/// Opens connections to the real-time endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

mod connection_native;
pub use connection_native::TungsteniteConnector;
