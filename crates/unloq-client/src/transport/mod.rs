//! Transport capability consumed by the client.
//!
//! The client never touches sockets directly. A [`TransportConnector`] opens
//! one [`Transport`] per client and hands back the stream of
//! [`TransportEvent`]s it produces. The transport owns reconnection and
//! backoff; the client only reacts to its lifecycle events.
//!
//! Contract: a transport emits [`TransportEvent::Connect`] on every
//! successful establishment, including after its own reconnects (which it
//! announces with [`TransportEvent::Reconnect`] first).

pub mod backoff;
pub mod socketio;
pub mod ws;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use unloq_core::EventsError;
use unloq_settings::ResolvedSettings;

/// Lifecycle and inbound traffic of a transport.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The gateway accepted the connection.
    Connect,
    /// The connection went away.
    Disconnect {
        /// Transport-level reason, e.g. `"transport close"`.
        reason: String,
    },
    /// The transport failed to connect or hit an error.
    Error {
        /// Raw error payload.
        payload: Value,
    },
    /// The transport re-established a lost connection on its own.
    Reconnect,
    /// A named message from the gateway.
    Message {
        /// Message name.
        event: String,
        /// Message body.
        data: Value,
    },
}

/// Gateway acknowledgement of an emitted message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ack {
    /// Error value, if the gateway reported one.
    pub error: Option<Value>,
    /// Response body.
    pub data: Value,
}

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport (or the connection an ack was pending on) is gone.
    #[error("transport closed")]
    Closed,
    /// The transport could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),
}

impl From<TransportError> for EventsError {
    fn from(err: TransportError) -> Self {
        Self::transport(err.to_string())
    }
}

/// A bidirectional connection to the gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Emit a named message and wait for its acknowledgement.
    ///
    /// Messages emitted while disconnected are buffered until the next
    /// established connection.
    async fn emit(&self, event: &str, data: Value) -> Result<Ack, TransportError>;

    /// Force-close the transport and stop reconnecting.
    fn close(&self);
}

/// An opened transport and its event stream.
pub struct TransportHandle {
    /// The transport.
    pub transport: Arc<dyn Transport>,
    /// Lifecycle and inbound events, in the order the transport saw them.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens transports.
pub trait TransportConnector: Send + Sync {
    /// Start connecting. Returns immediately; progress arrives as events.
    fn open(&self, settings: &ResolvedSettings) -> Result<TransportHandle, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_maps_to_transport_code() {
        let err: EventsError = TransportError::Closed.into();
        assert_eq!(err.code(), "TRANSPORT");
        assert_eq!(err.to_string(), "transport error: transport closed");
    }

    #[test]
    fn ack_default_is_empty() {
        let ack = Ack::default();
        assert!(ack.error.is_none());
        assert_eq!(ack.data, Value::Null);
    }
}
