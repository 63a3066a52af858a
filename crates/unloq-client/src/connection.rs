//! Connection state machine.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──Connect──▶ Connected
//!       ▲                                                │
//!       └──────────── Disconnect / Error ◀───────────────┘
//!                    (Reconnect / Connect return to Connected)
//! ```
//!
//! A credential rejection or an explicit close makes the connection
//! terminal: the transport is torn down and later transport events are
//! ignored.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use unloq_core::EventsError;
use unloq_core::constants::{AUTHORIZATION_MARKER, TRANSPORT_CLOSE_REASON};

use crate::transport::Transport;

/// Connection state as seen by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection.
    #[default]
    Disconnected,
    /// The transport was opened and the first connection is pending.
    Connecting,
    /// The gateway accepted the connection.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// What `connect()` has to do next.
#[derive(Debug, PartialEq)]
pub(crate) enum ConnectStep {
    /// Already connected.
    Connected,
    /// The connection is terminal.
    Terminal(EventsError),
    /// No transport yet: open one.
    Open,
    /// A transport exists: wait for its next lifecycle event.
    Wait,
}

/// Classify a transport disconnect.
///
/// A `"transport close"` before any connection was ever accepted means the
/// gateway hung up on the handshake, i.e. rejected the credential.
pub fn classify_disconnect(was_connected: bool, reason: &str) -> Option<EventsError> {
    (!was_connected && reason == TRANSPORT_CLOSE_REASON).then(EventsError::authorization)
}

/// Classify a transport error payload.
pub fn classify_error(payload: &Value) -> EventsError {
    match payload {
        Value::String(message) if message.contains(AUTHORIZATION_MARKER) => {
            EventsError::authorization()
        }
        Value::String(message) => EventsError::transport(message.clone()),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| EventsError::transport(payload.to_string()), EventsError::transport),
        other => EventsError::transport(other.to_string()),
    }
}

/// Connection bookkeeping; guarded by the client's connection mutex.
#[derive(Default)]
pub(crate) struct Connection {
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    was_connected: bool,
    router_installed: bool,
    terminal: Option<EventsError>,
}

impl Connection {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    pub(crate) fn terminal(&self) -> Option<&EventsError> {
        self.terminal.as_ref()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub(crate) fn router_installed(&self) -> bool {
        self.router_installed
    }

    /// Transport to send on right now, if connected.
    pub(crate) fn connected_transport(&self) -> Result<Option<Arc<dyn Transport>>, EventsError> {
        if let Some(err) = &self.terminal {
            return Err(err.clone());
        }
        Ok(match self.state {
            ConnectionState::Connected => self.transport.clone(),
            _ => None,
        })
    }

    pub(crate) fn begin_connect(&mut self) -> ConnectStep {
        if let Some(err) = &self.terminal {
            return ConnectStep::Terminal(err.clone());
        }
        if self.state == ConnectionState::Connected {
            return ConnectStep::Connected;
        }
        if self.transport.is_none() {
            self.state = ConnectionState::Connecting;
            return ConnectStep::Open;
        }
        ConnectStep::Wait
    }

    pub(crate) fn attach(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub(crate) fn open_failed(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Returns `false` when the event must be ignored.
    pub(crate) fn on_connect(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.was_connected = true;
        self.router_installed = true;
        true
    }

    /// Returns `false` when the event must be ignored.
    pub(crate) fn on_reconnect(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = ConnectionState::Connected;
        true
    }

    pub(crate) fn on_disconnect(&mut self, reason: &str) -> Option<EventsError> {
        let error = classify_disconnect(self.was_connected, reason);
        self.mark_down(error.as_ref());
        error
    }

    pub(crate) fn on_error(&mut self, payload: &Value) -> EventsError {
        let error = classify_error(payload);
        self.mark_down(Some(&error));
        error
    }

    /// The transport stopped for good (its event stream ended). Detaches it
    /// so the next `connect()` opens a fresh one. Returns `false` when the
    /// connection is terminal and nothing changed.
    pub(crate) fn transport_ended(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.transport = None;
        self.mark_down(None);
        true
    }

    /// Make the connection terminal. Returns the transport to close, or
    /// `None` when it already was terminal.
    pub(crate) fn close(&mut self) -> Option<Option<Arc<dyn Transport>>> {
        if self.is_terminal() {
            return None;
        }
        self.mark_down(Some(&EventsError::Closed));
        Some(self.transport.clone())
    }

    fn mark_down(&mut self, error: Option<&EventsError>) {
        self.state = ConnectionState::Disconnected;
        self.router_installed = false;
        if let Some(err) = error.filter(|e| e.is_terminal()) {
            self.terminal = Some(err.clone());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
