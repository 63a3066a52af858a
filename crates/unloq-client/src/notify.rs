//! Broadcast notifications about the connection.

use tokio::sync::broadcast;
use unloq_core::EventsError;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// A connection-level notification.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientNotification {
    /// The gateway accepted the connection.
    Connect,
    /// The connection went away.
    Disconnect {
        /// Raw reason reported by the transport.
        reason: String,
        /// Classified cause, `None` for a transient disconnect.
        error: Option<EventsError>,
    },
    /// A background operation failed (e.g. a subscription replay).
    Error(EventsError),
}

/// Broadcast sender for [`ClientNotification`]s.
///
/// Non-blocking: slow receivers lag instead of stalling the connection.
#[derive(Debug)]
pub struct Notifier {
    tx: broadcast::Sender<ClientNotification>,
}

impl Notifier {
    /// Create a notifier with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a notifier with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send to every current receiver. Returns how many received it.
    pub fn emit(&self, notification: ClientNotification) -> usize {
        self.tx.send(notification).unwrap_or(0)
    }

    /// Receive every notification emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientNotification> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
