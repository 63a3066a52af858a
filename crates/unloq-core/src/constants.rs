//! Protocol constants shared by the client and transport crates.

/// Transport event name carrying control commands (request/response).
pub const DISPATCH_EVENT: &str = "dispatch";

/// Transport event name carrying inbound namespace events.
pub const INBOUND_EVENT: &str = "event";

/// Control action asking the gateway to start streaming a namespace.
pub const SUBSCRIBE_ACTION: &str = "subscribe";

/// Control action asking the gateway to stop streaming a namespace.
pub const UNSUBSCRIBE_ACTION: &str = "unsubscribe";

/// Envelope field naming the target namespace of an inbound event.
pub const NAMESPACE_FIELD: &str = "namespace";

/// Disconnect reason reported when the underlying connection was closed.
pub const TRANSPORT_CLOSE_REASON: &str = "transport close";

/// Disconnect reason reported when reading from the connection failed.
pub const TRANSPORT_ERROR_REASON: &str = "transport error";

/// Disconnect reason reported when the client closed the connection itself.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Marker the gateway puts in error messages when it rejects the credential.
pub const AUTHORIZATION_MARKER: &str = "connection authorization";

/// Disconnect reason reported when the gateway ended the session itself.
pub const SERVER_DISCONNECT_REASON: &str = "io server disconnect";

/// Disconnect reason reported when the gateway stopped sending heartbeats.
pub const PING_TIMEOUT_REASON: &str = "ping timeout";

/// Error payload reported when a connection was not accepted in time.
pub const CONNECT_TIMEOUT_ERROR: &str = "timeout";
