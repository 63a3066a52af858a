//! # unloq-client
//!
//! Auto-reconnecting namespace subscription client for the UNLOQ events
//! gateway.
//!
//! - [`EventsClient`]: subscribe/unsubscribe callbacks per namespace, dispatch
//!   control actions, observe the connection
//! - [`transport`]: the [`Transport`](transport::Transport) capability and
//!   its WebSocket implementation
//! - [`ClientNotification`]: connect/disconnect/error notifications
//!
//! Subscriptions survive reconnects: every namespace still registered is
//! subscribed again each time the gateway accepts the connection.

#![deny(unsafe_code)]

pub mod client;
pub mod connection;
mod dispatch;
mod lifecycle;
pub mod notify;
mod router;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use client::EventsClient;
pub use connection::{ConnectionState, classify_disconnect, classify_error};
pub use notify::{ClientNotification, Notifier};
pub use transport::ws::{WsConnector, WsTransport};
pub use transport::{
    Ack, Transport, TransportConnector, TransportError, TransportEvent, TransportHandle,
};
