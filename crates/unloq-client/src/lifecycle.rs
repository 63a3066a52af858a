//! Connection lifecycle: opening the transport and reacting to its events.
//!
//! A single driver task consumes the transport's event stream in order, so
//! state transitions, routing, and notifications never interleave. It holds
//! only a weak reference to the client and stops when the client is dropped
//! or the transport ends its stream; an ended stream detaches the transport
//! so the next `connect()` opens a new one.

use std::sync::{Arc, Weak};

use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use unloq_core::EventsError;
use unloq_core::constants::{
    CLIENT_DISCONNECT_REASON, INBOUND_EVENT, SUBSCRIBE_ACTION, TRANSPORT_CLOSE_REASON,
};

use crate::client::ClientInner;
use crate::connection::ConnectStep;
use crate::dispatch::namespace_payload;
use crate::notify::ClientNotification;
use crate::router::route_event;
use crate::transport::TransportEvent;

impl ClientInner {
    /// Connect, or wait for the pending connection.
    ///
    /// Settles on the first connect (`Ok`) or disconnect (`Err`) after the
    /// call. A terminal connection fails immediately.
    pub(crate) async fn connect(self: &Arc<Self>) -> Result<(), EventsError> {
        let notifications = self.notifier.subscribe();
        if self.advance()? {
            return Ok(());
        }
        self.settle(notifications).await
    }

    /// Wait on `notifications` for the pending connection to settle.
    ///
    /// A lagged receiver may have missed the outcome, so it re-reads the
    /// connection and reopens the transport if it went away meanwhile.
    pub(crate) async fn settle(
        self: &Arc<Self>,
        mut notifications: broadcast::Receiver<ClientNotification>,
    ) -> Result<(), EventsError> {
        loop {
            match notifications.recv().await {
                Ok(ClientNotification::Connect) => return Ok(()),
                Ok(ClientNotification::Disconnect { reason, error }) => {
                    return Err(error.unwrap_or(EventsError::Disconnected { reason }));
                }
                Ok(ClientNotification::Error(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "connect waiter lagged behind notifications");
                    if self.advance()? {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => return Err(EventsError::Closed),
            }
        }
    }

    /// Take the next connect step: `true` once connected, `false` while a
    /// transport is pending. Opens one when none is attached.
    pub(crate) fn advance(self: &Arc<Self>) -> Result<bool, EventsError> {
        let mut conn = self.connection.lock();
        match conn.begin_connect() {
            ConnectStep::Connected => Ok(true),
            ConnectStep::Terminal(err) => Err(err),
            ConnectStep::Wait => Ok(false),
            ConnectStep::Open => {
                let handle = match self.connector.open(&self.settings) {
                    Ok(handle) => handle,
                    Err(e) => {
                        conn.open_failed();
                        return Err(e.into());
                    }
                };
                conn.attach(handle.transport);
                info!(gateway = %self.settings.gateway, "connecting to events gateway");
                let _ = tokio::spawn(drive(Arc::downgrade(self), handle.events));
                Ok(false)
            }
        }
    }

    /// Force-close the transport. Terminal.
    pub(crate) fn close(&self) {
        let Some(transport) = self.connection.lock().close() else {
            return;
        };
        if let Some(transport) = transport {
            transport.close();
        }
        info!("events client closed");
        let _ = self.notifier.emit(ClientNotification::Disconnect {
            reason: CLIENT_DISCONNECT_REASON.to_string(),
            error: Some(EventsError::Closed),
        });
    }

    fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connect => {
                if !self.connection.lock().on_connect() {
                    return;
                }
                info!("connected to events gateway");
                // Snapshot before waking connect() waiters: namespaces they
                // register afterwards are subscribed by their own request.
                let namespaces = self.registry.lock().namespaces();
                let _ = self.notifier.emit(ClientNotification::Connect);
                self.replay_subscriptions(namespaces);
            }
            TransportEvent::Reconnect => {
                if self.connection.lock().on_reconnect() {
                    info!("transport reconnected");
                }
            }
            TransportEvent::Disconnect { reason } => {
                let (error, teardown) = {
                    let mut conn = self.connection.lock();
                    if conn.is_terminal() {
                        return;
                    }
                    let error = conn.on_disconnect(&reason);
                    let teardown = conn.is_terminal().then(|| conn.transport()).flatten();
                    (error, teardown)
                };
                if let Some(transport) = teardown {
                    transport.close();
                }
                warn!(reason = %reason, error = ?error, "disconnected from events gateway");
                let _ = self
                    .notifier
                    .emit(ClientNotification::Disconnect { reason, error });
            }
            TransportEvent::Error { payload } => {
                let (error, teardown) = {
                    let mut conn = self.connection.lock();
                    if conn.is_terminal() {
                        return;
                    }
                    let error = conn.on_error(&payload);
                    let teardown = conn.is_terminal().then(|| conn.transport()).flatten();
                    (error, teardown)
                };
                if let Some(transport) = teardown {
                    transport.close();
                }
                let reason = payload
                    .as_str()
                    .map_or_else(|| payload.to_string(), str::to_string);
                warn!(reason = %reason, code = error.code(), "transport error");
                let _ = self.notifier.emit(ClientNotification::Disconnect {
                    reason,
                    error: Some(error),
                });
            }
            TransportEvent::Message { event, data } => {
                if event != INBOUND_EVENT {
                    debug!(event = %event, "ignoring transport message");
                    return;
                }
                if !self.connection.lock().router_installed() {
                    debug!("dropping event received while router is not installed");
                    return;
                }
                let _ = route_event(&self.registry, data);
            }
        }
    }

    /// Re-issue `subscribe` for each of `namespaces`.
    fn replay_subscriptions(self: &Arc<Self>, namespaces: Vec<String>) {
        if namespaces.is_empty() {
            return;
        }
        debug!(count = namespaces.len(), "replaying subscriptions");

        let inner = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let results = join_all(
                namespaces
                    .iter()
                    .map(|ns| inner.dispatch(SUBSCRIBE_ACTION, Some(namespace_payload(ns)))),
            )
            .await;
            for (namespace, result) in namespaces.iter().zip(results) {
                if let Err(err) = result {
                    warn!(namespace = %namespace, error = %err, "subscription replay failed");
                    let _ = inner.notifier.emit(ClientNotification::Error(err));
                }
            }
        });
    }
}

/// Consume transport events until the stream ends or the client is gone.
async fn drive(inner: Weak<ClientInner>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_transport_event(event);
    }
    debug!("transport event stream ended");

    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.connection.lock().transport_ended() {
        let _ = inner.notifier.emit(ClientNotification::Disconnect {
            reason: TRANSPORT_CLOSE_REASON.to_string(),
            error: Some(EventsError::transport("transport stopped")),
        });
    }
}
