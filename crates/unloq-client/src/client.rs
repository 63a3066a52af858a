//! Public client.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use unloq_core::constants::{SUBSCRIBE_ACTION, UNSUBSCRIBE_ACTION};
use unloq_core::registry::validate_namespace;
use unloq_core::{EventCallback, EventsError, Filter, SubscriptionRegistry};
use unloq_settings::{EventsSettings, ResolvedSettings};

use crate::connection::{Connection, ConnectionState};
use crate::dispatch::namespace_payload;
use crate::notify::{ClientNotification, Notifier};
use crate::transport::TransportConnector;
use crate::transport::ws::WsConnector;

/// Shared client state.
pub(crate) struct ClientInner {
    pub(crate) settings: ResolvedSettings,
    pub(crate) connector: Arc<dyn TransportConnector>,
    pub(crate) registry: Mutex<SubscriptionRegistry>,
    pub(crate) connection: Mutex<Connection>,
    pub(crate) notifier: Notifier,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(transport) = self.connection.get_mut().transport() {
            transport.close();
        }
    }
}

/// Namespace subscription client for the events gateway.
///
/// Cheap to clone; clones share one connection and one registry. The
/// connection is opened lazily by the first [`connect`](Self::connect),
/// [`subscribe`](Self::subscribe), or [`dispatch`](Self::dispatch) and closed
/// when the last clone is dropped.
///
/// ```no_run
/// # async fn run() -> Result<(), unloq_core::EventsError> {
/// use unloq_client::EventsClient;
/// use unloq_core::{EventCallback, namespaces};
///
/// let client = EventsClient::new(unloq_settings::load_settings().unwrap_or_default())?;
/// let on_save = EventCallback::new(|event| println!("{} {}", event.event_type, event.payload));
/// client
///     .subscribe_filtered(namespaces::IAM, "permission.save", on_save.clone())
///     .await?;
/// client.unsubscribe(namespaces::IAM, Some(&on_save)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EventsClient {
    inner: Arc<ClientInner>,
}

impl EventsClient {
    /// Create a client using the WebSocket transport.
    pub fn new(settings: EventsSettings) -> Result<Self, EventsError> {
        let resolved = settings.resolve().map_err(|e| EventsError::Config {
            message: e.to_string(),
        })?;
        Ok(Self::with_connector(resolved, Arc::new(WsConnector)))
    }

    /// Create a client over a custom transport.
    pub fn with_connector(
        settings: ResolvedSettings,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                settings,
                connector,
                registry: Mutex::new(SubscriptionRegistry::new()),
                connection: Mutex::new(Connection::default()),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Subscribe to every event of a namespace.
    ///
    /// See [`subscribe_filtered`](Self::subscribe_filtered).
    pub async fn subscribe(
        &self,
        namespace: &str,
        callback: EventCallback,
    ) -> Result<Option<Value>, EventsError> {
        self.subscribe_filtered(namespace, Filter::any(), callback)
            .await
    }

    /// Subscribe to the events of a namespace that pass `filter`.
    ///
    /// The first registration of a namespace asks the gateway to stream it and
    /// returns its acknowledgement; later ones return `Ok(None)` without
    /// touching the transport. The registration stays in place when that
    /// request fails and is replayed on the next connect, unless the client
    /// is closed or unauthorized, in which case nothing is registered.
    pub async fn subscribe_filtered(
        &self,
        namespace: &str,
        filter: impl Into<Filter>,
        callback: EventCallback,
    ) -> Result<Option<Value>, EventsError> {
        validate_namespace(namespace)?;
        let filter = filter.into();

        // A new namespace is registered only after connecting, so the
        // connect-time replay and this request never both subscribe it.
        let known = self.inner.registry.lock().contains(namespace);
        let connected = if known {
            Ok(())
        } else {
            self.inner.connect().await
        };
        if let Err(err) = &connected {
            if err.is_terminal() {
                return Err(err.clone());
            }
        }

        let registered = self
            .inner
            .registry
            .lock()
            .register(namespace, filter, callback)?;
        if !registered.is_first {
            return Ok(None);
        }
        connected?;
        self.inner
            .dispatch(SUBSCRIBE_ACTION, Some(namespace_payload(namespace)))
            .await
            .map(Some)
    }

    /// Remove one callback (`Some`) or every callback (`None`) of a namespace.
    ///
    /// The gateway is told to stop streaming only when the namespace ends up
    /// without registrations.
    pub async fn unsubscribe(
        &self,
        namespace: &str,
        callback: Option<&EventCallback>,
    ) -> Result<Option<Value>, EventsError> {
        validate_namespace(namespace)?;
        let removed = self.inner.registry.lock().unregister(namespace, callback);
        if !removed.became_empty {
            return Ok(None);
        }
        self.inner
            .dispatch(UNSUBSCRIBE_ACTION, Some(namespace_payload(namespace)))
            .await
            .map(Some)
    }

    /// Connect, or wait for the connection in progress.
    pub async fn connect(&self) -> Result<(), EventsError> {
        self.inner.connect().await
    }

    /// Send a control action and wait for the gateway's answer.
    pub async fn dispatch(
        &self,
        action: &str,
        payload: Option<Value>,
    ) -> Result<Value, EventsError> {
        self.inner.dispatch(action, payload).await
    }

    /// Namespaces with at least one registration, in subscription order.
    pub fn namespaces(&self) -> Vec<String> {
        self.inner.registry.lock().namespaces()
    }

    /// Receive connection notifications emitted from now on.
    pub fn notifications(&self) -> broadcast::Receiver<ClientNotification> {
        self.inner.notifier.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.lock().state()
    }

    /// Close the connection for good.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for EventsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsClient")
            .field("gateway", &self.inner.settings.gateway)
            .field("state", &self.state())
            .field("namespaces", &self.namespaces())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
