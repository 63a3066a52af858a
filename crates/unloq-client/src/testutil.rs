//! Test doubles for the transport layer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use unloq_settings::{EventsSettings, ResolvedSettings};

use crate::client::EventsClient;
use crate::transport::{
    Ack, Transport, TransportConnector, TransportError, TransportEvent, TransportHandle,
};

/// Settings with a test key and no environment lookups.
pub(crate) fn resolved() -> ResolvedSettings {
    EventsSettings {
        gateway: "http://127.0.0.1:9".into(),
        key: Some("test-key".into()),
        ..Default::default()
    }
    .resolve_with(|_| None)
    .expect("test settings resolve")
}

/// A client over a [`MockConnector`].
///
/// With `auto_connect`, the transport reports `Connect` as soon as it is
/// opened.
pub(crate) fn mock_client(auto_connect: bool) -> (EventsClient, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::new(auto_connect));
    let client = EventsClient::with_connector(resolved(), Arc::clone(&connector) as _);
    (client, connector)
}

/// An inbound `event` message for `namespace`.
pub(crate) fn event_frame(namespace: &str, event_type: &str, payload: Value) -> TransportEvent {
    TransportEvent::Message {
        event: "event".into(),
        data: json!({"namespace": namespace, "type": event_type, "payload": payload}),
    }
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Records emits and answers them from a script (default: `{}`).
#[derive(Default)]
pub(crate) struct MockTransport {
    emitted: Mutex<Vec<(String, Value)>>,
    responses: Mutex<VecDeque<Result<Ack, TransportError>>>,
    closed: AtomicBool,
}

impl MockTransport {
    /// Queue the answer for the next emit.
    pub(crate) fn respond(&self, response: Result<Ack, TransportError>) {
        self.responses.lock().push_back(response);
    }

    /// Every `(event, data)` emitted so far.
    pub(crate) fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().clone()
    }

    /// Payloads of the dispatch frames sent for `action`.
    pub(crate) fn dispatched(&self, action: &str) -> Vec<Value> {
        self.emitted
            .lock()
            .iter()
            .filter(|(event, frame)| event == "dispatch" && frame["type"] == action)
            .map(|(_, frame)| frame["payload"].clone())
            .collect()
    }

    /// Forget what was emitted.
    pub(crate) fn clear(&self) {
        self.emitted.lock().clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn emit(&self, event: &str, data: Value) -> Result<Ack, TransportError> {
        self.emitted.lock().push((event.to_string(), data));
        let scripted = self.responses.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Ack {
                error: None,
                data: json!({}),
            })
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out one shared [`MockTransport`] and lets tests inject events.
pub(crate) struct MockConnector {
    transport: Arc<MockTransport>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    opens: AtomicUsize,
    opened: Notify,
    auto_connect: bool,
    fail: bool,
}

impl MockConnector {
    pub(crate) fn new(auto_connect: bool) -> Self {
        Self {
            transport: Arc::new(MockTransport::default()),
            events_tx: Mutex::new(None),
            opens: AtomicUsize::new(0),
            opened: Notify::new(),
            auto_connect,
            fail: false,
        }
    }

    /// A connector whose `open` always fails.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(false)
        }
    }

    pub(crate) fn transport(&self) -> Arc<MockTransport> {
        Arc::clone(&self.transport)
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Wait until `open` has been called.
    pub(crate) async fn wait_opened(&self) {
        if self.opens() > 0 {
            return;
        }
        self.opened.notified().await;
    }

    /// End the transport's event stream, as a dropped socket task would.
    pub(crate) fn hang_up(&self) {
        *self.events_tx.lock() = None;
    }

    /// Inject a transport event.
    pub(crate) fn push(&self, event: TransportEvent) {
        let guard = self.events_tx.lock();
        let tx = guard.as_ref().expect("transport not opened");
        tx.send(event).expect("driver alive");
    }
}

impl TransportConnector for MockConnector {
    fn open(&self, _settings: &ResolvedSettings) -> Result<TransportHandle, TransportError> {
        if self.fail {
            return Err(TransportError::Connect("refused".into()));
        }
        let _ = self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        if self.auto_connect {
            let _ = tx.send(TransportEvent::Connect);
        }
        *self.events_tx.lock() = Some(tx);
        self.opened.notify_one();
        Ok(TransportHandle {
            transport: Arc::clone(&self.transport) as Arc<dyn Transport>,
            events: rx,
        })
    }
}
