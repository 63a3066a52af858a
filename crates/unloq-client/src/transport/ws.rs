//! WebSocket transport over `tokio-tungstenite`.
//!
//! One background task owns the socket, reconnects with backoff, and
//! correlates acknowledgements. It speaks Socket.IO on the default namespace
//! (see [`socketio`](super::socketio)): after the Engine.IO `open` packet it
//! requests the namespace with `40`, and only the gateway's `40` reply emits
//! [`TransportEvent::Connect`] and flushes queued messages. Messages go out as
//! `42<id>["name",data]` and resolve on the matching `43<id>[err,res]`.
//!
//! A session that is not accepted within `timeout_ms` of the dial is dropped
//! with a `"timeout"` error. Once accepted, silence longer than the gateway's
//! ping interval plus ping timeout ends it with `"ping timeout"`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unloq_core::constants::{
    AUTHORIZATION_MARKER, CONNECT_TIMEOUT_ERROR, PING_TIMEOUT_REASON, SERVER_DISCONNECT_REASON,
    TRANSPORT_CLOSE_REASON, TRANSPORT_ERROR_REASON,
};
use unloq_settings::{ResolvedSettings, TransportSettings};

use super::socketio::{self, Packet};
use super::{
    Ack, Transport, TransportConnector, TransportError, TransportEvent, TransportHandle, backoff,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending acknowledgement waiting for the gateway.
type AckTx = oneshot::Sender<Result<Ack, TransportError>>;

/// Opens [`WsTransport`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl TransportConnector for WsConnector {
    fn open(&self, settings: &ResolvedSettings) -> Result<TransportHandle, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = ConnectionTask {
            url: socketio::endpoint(settings.websocket_url()).to_string(),
            settings: settings.transport.clone(),
            cmd_rx,
            events_tx,
            cancel: cancel.clone(),
        };
        debug!(url = %task.url, "opening websocket transport");
        let _ = runtime.spawn(task.run());

        Ok(TransportHandle {
            transport: Arc::new(WsTransport { cmd_tx, cancel }),
            events: events_rx,
        })
    }
}

/// Outbound message queued for the connection task.
struct Outbound {
    event: String,
    data: Value,
    ack_tx: AckTx,
}

/// Handle to a running WebSocket connection task.
pub struct WsTransport {
    cmd_tx: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

#[async_trait]
impl Transport for WsTransport {
    async fn emit(&self, event: &str, data: Value) -> Result<Ack, TransportError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(Outbound {
                event: event.to_string(),
                data,
                ack_tx,
            })
            .map_err(|_| TransportError::Closed)?;
        ack_rx.await.map_err(|_| TransportError::Closed)?
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─── Connection task ─────────────────────────────────────────────────────────

struct ConnectionTask {
    url: String,
    settings: TransportSettings,
    cmd_rx: mpsc::UnboundedReceiver<Outbound>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
}

#[derive(Debug, PartialEq)]
enum SessionEnd {
    /// Closed by [`Transport::close`] or because every handle was dropped.
    LocalClose,
    /// The socket went away; reconnection may follow.
    Dropped,
    /// The gateway disconnected the client; no reconnection.
    ServerClose,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut established_before = false;

        loop {
            let deadline = Instant::now() + Duration::from_millis(self.settings.timeout_ms);
            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = tokio::time::timeout_at(deadline, establish(&self.url, &self.settings)) => {
                    result.unwrap_or_else(|_| Err(CONNECT_TIMEOUT_ERROR.to_string()))
                }
            };

            match connected {
                Ok(ws) => {
                    let mut session = Session::new(&self.events_tx, established_before, deadline);
                    let end = session.run(ws, &mut self.cmd_rx, &self.cancel).await;
                    if session.confirmed {
                        established_before = true;
                        attempt = 0;
                    }
                    match end {
                        SessionEnd::LocalClose => break,
                        SessionEnd::ServerClose => {
                            info!("gateway ended the session");
                            break;
                        }
                        SessionEnd::Dropped => {}
                    }
                }
                Err(message) => {
                    debug!(url = %self.url, error = %message, "websocket connect failed");
                    let _ = self.events_tx.send(TransportEvent::Error {
                        payload: Value::String(message),
                    });
                }
            }

            if !self.settings.reconnection {
                break;
            }
            if self
                .settings
                .reconnection_attempts
                .is_some_and(|max| attempt >= max)
            {
                warn!(attempts = attempt, "giving up reconnecting");
                break;
            }
            let delay_ms = backoff::next_delay_ms(&self.settings, attempt);
            attempt = attempt.saturating_add(1);
            debug!(attempt, delay_ms, "reconnecting");

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }

        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            let _ = cmd.ack_tx.send(Err(TransportError::Closed));
        }
        debug!(url = %self.url, "websocket transport stopped");
    }
}

async fn establish(url: &str, settings: &TransportSettings) -> Result<WsStream, String> {
    let mut request = url.into_client_request().map_err(|e| e.to_string())?;
    for (name, value) in &settings.extra_headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("invalid header name '{name}': {e}"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| format!("invalid value for header '{name}': {e}"))?;
        let _ = request.headers_mut().insert(header, value);
    }

    match connect_async(request).await {
        Ok((ws, _response)) => Ok(ws),
        Err(WsError::Http(response)) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                Err(format!("{AUTHORIZATION_MARKER} failed (HTTP {status})"))
            } else {
                Err(format!("handshake rejected (HTTP {status})"))
            }
        }
        Err(e) => Err(e.to_string()),
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// What the session loop does after an inbound frame.
#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Reply(Packet),
    /// The gateway refused the namespace; the error was already reported.
    Rejected,
    /// The gateway ended the session with this disconnect reason.
    Ended(&'static str, SessionEnd),
}

/// State of one established socket.
struct Session<'a> {
    events_tx: &'a mpsc::UnboundedSender<TransportEvent>,
    reconnecting: bool,
    confirmed: bool,
    /// Connect deadline until confirmed, then the heartbeat deadline.
    deadline: Instant,
    heartbeat: Duration,
    pending: HashMap<u64, AckTx>,
    next_ack: u64,
}

impl<'a> Session<'a> {
    fn new(
        events_tx: &'a mpsc::UnboundedSender<TransportEvent>,
        reconnecting: bool,
        deadline: Instant,
    ) -> Self {
        Self {
            events_tx,
            reconnecting,
            confirmed: false,
            deadline,
            heartbeat: Duration::ZERO,
            pending: HashMap::new(),
            next_ack: 0,
        }
    }

    async fn run(
        &mut self,
        ws: WsStream,
        cmd_rx: &mut mpsc::UnboundedReceiver<Outbound>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        let reason = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    if self.confirmed {
                        let _ = sink.send(text(&Packet::Disconnect)).await;
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    self.fail_pending();
                    return SessionEnd::LocalClose;
                }
                () = tokio::time::sleep_until(self.deadline) => {
                    if self.confirmed {
                        break PING_TIMEOUT_REASON;
                    }
                    debug!("gateway did not accept the connection in time");
                    let _ = sink.send(Message::Close(None)).await;
                    self.fail_pending();
                    self.emit(TransportEvent::Error {
                        payload: Value::String(CONNECT_TIMEOUT_ERROR.to_string()),
                    });
                    return SessionEnd::Dropped;
                }
                cmd = cmd_rx.recv(), if self.confirmed => {
                    let Some(cmd) = cmd else {
                        self.fail_pending();
                        return SessionEnd::LocalClose;
                    };
                    let id = self.next_ack;
                    self.next_ack += 1;
                    debug!(event = %cmd.event, ack = id, "sending event");
                    let packet = Packet::Event { id: Some(id), name: cmd.event, data: cmd.data };
                    let _ = self.pending.insert(id, cmd.ack_tx);
                    if let Err(e) = sink.send(text(&packet)).await {
                        debug!(error = %e, "websocket send failed");
                        break TRANSPORT_ERROR_REASON;
                    }
                }
                msg = stream.next() => match msg {
                    None | Some(Ok(Message::Close(_))) => break TRANSPORT_CLOSE_REASON,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break TRANSPORT_ERROR_REASON;
                    }
                    Some(Ok(Message::Text(frame))) => match self.handle_text(&frame) {
                        Flow::Continue => {}
                        Flow::Reply(packet) => {
                            if sink.send(text(&packet)).await.is_err() {
                                break TRANSPORT_ERROR_REASON;
                            }
                        }
                        Flow::Rejected => {
                            let _ = sink.send(Message::Close(None)).await;
                            self.fail_pending();
                            return SessionEnd::Dropped;
                        }
                        Flow::Ended(reason, end) => {
                            self.fail_pending();
                            self.emit(TransportEvent::Disconnect { reason: reason.to_string() });
                            return end;
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break TRANSPORT_ERROR_REASON;
                        }
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        self.fail_pending();
        self.emit(TransportEvent::Disconnect {
            reason: reason.to_string(),
        });
        SessionEnd::Dropped
    }

    fn handle_text(&mut self, frame: &str) -> Flow {
        let packet = match socketio::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(error = %e, "ignoring frame");
                return Flow::Continue;
            }
        };

        match packet {
            Packet::Open(handshake) => {
                debug!(sid = %handshake.sid, "engine session opened");
                self.heartbeat = handshake.heartbeat();
                Flow::Reply(Packet::Connect(None))
            }
            Packet::Connect(_) => {
                if self.confirmed {
                    return Flow::Continue;
                }
                self.confirmed = true;
                self.deadline = Instant::now() + self.heartbeat;
                if self.reconnecting {
                    info!("websocket transport reconnected");
                    self.emit(TransportEvent::Reconnect);
                }
                self.emit(TransportEvent::Connect);
                Flow::Continue
            }
            Packet::Ping => {
                if self.confirmed {
                    self.deadline = Instant::now() + self.heartbeat;
                }
                Flow::Reply(Packet::Pong)
            }
            Packet::Pong | Packet::Noop => Flow::Continue,
            Packet::Close => Flow::Ended(TRANSPORT_CLOSE_REASON, SessionEnd::Dropped),
            Packet::Disconnect => Flow::Ended(SERVER_DISCONNECT_REASON, SessionEnd::ServerClose),
            Packet::Event { id, name, data } => {
                if let Some(id) = id {
                    debug!(event = %name, ack = id, "gateway ack request is not answered");
                }
                self.emit(TransportEvent::Message { event: name, data });
                Flow::Continue
            }
            Packet::Ack { id, args } => {
                match self.pending.remove(&id) {
                    Some(tx) => {
                        let mut args = args.into_iter();
                        let error = args.next().filter(|e| !e.is_null());
                        let data = args.next().unwrap_or(Value::Null);
                        let _ = tx.send(Ok(Ack { error, data }));
                    }
                    None => debug!(ack = id, "acknowledgement for unknown id"),
                }
                Flow::Continue
            }
            Packet::ConnectError(payload) => {
                warn!(error = %payload, "gateway refused the connection");
                self.emit(TransportEvent::Error { payload });
                Flow::Rejected
            }
        }
    }

    fn fail_pending(&mut self) {
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(TransportError::Closed));
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }
}

fn text(packet: &Packet) -> Message {
    Message::Text(packet.encode().into())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
