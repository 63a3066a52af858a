//! End-to-end tests of `EventsClient` over the WebSocket transport against
//! an in-process gateway.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use unloq_client::{ClientNotification, ConnectionState, EventsClient};
use unloq_core::{Delivery, EventCallback, namespaces};
use unloq_settings::{EventsSettings, TransportSettings};

const KEY: &str = "secret-key";

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    /// Confirm sessions, answer dispatches, emit one event per subscribe.
    Serve,
    /// Like `Serve`, but hang up after the first subscribe of the first session.
    DropFirstSession,
    /// Complete the upgrade, then close without confirming.
    CloseBeforeConfirm,
    /// Open the engine session but never accept the namespace.
    NeverConfirm,
    /// Refuse the namespace with a `CONNECT_ERROR`.
    RefuseNamespace,
}

const OPEN: &str =
    r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

struct Gateway {
    url: String,
    connections: Arc<AtomicUsize>,
    subscribes: Arc<Mutex<Vec<String>>>,
}

async fn start_gateway(behavior: Behavior) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let subscribes = Arc::new(Mutex::new(Vec::new()));

    let conns = Arc::clone(&connections);
    let subs = Arc::clone(&subscribes);
    let _ = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = conns.fetch_add(1, Ordering::SeqCst);
            let _ = tokio::spawn(serve(stream, behavior, index, Arc::clone(&subs)));
        }
    });

    Gateway {
        url: format!("http://{addr}"),
        connections,
        subscribes,
    }
}

fn check_handshake(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let authorized = header("authorization") == Some(format!("Bearer {KEY}"));
    let agent_ok = header("user-agent").as_deref() == Some("unloq-events");
    let query = req.uri().query().unwrap_or_default();
    let engine_ok = query.contains("EIO=4") && query.contains("transport=websocket");
    if req.uri().path() == "/ws/" && engine_ok && authorized && agent_ok {
        return Ok(resp);
    }
    let mut rejection = ErrorResponse::new(Some("Unauthorized".to_string()));
    *rejection.status_mut() = StatusCode::UNAUTHORIZED;
    Err(rejection)
}

async fn serve(
    stream: TcpStream,
    behavior: Behavior,
    index: usize,
    subscribes: Arc<Mutex<Vec<String>>>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, check_handshake).await else {
        return;
    };

    if behavior == Behavior::CloseBeforeConfirm {
        let _ = ws.close(None).await;
        return;
    }
    if ws.send(Message::Text(OPEN.into())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let reply = match text.as_str() {
            "40" => match behavior {
                Behavior::NeverConfirm => continue,
                Behavior::RefuseNamespace => {
                    r#"44{"message":"connection authorization failed"}"#.to_string()
                }
                _ => r#"40{"sid":"n1"}"#.to_string(),
            },
            "3" | "41" => continue,
            frame => {
                let Some((id, args)) = parse_event(frame) else {
                    continue;
                };
                if args[0] != "dispatch" {
                    continue;
                }
                let action = args[1]["type"].as_str().unwrap_or_default().to_string();
                let namespace = args[1]["payload"]["namespace"].clone();
                let ack = json!([null, {"type": action, "namespace": namespace, "ok": true}]);
                if ws
                    .send(Message::Text(format!("43{id}{ack}").into()))
                    .await
                    .is_err()
                {
                    return;
                }
                if action != "subscribe" {
                    continue;
                }
                subscribes
                    .lock()
                    .push(namespace.as_str().unwrap_or_default().to_string());
                if behavior == Behavior::DropFirstSession && index == 0 {
                    let _ = ws.send(Message::Text(event_frame(&namespace, index).into())).await;
                    let _ = ws.close(None).await;
                    return;
                }
                event_frame(&namespace, index)
            }
        };
        if ws.send(Message::Text(reply.into())).await.is_err() {
            return;
        }
    }
}

/// Split `42<id>[...]` into its ack id and arguments.
fn parse_event(frame: &str) -> Option<(u64, Vec<Value>)> {
    let body = frame.strip_prefix("42")?;
    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    let (id, args) = body.split_at(digits);
    let args: Vec<Value> = serde_json::from_str(args).ok()?;
    Some((id.parse().ok()?, args))
}

fn event_frame(namespace: &Value, index: usize) -> String {
    let event = json!([
        "event",
        {"namespace": namespace, "type": "permission.save", "payload": {"id": index}},
    ]);
    format!("42{event}")
}

fn client_for(url: &str, key: &str, reconnection: bool) -> EventsClient {
    EventsClient::new(EventsSettings {
        gateway: url.to_string(),
        key: Some(key.to_string()),
        transport: TransportSettings {
            reconnection,
            ..TransportSettings::default()
        },
        ..Default::default()
    })
    .unwrap()
}

fn recorder() -> (EventCallback, Arc<Mutex<Vec<Delivery>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (EventCallback::new(move |d| sink.lock().push(d.clone())), seen)
}

async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn subscribe_acknowledges_and_delivers() {
    let gateway = start_gateway(Behavior::Serve).await;
    let client = client_for(&gateway.url, KEY, false);
    let (cb, seen) = recorder();

    let ack = client
        .subscribe_filtered(namespaces::IAM, "permission.save", cb)
        .await
        .unwrap();
    assert_eq!(ack, Some(json!({"namespace": "IAM", "ok": true})));
    assert_eq!(client.state(), ConnectionState::Connected);

    eventually("event delivered", || !seen.lock().is_empty()).await;
    assert_eq!(
        seen.lock()[0],
        Delivery::new("permission.save", json!({"id": 0}))
    );
    assert_eq!(*gateway.subscribes.lock(), vec!["IAM"]);

    let ack = client.unsubscribe(namespaces::IAM, None).await.unwrap();
    assert_eq!(ack, Some(json!({"namespace": "IAM", "ok": true})));
    client.close();
}

#[tokio::test]
async fn rejected_key_is_authorization_error() {
    let gateway = start_gateway(Behavior::Serve).await;
    let client = client_for(&gateway.url, "wrong-key", true);

    let err = client.connect().await.unwrap_err();
    assert_eq!(err.code(), "AUTHORIZATION");
    assert_eq!(err.to_string(), "authorization failed: Invalid API Key");

    // The transport was torn down instead of retrying.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(gateway.connections.load(Ordering::SeqCst), 1);
    assert_eq!(client.connect().await.unwrap_err().code(), "AUTHORIZATION");
}

#[tokio::test]
async fn close_before_confirmation_is_authorization_error() {
    let gateway = start_gateway(Behavior::CloseBeforeConfirm).await;
    let client = client_for(&gateway.url, KEY, false);
    let (cb, _) = recorder();

    let err = client.subscribe(namespaces::IAM, cb).await.unwrap_err();
    assert_eq!(err.code(), "AUTHORIZATION");
    assert!(client.namespaces().is_empty());
}

#[tokio::test]
async fn refused_namespace_is_authorization_error() {
    let gateway = start_gateway(Behavior::RefuseNamespace).await;
    let client = client_for(&gateway.url, KEY, true);

    let err = client.connect().await.unwrap_err();
    assert_eq!(err.code(), "AUTHORIZATION");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unaccepted_session_times_out() {
    let gateway = start_gateway(Behavior::NeverConfirm).await;
    let client = client_for(&gateway.url, KEY, false);

    let result = tokio::time::timeout(Duration::from_secs(5), client.connect())
        .await
        .expect("connect settles within the connect timeout");
    let err = result.unwrap_err();
    assert_eq!(err.code(), "TRANSPORT");
    assert_eq!(err, unloq_core::EventsError::transport("timeout"));
    assert_eq!(gateway.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_gateway_fails_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = client_for(&url, KEY, false);
    let err = client.connect().await.unwrap_err();
    assert_eq!(err.code(), "TRANSPORT");

    // The stopped transport is replaced on the next attempt.
    let err = client.connect().await.unwrap_err();
    assert_eq!(err.code(), "TRANSPORT");
}

#[tokio::test]
async fn reconnect_replays_subscriptions() {
    let gateway = start_gateway(Behavior::DropFirstSession).await;
    let client = client_for(&gateway.url, KEY, true);
    let mut notifications = client.notifications();
    let (cb, seen) = recorder();

    let _ = client.subscribe(namespaces::IAM, cb).await.unwrap();

    eventually("replayed subscribe", || gateway.subscribes.lock().len() == 2).await;
    assert_eq!(*gateway.subscribes.lock(), vec!["IAM", "IAM"]);
    eventually("event from second session", || seen.lock().len() == 2).await;
    assert_eq!(seen.lock()[1].payload, json!({"id": 1}));
    assert_eq!(gateway.connections.load(Ordering::SeqCst), 2);

    let mut observed = Vec::new();
    while let Ok(n) = notifications.try_recv() {
        observed.push(n);
    }
    assert_eq!(
        observed,
        vec![
            ClientNotification::Connect,
            ClientNotification::Disconnect {
                reason: "transport close".into(),
                error: None,
            },
            ClientNotification::Connect,
        ]
    );
    client.close();
}
