//! Socket.IO v5 packets carried in Engine.IO v4 WebSocket text frames.
//!
//! Only the default namespace and text packets are supported. An Engine.IO
//! frame is a one-digit type followed by its payload; Socket.IO packets ride
//! inside Engine.IO `message` frames:
//!
//! ```text
//! 0{"sid":..,"pingInterval":..,"pingTimeout":..}   open
//! 2 / 3                                            ping / pong
//! 40 / 40{"sid":..}                                connect request / accepted
//! 41                                               disconnect
//! 42<id>["name",data]                              event (id asks for an ack)
//! 43<id>[err,res]                                  ack
//! 44{"message":..}                                 connect error
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

/// Engine.IO protocol revision requested in the query string.
pub const ENGINE_IO_VERSION: &str = "4";

/// Session parameters from the Engine.IO `open` packet.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
}

impl Handshake {
    /// How long the connection may stay silent before it is considered dead.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// Engine.IO `open`.
    Open(Handshake),
    /// Engine.IO `close`.
    Close,
    /// Engine.IO `ping`.
    Ping,
    /// Engine.IO `pong`.
    Pong,
    /// Engine.IO `noop`.
    Noop,
    /// Socket.IO `CONNECT`; the gateway's reply carries the socket id.
    Connect(Option<Value>),
    /// Socket.IO `DISCONNECT`.
    Disconnect,
    /// Socket.IO `EVENT`.
    Event {
        /// Ack id the sender waits on.
        id: Option<u64>,
        /// Event name.
        name: String,
        /// First argument, `Null` when absent.
        data: Value,
    },
    /// Socket.IO `ACK`.
    Ack {
        /// Id of the acknowledged event.
        id: u64,
        /// Acknowledgement arguments.
        args: Vec<Value>,
    },
    /// Socket.IO `CONNECT_ERROR`, reduced to its message when it has one.
    ConnectError(Value),
}

/// Frames that cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Empty frame.
    #[error("empty frame")]
    Empty,
    /// Unknown Engine.IO or Socket.IO packet type.
    #[error("unknown packet type '{0}'")]
    UnknownType(char),
    /// Binary packets are not supported.
    #[error("binary packets are not supported")]
    Binary,
    /// Packet addressed to a namespace other than `/`.
    #[error("packet for namespace '{0}'")]
    Namespace(String),
    /// Payload is not the JSON the packet type requires.
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// The Engine.IO WebSocket endpoint under `base`.
///
/// The path keeps a single trailing slash, as Socket.IO servers expect.
pub fn endpoint(base: &Url) -> Url {
    let mut url = base.clone();
    let path = format!("{}/", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");
    url
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<Packet, DecodeError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(DecodeError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|e| DecodeError::Payload(e.to_string())),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_message(rest),
        '6' => Ok(Packet::Noop),
        other => Err(DecodeError::UnknownType(other)),
    }
}

fn decode_message(body: &str) -> Result<Packet, DecodeError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(DecodeError::Empty)?;
    match kind {
        '0'..='4' => {}
        '5' | '6' => return Err(DecodeError::Binary),
        other => return Err(DecodeError::UnknownType(other)),
    }
    let mut rest = chars.as_str();

    if let Some(addressed) = rest.strip_prefix('/') {
        let (namespace, tail) = addressed.split_once(',').unwrap_or((addressed, ""));
        if !namespace.is_empty() {
            return Err(DecodeError::Namespace(format!("/{namespace}")));
        }
        rest = tail;
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let (id, payload) = rest.split_at(digits);
    let id = if id.is_empty() {
        None
    } else {
        Some(id.parse::<u64>().map_err(|e| DecodeError::Payload(e.to_string()))?)
    };
    let payload = if payload.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(payload)
                .map_err(|e| DecodeError::Payload(e.to_string()))?,
        )
    };

    match kind {
        '0' => Ok(Packet::Connect(payload)),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let Some(Value::Array(mut args)) = payload else {
                return Err(DecodeError::Payload("event without arguments".into()));
            };
            if args.is_empty() {
                return Err(DecodeError::Payload("event without a name".into()));
            }
            let Value::String(name) = args.remove(0) else {
                return Err(DecodeError::Payload("event name is not a string".into()));
            };
            let data = args.into_iter().next().unwrap_or(Value::Null);
            Ok(Packet::Event { id, name, data })
        }
        '3' => {
            let id = id.ok_or_else(|| DecodeError::Payload("ack without id".into()))?;
            let args = match payload {
                Some(Value::Array(args)) => args,
                _ => return Err(DecodeError::Payload("ack without arguments".into())),
            };
            Ok(Packet::Ack { id, args })
        }
        _ => {
            let payload = payload.unwrap_or(Value::Null);
            let message = payload.get("message").and_then(Value::as_str).map(str::to_string);
            Ok(Packet::ConnectError(message.map_or(payload, Value::String)))
        }
    }
}

impl Packet {
    /// Encode as a text frame.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => format!(
                "0{}",
                json!({
                    "sid": handshake.sid,
                    "upgrades": [],
                    "pingInterval": handshake.ping_interval,
                    "pingTimeout": handshake.ping_timeout,
                })
            ),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Noop => "6".to_string(),
            Self::Connect(None) => "40".to_string(),
            Self::Connect(Some(payload)) => format!("40{payload}"),
            Self::Disconnect => "41".to_string(),
            Self::Event { id, name, data } => {
                let id = id.map(|id| id.to_string()).unwrap_or_default();
                format!("42{id}{}", json!([name, data]))
            }
            Self::Ack { id, args } => format!("43{id}{}", Value::Array(args.clone())),
            Self::ConnectError(payload) => format!("44{}", json!({ "message": payload })),
        }
    }
}
