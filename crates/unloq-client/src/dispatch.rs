//! Control-command dispatch.
//!
//! A dispatch emits `{"type": action, "payload": payload}` under the
//! transport message name `dispatch` and settles on the gateway's
//! acknowledgement. When the client is not connected the send waits for the
//! connection first.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use unloq_core::constants::{DISPATCH_EVENT, NAMESPACE_FIELD};
use unloq_core::{EventsError, ServerError};

use crate::client::ClientInner;
use crate::transport::Ack;

/// Reject empty action names.
pub(crate) fn validate_action(action: &str) -> Result<(), EventsError> {
    if action.is_empty() {
        return Err(EventsError::invalid_argument(
            "a dispatch requires a non-empty action name",
        ));
    }
    Ok(())
}

/// Absent and non-object payloads become `{}`.
pub(crate) fn normalize_payload(payload: Option<Value>) -> Value {
    match payload {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    }
}

/// The frame emitted for `action`.
pub(crate) fn dispatch_frame(action: &str, payload: Value) -> Value {
    let mut frame = Map::new();
    let _ = frame.insert("type".to_string(), Value::String(action.to_string()));
    let _ = frame.insert("payload".to_string(), payload);
    Value::Object(frame)
}

/// `{"namespace": namespace}`, the payload of subscribe/unsubscribe.
pub(crate) fn namespace_payload(namespace: &str) -> Value {
    let mut payload = Map::new();
    let _ = payload.insert(
        NAMESPACE_FIELD.to_string(),
        Value::String(namespace.to_string()),
    );
    Value::Object(payload)
}

/// Turn an acknowledgement into the dispatch result.
///
/// Errors become [`ServerError`]s. Successful bodies are normalized to an
/// object with any echoed string `type` removed.
pub(crate) fn settle_ack(ack: Ack) -> Result<Value, EventsError> {
    if let Some(error) = ack.error {
        return Err(ServerError::from_remote(error).into());
    }
    let Value::Object(mut body) = ack.data else {
        return Ok(Value::Object(Map::new()));
    };
    if body.get("type").is_some_and(Value::is_string) {
        let _ = body.remove("type");
    }
    Ok(Value::Object(body))
}

impl ClientInner {
    pub(crate) async fn dispatch(
        self: &Arc<Self>,
        action: &str,
        payload: Option<Value>,
    ) -> Result<Value, EventsError> {
        validate_action(action)?;
        let frame = dispatch_frame(action, normalize_payload(payload));

        let ready = self.connection.lock().connected_transport()?;
        let transport = match ready {
            Some(transport) => transport,
            None => {
                debug!(action, "waiting for connection before dispatch");
                self.connect().await?;
                let conn = self.connection.lock();
                if let Some(err) = conn.terminal() {
                    return Err(err.clone());
                }
                // A drop right after connecting still buffers in the transport.
                conn.transport().ok_or(EventsError::Closed)?
            }
        };

        debug!(action, "dispatching");
        let ack = transport.emit(DISPATCH_EVENT, frame).await?;
        settle_ack(ack)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_action_is_invalid() {
        let err = validate_action("").unwrap_err();
        assert_eq!(err.code(), "DATA.INVALID");
        assert!(validate_action("subscribe").is_ok());
    }

    #[test]
    fn payload_defaults_to_empty_object() {
        assert_eq!(normalize_payload(None), json!({}));
        assert_eq!(normalize_payload(Some(json!("x"))), json!({}));
        assert_eq!(normalize_payload(Some(json!([1]))), json!({}));
        assert_eq!(normalize_payload(Some(json!({"a": 1}))), json!({"a": 1}));
    }

    #[test]
    fn frame_shape() {
        assert_eq!(
            dispatch_frame("subscribe", namespace_payload("IAM")),
            json!({"type": "subscribe", "payload": {"namespace": "IAM"}})
        );
    }

    #[test]
    fn error_ack_becomes_server_error() {
        let err = settle_ack(Ack {
            error: Some(json!({"code": "NAMESPACE.UNKNOWN", "status": 404, "message": "nope", "ns": "X"})),
            data: Value::Null,
        })
        .unwrap_err();
        let EventsError::Server(server) = err else {
            panic!("expected server error");
        };
        assert_eq!(server.code, "NAMESPACE.UNKNOWN");
        assert_eq!(server.status, 404);
        assert_eq!(server.field("ns"), Some(&json!("X")));
    }

    #[test]
    fn error_ack_defaults() {
        let err = settle_ack(Ack {
            error: Some(json!({})),
            data: Value::Null,
        })
        .unwrap_err();
        assert_eq!(err.code(), "SERVER_ERROR");
    }

    #[test]
    fn success_ack_strips_echoed_type() {
        let body = settle_ack(Ack {
            error: None,
            data: json!({"type": "subscribe", "namespace": "IAM"}),
        })
        .unwrap();
        assert_eq!(body, json!({"namespace": "IAM"}));
    }

    #[test]
    fn non_string_type_is_kept() {
        let body = settle_ack(Ack {
            error: None,
            data: json!({"type": 3}),
        })
        .unwrap();
        assert_eq!(body, json!({"type": 3}));
    }

    #[test]
    fn non_object_ack_becomes_empty_object() {
        for data in [Value::Null, json!("ok"), json!([1, 2])] {
            let body = settle_ack(Ack { error: None, data }).unwrap();
            assert_eq!(body, json!({}));
        }
    }
}
