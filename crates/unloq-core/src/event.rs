//! Inbound event envelope.
//!
//! The gateway sends `{namespace, type, payload, ...}`. The namespace only
//! selects the registrations; callbacks receive the remainder as a
//! [`Delivery`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::NAMESPACE_FIELD;

/// The value handed to a matching subscription callback.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Delivery {
    /// Event type, matched against the registration filter.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload, `null` when the gateway sent none.
    pub payload: Value,
    /// Any other envelope fields the gateway attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Delivery {
    /// Create a delivery with no extra fields.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            extra: Map::new(),
        }
    }
}

/// Split a raw inbound event into its namespace and the callback value.
///
/// Returns `None` when the value is not an object or its namespace is not a
/// string. A missing or non-string `type` becomes the empty string, which no
/// exact matcher for a real event type will accept.
pub fn split_envelope(raw: Value) -> Option<(String, Delivery)> {
    let Value::Object(mut fields) = raw else {
        return None;
    };
    let Some(Value::String(namespace)) = fields.remove(NAMESPACE_FIELD) else {
        return None;
    };
    let event_type = match fields.remove("type") {
        Some(Value::String(t)) => t,
        _ => String::new(),
    };
    let payload = fields.remove("payload").unwrap_or(Value::Null);

    Some((
        namespace,
        Delivery {
            event_type,
            payload,
            extra: fields,
        },
    ))
}
