//! JSON payloads carried inside frames.
//!
//! Requests carry a `cmd`, a per-session unique `nonce`, and optional `args`;
//! the peer echoes the nonce in its response. Unsolicited events arrive with
//! an `evt` discriminator and no nonce. An `"evt": "ERROR"` response signals
//! a remote-side failure and decodes into a typed [`RemoteError`] instead of
//! a successful payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

/// Event discriminator the peer uses to flag a failed request.
pub const ERROR_EVENT: &str = "ERROR";

/// Identification payload sent once, fire-and-forget, after transport open.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Handshake {
    /// Protocol version the client speaks.
    pub v: u32,
    /// Application identifier presented to the peer.
    pub client_id: String,
}

/// Outbound request envelope.
///
/// `evt` is only populated by subscription commands; everything else carries
/// its parameters in `args`.
#[derive(Clone, Debug, Serialize)]
pub struct RequestEnvelope {
    /// Command name.
    pub cmd: String,
    /// Correlation token echoed back by the peer.
    pub nonce: String,
    /// Event name, for subscription commands only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evt: Option<String>,
    /// Command-specific arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Inbound envelope: a correlated response or a dispatched event.
///
/// All fields are optional on the wire; routing is decided by which are
/// present. A nonce marks a response for the multiplexer, an event name
/// without a nonce marks a dispatch for the router.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResponseEnvelope {
    /// Command this envelope answers, when the peer includes it.
    #[serde(default)]
    pub cmd: Option<String>,
    /// Correlation token from the originating request.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Event discriminator.
    #[serde(default)]
    pub evt: Option<String>,
    /// Response or event payload.
    #[serde(default)]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    /// Whether this envelope answers an outstanding request.
    #[must_use]
    pub fn is_response(&self) -> bool { self.nonce.is_some() }

    /// Whether the peer flagged this envelope as a failure.
    #[must_use]
    pub fn is_error(&self) -> bool { self.evt.as_deref() == Some(ERROR_EVENT) }

    /// Convert into the result delivered to the waiting caller.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] decoded from `data` when the envelope
    /// carries the error discriminator. An error body that itself fails to
    /// parse still yields a `RemoteError`, with code 0 and the raw body as
    /// the message.
    pub fn into_result(self) -> Result<Value, RemoteError> {
        if !self.is_error() {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        let data = self.data.unwrap_or(Value::Null);
        match serde_json::from_value::<ErrorBody>(data.clone()) {
            Ok(body) => Err(RemoteError {
                code: body.code,
                message: body.message,
            }),
            Err(_) => Err(RemoteError {
                code: 0,
                message: data.to_string(),
            }),
        }
    }
}

/// Body of an `"evt": "ERROR"` envelope.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: u32,
    message: String,
}

/// Body of a close frame.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ClosePayload {
    /// Numeric close code, classified by the session's close policy.
    pub code: u16,
    /// Human-readable close reason.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_omits_absent_fields() {
        let envelope = RequestEnvelope {
            cmd: "PING".into(),
            nonce: "0000000000000001".into(),
            evt: None,
            args: None,
        };
        let encoded = serde_json::to_value(&envelope).expect("serializes");
        assert_eq!(encoded, json!({"cmd": "PING", "nonce": "0000000000000001"}));
    }

    #[test]
    fn error_envelope_decodes_into_remote_error() {
        let envelope: ResponseEnvelope = serde_json::from_value(json!({
            "cmd": "AUTHORIZE",
            "nonce": "0000000000000007",
            "evt": "ERROR",
            "data": {"code": 4007, "message": "no permission"},
        }))
        .expect("deserializes");

        assert!(envelope.is_response());
        assert!(envelope.is_error());
        let err = envelope.into_result().expect_err("expected remote error");
        assert_eq!(err.code, 4007);
        assert_eq!(err.message, "no permission");
    }

    #[test]
    fn unparseable_error_body_still_yields_remote_error() {
        let envelope: ResponseEnvelope = serde_json::from_value(json!({
            "nonce": "0000000000000001",
            "evt": "ERROR",
            "data": "catastrophe",
        }))
        .expect("deserializes");

        let err = envelope.into_result().expect_err("expected remote error");
        assert_eq!(err.code, 0);
        assert!(err.message.contains("catastrophe"));
    }

    #[test]
    fn event_envelope_routes_by_discriminator() {
        let envelope: ResponseEnvelope = serde_json::from_value(json!({
            "cmd": "DISPATCH",
            "evt": "MESSAGE_CREATE",
            "data": {"id": "123"},
        }))
        .expect("deserializes");

        assert!(!envelope.is_response());
        assert_eq!(envelope.evt.as_deref(), Some("MESSAGE_CREATE"));
    }
}
