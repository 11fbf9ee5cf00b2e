//! JSON envelope codec for the futures websocket wire protocol.
//!
//! Decoding classifies frames by the `type` discriminant before any
//! payload-specific parsing. Unknown envelope types and unknown
//! `topic`/`subject` combinations decode to the generic [`InboundFrame::Message`]
//! passthrough rather than failing, keeping the session forward-compatible
//! with undocumented topics.

use crate::error::Result;
use crate::websocket::registry::Subscription;
use serde::Deserialize;
use serde_json::{json, Value};

/// A decoded inbound envelope. Constructed per incoming frame and consumed
/// immediately by the router; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Handshake completion, sent once after the transport opens.
    Welcome { id: String },
    /// Receipt for a subscribe/unsubscribe request with `response: true`.
    Ack { id: String },
    /// Server-initiated ping; must be answered with a pong envelope.
    Ping { id: String },
    /// Reply to a client ping.
    Pong { id: String },
    /// Server-pushed error envelope, e.g. for an invalid topic.
    Error { code: i64, message: String },
    /// A data frame keyed by topic family, or the passthrough fallback.
    Message {
        topic: String,
        subject: String,
        data: Value,
    },
}

// Some documented envelopes (wallet events) omit the `type` field; they are
// data frames, so the discriminant defaults to "message".
fn default_kind() -> String {
    "message".to_string()
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    code: Option<Value>,
}

/// Ids appear both as JSON strings and as bare numbers on the wire.
fn id_to_string(id: Option<Value>) -> String {
    match id {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Decodes one raw text frame into an [`InboundFrame`].
///
/// Malformed JSON and non-object envelopes are errors; the caller drops the
/// frame and continues, they are never fatal to the session.
pub fn decode(raw: &str) -> Result<InboundFrame> {
    let envelope: RawEnvelope = serde_json::from_str(raw)?;
    let frame = match envelope.kind.as_str() {
        "welcome" => InboundFrame::Welcome {
            id: id_to_string(envelope.id),
        },
        "ack" => InboundFrame::Ack {
            id: id_to_string(envelope.id),
        },
        "ping" => InboundFrame::Ping {
            id: id_to_string(envelope.id),
        },
        "pong" => InboundFrame::Pong {
            id: id_to_string(envelope.id),
        },
        "error" => InboundFrame::Error {
            code: envelope
                .code
                .as_ref()
                .and_then(Value::as_i64)
                .or_else(|| {
                    envelope
                        .code
                        .as_ref()
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse().ok())
                })
                .unwrap_or(0),
            message: envelope
                .data
                .as_ref()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        // "message" and anything undocumented fall through to the
        // passthrough frame so new server-side types never break decoding.
        _ => InboundFrame::Message {
            topic: envelope.topic.unwrap_or_default(),
            subject: envelope.subject.unwrap_or_default(),
            data: envelope.data.unwrap_or(Value::Null),
        },
    };
    Ok(frame)
}

/// Encodes the subscribe control envelope for one registry entry.
pub fn subscribe_frame(sub: &Subscription) -> String {
    json!({
        "id": sub.id,
        "type": "subscribe",
        "topic": sub.topic,
        "privateChannel": sub.is_private,
        "response": sub.wants_ack,
    })
    .to_string()
}

/// Encodes the unsubscribe control envelope for a previously subscribed topic.
pub fn unsubscribe_frame(id: u64, topic: &str, is_private: bool) -> String {
    json!({
        "id": id,
        "type": "unsubscribe",
        "topic": topic,
        "privateChannel": is_private,
    })
    .to_string()
}

/// Encodes a client keep-alive ping.
pub fn ping_frame(id: u64) -> String {
    json!({ "id": id.to_string(), "type": "ping" }).to_string()
}

/// Encodes the pong reply to a server-initiated ping.
pub fn pong_frame(id: &str) -> String {
    json!({ "id": id, "type": "pong" }).to_string()
}
