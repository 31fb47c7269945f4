//! Wire framing: message-kind discrimination.
//!
//! Two modes coexist. The default **tagged** framing prefixes every request
//! with a one-byte kind (control = 0, data = 1, sentinel = 2), removing any
//! ambiguity between JSON control payloads and binary tensor payloads.
//! Replies travel untagged in both modes: the caller knows which kind of
//! request it sent, so the reply direction needs no discrimination. The
//! **legacy** mode reproduces the original implicit contract for existing
//! callers: a length-1 message closes the session, a JSON object carrying a
//! recognized construction key is a control message, and everything else is
//! treated as tensor data.
//!
//! A length-1 message is accepted as a sentinel in both modes; the tagged
//! sentinel is itself one byte, so the conventions coincide on the wire.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Kind byte for a control message.
pub const KIND_CONTROL: u8 = 0;
/// Kind byte for a tensor data message.
pub const KIND_DATA: u8 = 1;
/// Kind byte for the session-terminating sentinel.
pub const KIND_SENTINEL: u8 = 2;

/// Top-level JSON keys that mark a legacy message as a control message.
///
/// The construction-parameter keys plus the two nested override carriers.
pub const CONTROL_KEYS: &[&str] = &["model", "device", "gpu", "setup_kwargs", "execution_kwargs"];

/// Wire framing mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One-byte kind prefix on every request.
    #[default]
    Tagged,
    /// Original untagged contract: classification by payload shape.
    Legacy,
}

/// A classified inbound message, borrowing the payload from the raw buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    Control(&'a [u8]),
    Data(&'a [u8]),
    Sentinel,
}

/// Classify one raw message.
///
/// Legacy classification cannot fail: anything that is not a sentinel or a
/// recognizable control message is handed to the tensor codec, which
/// rejects it later if it is garbage. Tagged classification rejects unknown
/// kind bytes up front.
pub fn classify(raw: &[u8], framing: Framing) -> Result<Frame<'_>, ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if raw.len() == 1 {
        // Migration shim: any single byte closes the session.
        return Ok(Frame::Sentinel);
    }
    match framing {
        Framing::Tagged => match raw[0] {
            KIND_CONTROL => Ok(Frame::Control(&raw[1..])),
            KIND_DATA => Ok(Frame::Data(&raw[1..])),
            KIND_SENTINEL => Ok(Frame::Sentinel),
            other => Err(ProtocolError::UnknownKind(other)),
        },
        Framing::Legacy => Ok(classify_legacy(raw)),
    }
}

fn classify_legacy(raw: &[u8]) -> Frame<'_> {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(raw) {
        if let Some(obj) = value.as_object() {
            if CONTROL_KEYS.iter().any(|k| obj.contains_key(*k)) {
                return Frame::Control(raw);
            }
        }
    }
    Frame::Data(raw)
}

/// Frame an outbound control payload.
pub fn frame_control(payload: Vec<u8>, framing: Framing) -> Vec<u8> {
    frame(KIND_CONTROL, payload, framing)
}

/// Frame an outbound tensor payload.
pub fn frame_data(payload: Vec<u8>, framing: Framing) -> Vec<u8> {
    frame(KIND_DATA, payload, framing)
}

/// The one-byte sentinel message. Identical in both framing modes.
pub fn sentinel() -> Vec<u8> {
    vec![KIND_SENTINEL]
}

fn frame(kind: u8, payload: Vec<u8>, framing: Framing) -> Vec<u8> {
    match framing {
        Framing::Legacy => payload,
        Framing::Tagged => {
            let mut wire = Vec::with_capacity(payload.len() + 1);
            wire.push(kind);
            wire.extend_from_slice(&payload);
            wire
        }
    }
}
