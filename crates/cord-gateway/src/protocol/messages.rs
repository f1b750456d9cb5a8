//! Gateway message envelope

use super::{HelloPayload, IdentifyPayload, OpCode, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opcode and sequence of a payload, read before the typed decode
///
/// Accepts opcodes this client does not know, so their sequence number is
/// still recorded.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub s: Option<u64>,
}

impl Envelope {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Known opcode, if any
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.op)
    }
}

/// `{op, d, s, t}` envelope shared by every gateway message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: OpCode,

    #[serde(default)]
    pub d: Value,

    /// Sequence number, usually dispatches only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name, dispatches only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayMessage {
    #[must_use]
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    /// op 1 carrying the last sequence number seen
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, last_sequence.map_or(Value::Null, Value::from))
    }

    pub fn identify(payload: &IdentifyPayload) -> serde_json::Result<Self> {
        Ok(Self::new(OpCode::Identify, serde_json::to_value(payload)?))
    }

    pub fn resume(payload: &ResumePayload) -> serde_json::Result<Self> {
        Ok(Self::new(OpCode::Resume, serde_json::to_value(payload)?))
    }

    // === Parsing ===

    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.decode(OpCode::Hello)
    }

    /// Event name if this is a dispatch
    pub fn event_name(&self) -> Option<&str> {
        if self.op == OpCode::Dispatch {
            self.t.as_deref()
        } else {
            None
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, op: OpCode) -> Option<T> {
        if self.op != op {
            return None;
        }
        T::deserialize(&self.d).ok()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
