//! Gateway messages as the server sends them, and decoders for what the
//! client sends back

use cord_gateway::protocol::{IdentifyPayload, ResumePayload};
use cord_gateway::{GatewayMessage, OpCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// op 10 announcing `heartbeat_interval` milliseconds
pub fn hello(heartbeat_interval: u64) -> GatewayMessage {
    GatewayMessage::new(OpCode::Hello, json!({ "heartbeat_interval": heartbeat_interval }))
}

/// op 0 with an event name and sequence number
pub fn dispatch(event: impl Into<String>, sequence: u64, data: Value) -> GatewayMessage {
    GatewayMessage {
        op: OpCode::Dispatch,
        d: data,
        s: Some(sequence),
        t: Some(event.into()),
    }
}

pub fn heartbeat_ack() -> GatewayMessage {
    GatewayMessage::new(OpCode::HeartbeatAck, Value::Null)
}

pub fn reconnect() -> GatewayMessage {
    GatewayMessage::new(OpCode::Reconnect, Value::Null)
}

pub fn invalid_session(resumable: bool) -> GatewayMessage {
    GatewayMessage::new(OpCode::InvalidSession, Value::Bool(resumable))
}

/// Identify payload, if `message` is one
pub fn identify_payload(message: &GatewayMessage) -> Option<IdentifyPayload> {
    decode(message, OpCode::Identify)
}

/// Resume payload, if `message` is one
pub fn resume_payload(message: &GatewayMessage) -> Option<ResumePayload> {
    decode(message, OpCode::Resume)
}

fn decode<T: DeserializeOwned>(message: &GatewayMessage, op: OpCode) -> Option<T> {
    if message.op != op {
        return None;
    }
    T::deserialize(&message.d).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoders_check_the_opcode() {
        let message = GatewayMessage::new(
            OpCode::Resume,
            json!({ "token": "t", "session_id": "abc", "seq": 4 }),
        );

        assert_eq!(resume_payload(&message).unwrap().seq, Some(4));
        assert!(identify_payload(&message).is_none());
    }
}
