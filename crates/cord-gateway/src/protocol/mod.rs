//! Gateway protocol definitions
//!
//! Op codes, close codes and the message envelope as seen from the client.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, Recovery};
pub use messages::{Envelope, GatewayMessage};
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload};
