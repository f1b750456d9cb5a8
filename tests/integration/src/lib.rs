//! Integration test utilities
//!
//! Local stand-ins for the REST API and the websocket gateway, so the HTTP
//! client, shards and gateway can be exercised end to end over real sockets.

pub mod frames;
pub mod helpers;
pub mod mock_api;

pub use helpers::*;
pub use mock_api::{MockApi, MockResponse};
pub use mock_gateway::{Inbound, MockConnection, MockGateway};
