//! # cord-client
//!
//! Ties the rate-limited HTTP client and the sharded gateway together and
//! shuts both down on the first fatal error.

pub mod client;
pub mod error;

pub use client::Client;
pub use error::{ClientError, ClientResult};

pub use cord_common::ClientConfig;
pub use cord_gateway::ShardEvent;
