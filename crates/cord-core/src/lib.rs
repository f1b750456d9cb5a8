//! # cord-core
//!
//! Runtime primitives shared by the REST client and the gateway: the
//! publish/subscribe [`Dispatcher`], the fixed-window [`TimesPer`] limiter and
//! the [`GlobalGate`] used for service-wide backpressure.

pub mod dispatcher;
pub mod ratelimit;

// Re-export commonly used types at crate root
pub use dispatcher::{Dispatcher, ListenerId};
pub use ratelimit::{GlobalGate, TimesPer};
