//! Rate limiting primitives
//!
//! Both primitives park callers on a FIFO queue of one-shot signals that is
//! drained front-to-back when capacity returns.

mod global_gate;
mod times_per;

pub use global_gate::GlobalGate;
pub use times_per::TimesPer;
