//! Shared open/closed gate
//!
//! Closed for a fixed duration when the remote API reports a global rate limit.
//! While closed every caller of [`GlobalGate::enter`] parks; reopening releases
//! all of them at once.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Blanket throttle shared by every route of one HTTP client
///
/// Cloning yields another handle to the same gate.
#[derive(Clone, Default)]
pub struct GlobalGate {
    inner: Arc<Mutex<GateState>>,
}

#[derive(Default)]
struct GateState {
    closed: bool,
    /// Bumped on every close so a stale timer cannot reopen a newer closure
    generation: u64,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl GlobalGate {
    /// Create an open gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether callers are currently being held
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of callers parked at the gate
    pub fn queued(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Pass through the gate, waiting while it is closed
    pub async fn enter(&self) {
        let rx = {
            let mut state = self.inner.lock();
            if !state.closed {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        rx.await.ok();
    }

    /// Close the gate for `duration`
    ///
    /// Has no effect if the gate is already closed; the running closure keeps
    /// its original reopen time. Returns whether this call closed the gate.
    pub fn close(&self, duration: Duration) -> bool {
        let generation = {
            let mut state = self.inner.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            state.generation += 1;
            state.generation
        };

        tracing::warn!(
            retry_after_ms = duration.as_millis() as u64,
            "Global rate limit hit, gate closed"
        );

        let gate = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            gate.reopen(generation);
        });

        true
    }

    /// Open the gate immediately, releasing every parked caller
    pub fn open(&self) {
        let mut state = self.inner.lock();
        Self::release(&mut state);
    }

    /// Timer-driven open; ignored if the gate was closed again since
    fn reopen(&self, generation: u64) {
        let mut state = self.inner.lock();
        if state.generation == generation {
            Self::release(&mut state);
        }
    }

    fn release(state: &mut GateState) {
        if !state.closed {
            return;
        }
        state.closed = false;

        let released = state.waiters.len();
        for tx in state.waiters.drain(..) {
            tx.send(()).ok();
        }
        tracing::info!(released, "Global rate limit gate reopened");
    }
}

impl std::fmt::Debug for GlobalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("GlobalGate")
            .field("closed", &state.closed)
            .field("queued", &state.waiters.len())
            .finish()
    }
}
