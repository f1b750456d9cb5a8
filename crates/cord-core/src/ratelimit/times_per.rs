//! Fixed-window limiter
//!
//! Grants at most `limit` acquisitions per `period`. Slots come back only when
//! the window resets, never when a holder finishes; this limits rate, not
//! concurrency.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// "N operations per fixed window" gate with a FIFO backpressure queue
///
/// Cloning yields another handle to the same window.
#[derive(Clone)]
pub struct TimesPer {
    inner: Arc<Inner>,
}

struct Inner {
    limit: u32,
    period: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    /// Slots left in the current window
    current: u32,
    /// Callers parked until the next reset
    waiters: VecDeque<oneshot::Sender<()>>,
    /// Whether a reset is scheduled for the current window
    pending_reset: bool,
}

impl TimesPer {
    /// Create a limiter granting `limit` acquisitions every `period`
    ///
    /// A zero limit is raised to one.
    #[must_use]
    pub fn new(limit: u32, period: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            inner: Arc::new(Inner {
                limit,
                period,
                state: Mutex::new(WindowState {
                    current: limit,
                    waiters: VecDeque::new(),
                    pending_reset: false,
                }),
            }),
        }
    }

    /// Maximum acquisitions per window
    pub fn limit(&self) -> u32 {
        self.inner.limit
    }

    /// Window length
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Slots still available in the current window
    pub fn available(&self) -> u32 {
        self.inner.state.lock().current
    }

    /// Callers currently waiting for a slot
    pub fn queued(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Wait for a slot and consume it
    ///
    /// The first acquisition of a window schedules its reset. Dropping the
    /// returned future while it waits gives up the place in the queue; a slot
    /// handed over concurrently is passed on rather than lost.
    pub async fn acquire(&self) {
        let rx = {
            let mut state = self.inner.state.lock();
            if state.current > 0 {
                state.current -= 1;
                Inner::schedule_reset(&self.inner, &mut state);
                return;
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            tracing::trace!(queued = state.waiters.len(), "Window exhausted, waiting for reset");
            rx
        };

        let mut waiter = Waiter {
            rx: Some(rx),
            inner: Arc::clone(&self.inner),
        };
        waiter.wait().await;
    }
}

impl Inner {
    fn schedule_reset(inner: &Arc<Self>, state: &mut WindowState) {
        if state.pending_reset {
            return;
        }
        state.pending_reset = true;

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.period).await;
            Inner::reset(&inner);
        });
    }

    /// Restock the window and hand slots to queued callers in FIFO order
    fn reset(inner: &Arc<Self>) {
        let mut state = inner.state.lock();
        state.current = inner.limit;
        state.pending_reset = false;

        let mut granted = 0u32;
        while state.current > 0 {
            let Some(tx) = state.waiters.pop_front() else {
                break;
            };
            if tx.send(()).is_ok() {
                state.current -= 1;
                granted += 1;
            }
        }

        tracing::trace!(granted, queued = state.waiters.len(), "Window reset");

        // Granted slots open the next window straight away
        if granted > 0 {
            Self::schedule_reset(inner, &mut state);
        }
    }

    /// Return a slot that was handed to a caller who stopped waiting
    fn give_back(&self) {
        let mut state = self.state.lock();
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        state.current = (state.current + 1).min(self.limit);
    }
}

/// A queued acquisition; passes its slot on if dropped after being granted
struct Waiter {
    rx: Option<oneshot::Receiver<()>>,
    inner: Arc<Inner>,
}

impl Waiter {
    async fn wait(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            rx.await.ok();
        }
        self.rx = None;
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            if rx.try_recv().is_ok() {
                self.inner.give_back();
            }
        }
    }
}

impl std::fmt::Debug for TimesPer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TimesPer")
            .field("limit", &self.inner.limit)
            .field("period", &self.inner.period)
            .field("current", &state.current)
            .field("queued", &state.waiters.len())
            .finish()
    }
}
