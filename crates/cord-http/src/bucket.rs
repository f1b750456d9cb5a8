//! Per-route rate-limit bucket
//!
//! Admission is `remaining - reserved > 0`, where `reserved` counts requests
//! admitted but not yet finished. Until the first response reports real
//! numbers only a single probe request is admitted; everyone else waits at a
//! flood gate and is released together once the probe reports back, or the
//! next one is let through as a new probe if it did not.

use crate::headers::RateLimitInfo;
use crate::route::BucketKey;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Clone)]
pub struct Bucket {
    key: Arc<BucketKey>,
    state: Arc<Mutex<BucketState>>,
}

struct BucketState {
    limit: Option<u32>,
    remaining: Option<u32>,
    reserved: u32,
    reset_after: Option<Duration>,
    pending_reset: bool,
    /// Waiting for slack once limits are known
    waiters: VecDeque<oneshot::Sender<()>>,
    probe: FloodGate,
}

/// Holds back requests while the bucket has no server data
///
/// A waiter receives `false` when admitted as the next probe and `true` when
/// flooded, in which case it retries normal admission.
struct FloodGate {
    pending: VecDeque<oneshot::Sender<bool>>,
    let_next_through: bool,
}

enum Wait {
    Slot(oneshot::Receiver<()>),
    Probe(oneshot::Receiver<bool>),
}

impl BucketState {
    fn slack(&self) -> u32 {
        self.remaining
            .map_or(0, |remaining| remaining.saturating_sub(self.reserved))
    }

    /// Grant waiting requests while there is slack
    fn drain(&mut self) -> usize {
        let mut granted = 0;
        while self.slack() > 0 {
            let Some(tx) = self.waiters.pop_front() else {
                break;
            };
            if tx.send(()).is_ok() {
                self.reserved += 1;
                granted += 1;
            }
        }
        granted
    }

    /// Admit the next queued request as a probe
    fn top(&mut self) {
        while let Some(tx) = self.probe.pending.pop_front() {
            if tx.send(false).is_ok() {
                self.reserved += 1;
                return;
            }
        }
        self.probe.let_next_through = true;
    }

    /// Release every request held at the flood gate
    fn flood(&mut self) {
        for tx in self.probe.pending.drain(..) {
            tx.send(true).ok();
        }
    }

    fn schedule_reset(&mut self, state: &Arc<Mutex<Self>>, key: &Arc<BucketKey>, after: Duration) {
        if self.pending_reset {
            return;
        }
        self.pending_reset = true;

        let state = Arc::clone(state);
        let key = Arc::clone(key);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            Bucket::reset(&state, &key);
        });
    }
}

impl Bucket {
    pub fn new(key: BucketKey) -> Self {
        Self {
            key: Arc::new(key),
            state: Arc::new(Mutex::new(BucketState {
                limit: None,
                remaining: None,
                reserved: 0,
                reset_after: None,
                pending_reset: false,
                waiters: VecDeque::new(),
                probe: FloodGate {
                    pending: VecDeque::new(),
                    let_next_through: true,
                },
            })),
        }
    }

    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    /// Server-reported window size, unknown until the first response
    pub fn limit(&self) -> Option<u32> {
        self.state.lock().limit
    }

    pub fn remaining(&self) -> Option<u32> {
        self.state.lock().remaining
    }

    /// Requests admitted and not yet finished
    pub fn reserved(&self) -> u32 {
        self.state.lock().reserved
    }

    /// Requests waiting for admission
    pub fn queued(&self) -> usize {
        let state = self.state.lock();
        state.waiters.len() + state.probe.pending.len()
    }

    /// Wait for admission
    ///
    /// The returned guard holds the reservation until dropped. Feed the
    /// response's rate-limit headers to [`BucketGuard::update`] before dropping it.
    pub async fn enter(&self) -> BucketGuard {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let remaining = state.remaining;
                match remaining {
                    Some(remaining) if remaining > state.reserved => {
                        state.reserved += 1;
                        tracing::trace!(
                            bucket = %self.key,
                            remaining,
                            reserved = state.reserved,
                            "Bucket pass"
                        );
                        return self.guard();
                    }
                    Some(remaining) => {
                        tracing::debug!(
                            bucket = %self.key,
                            remaining,
                            reserved = state.reserved,
                            "Bucket exhausted, queueing request"
                        );
                        let (tx, rx) = oneshot::channel();
                        state.waiters.push_back(tx);
                        Wait::Slot(rx)
                    }
                    None if state.probe.let_next_through => {
                        state.probe.let_next_through = false;
                        state.reserved += 1;
                        tracing::debug!(bucket = %self.key, "Letting rate limit probe through");
                        return self.guard();
                    }
                    None => {
                        let (tx, rx) = oneshot::channel();
                        state.probe.pending.push_back(tx);
                        Wait::Probe(rx)
                    }
                }
            };

            match wait {
                Wait::Slot(rx) => {
                    if SlotWaiter::new(rx, self).wait().await {
                        return self.guard();
                    }
                }
                Wait::Probe(rx) => {
                    if ProbeWaiter::new(rx, self).wait().await == Some(false) {
                        tracing::debug!(bucket = %self.key, "Letting rate limit probe through");
                        return self.guard();
                    }
                    // Flooded: real numbers are known now, go through normal admission
                }
            }
        }
    }

    fn guard(&self) -> BucketGuard {
        BucketGuard {
            bucket: self.clone(),
            updated: false,
        }
    }

    /// Record server-reported numbers
    fn update(&self, info: RateLimitInfo) {
        let mut state = self.state.lock();
        state.limit = Some(info.limit);
        state.remaining = Some(info.remaining);
        state.reset_after = Some(info.reset_after);
        state.schedule_reset(&self.state, &self.key, info.reset_after);

        state.flood();
        let granted = state.drain();

        tracing::trace!(
            bucket = %self.key,
            limit = info.limit,
            remaining = info.remaining,
            reset_after_ms = info.reset_after.as_millis() as u64,
            granted,
            "Bucket updated"
        );
    }

    fn reset(state: &Arc<Mutex<BucketState>>, key: &Arc<BucketKey>) {
        let mut guard = state.lock();
        guard.pending_reset = false;

        let Some(limit) = guard.limit else {
            unreachable!("bucket {key} reset before its limit was known");
        };
        guard.remaining = Some(limit);

        let granted = guard.drain();
        tracing::debug!(bucket = %key, limit, granted, queued = guard.waiters.len(), "Bucket reset");

        // Nothing in flight may report back, so keep the windows coming
        let reset_after = guard.reset_after;
        if let (false, Some(after)) = (guard.waiters.is_empty(), reset_after) {
            guard.schedule_reset(state, key, after);
        }
    }

    /// Finish an admitted request
    fn exit(&self, updated: bool) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(1);

        if !updated {
            if let Some(remaining) = state.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
        }

        if state.remaining.is_none() {
            // The probe produced no numbers; try the next one
            state.top();
        } else {
            state.flood();
            state.drain();
        }
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Bucket")
            .field("key", &self.key)
            .field("limit", &state.limit)
            .field("remaining", &state.remaining)
            .field("reserved", &state.reserved)
            .field("queued", &state.waiters.len())
            .finish()
    }
}

/// Reservation for one admitted request, released on drop
#[must_use = "dropping the guard immediately releases the reservation"]
pub struct BucketGuard {
    bucket: Bucket,
    updated: bool,
}

impl BucketGuard {
    /// Feed the server's numbers for this request into the bucket
    pub fn update(&mut self, info: RateLimitInfo) {
        self.bucket.update(info);
        self.updated = true;
    }
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        self.bucket.exit(self.updated);
    }
}

/// Queued for a slot; returns a slot granted after cancellation
struct SlotWaiter<'a> {
    rx: Option<oneshot::Receiver<()>>,
    bucket: &'a Bucket,
}

impl<'a> SlotWaiter<'a> {
    fn new(rx: oneshot::Receiver<()>, bucket: &'a Bucket) -> Self {
        Self {
            rx: Some(rx),
            bucket,
        }
    }

    async fn wait(mut self) -> bool {
        let granted = match self.rx.as_mut() {
            Some(rx) => rx.await.is_ok(),
            None => false,
        };
        self.rx = None;
        granted
    }
}

impl Drop for SlotWaiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            if rx.try_recv().is_ok() {
                let mut state = self.bucket.state.lock();
                state.reserved = state.reserved.saturating_sub(1);
                state.drain();
            }
        }
    }
}

/// Queued at the flood gate; passes on a probe grant received after cancellation
struct ProbeWaiter<'a> {
    rx: Option<oneshot::Receiver<bool>>,
    bucket: &'a Bucket,
}

impl<'a> ProbeWaiter<'a> {
    fn new(rx: oneshot::Receiver<bool>, bucket: &'a Bucket) -> Self {
        Self {
            rx: Some(rx),
            bucket,
        }
    }

    async fn wait(mut self) -> Option<bool> {
        let outcome = match self.rx.as_mut() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        self.rx = None;
        outcome
    }
}

impl Drop for ProbeWaiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            if matches!(rx.try_recv(), Ok(false)) {
                let mut state = self.bucket.state.lock();
                state.reserved = state.reserved.saturating_sub(1);
                if state.remaining.is_none() {
                    state.top();
                } else {
                    state.drain();
                }
            }
        }
    }
}
