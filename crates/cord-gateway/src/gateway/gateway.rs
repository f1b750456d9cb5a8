//! Shard set supervisor
//!
//! The gateway discovers connection parameters over HTTP, creates one shard
//! per id and launches them without waiting. Identify attempts are metered by
//! fixed-window limiters keyed by `shard_id % max_concurrency`, shared by every
//! shard mapping to the same key. Fatal shard errors are funneled into a single
//! channel that [`Gateway::run`] surfaces to the caller.

use super::config::{GatewayConfig, DEFAULT_GATEWAY_URL};
use crate::error::{GatewayError, GatewayResult};
use crate::events::ShardEvent;
use crate::shard::{Shard, ShardState, ShardSupervisor};
use cord_core::{Dispatcher, TimesPer};
use cord_http::HttpClient;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Default)]
struct ShardSets {
    /// Set once `connect` has started; later calls are ignored
    launched: bool,
    active: Vec<Shard>,
    /// Replacement set being brought up by a rescale
    pending: Vec<Shard>,
    recreating: bool,
    /// Generation of the newest set
    generation: u64,
}

struct GatewayInner {
    me: Weak<GatewayInner>,
    http: Arc<HttpClient>,
    config: GatewayConfig,
    shard_count: Mutex<Option<u32>>,
    max_concurrency: Mutex<Option<u32>>,
    url: Mutex<Option<String>>,
    identify_limiters: DashMap<u32, TimesPer>,
    sets: Mutex<ShardSets>,
    events: Dispatcher<String, ShardEvent>,
    fatal_tx: mpsc::UnboundedSender<GatewayError>,
    fatal_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<GatewayError>>,
    closed: watch::Sender<bool>,
}

impl GatewayInner {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn build_shards(&self, shard_count: u32, url: &str, generation: u64) -> Vec<Shard> {
        let supervisor: Weak<dyn ShardSupervisor> = self.me.clone();
        (0..shard_count)
            .map(|shard_id| {
                Shard::new(
                    self.config.shard(shard_id, shard_count, url, generation),
                    supervisor.clone(),
                    self.events.clone(),
                )
            })
            .collect()
    }

    /// Query discovery and record the identify concurrency
    async fn discover(&self) -> GatewayResult<(u32, String)> {
        let bot = self.http.get_gateway_bot().await?;
        let concurrency = bot.session_start_limit.max_concurrency.max(1);
        *self.max_concurrency.lock() = Some(concurrency);

        let base = self
            .config
            .gateway_url
            .as_deref()
            .or(bot.url.as_deref())
            .unwrap_or(DEFAULT_GATEWAY_URL);
        let url = self.config.connection_url(base);
        *self.url.lock() = Some(url.clone());

        tracing::debug!(
            recommended_shards = bot.shards,
            max_concurrency = concurrency,
            remaining_sessions = bot.session_start_limit.remaining,
            "Discovered gateway parameters"
        );
        Ok((bot.shards.max(1), url))
    }

    fn abandon_rescale(&self) {
        let pending = {
            let mut sets = self.sets.lock();
            sets.recreating = false;
            std::mem::take(&mut sets.pending)
        };
        for shard in &pending {
            shard.close();
        }
    }
}

impl ShardSupervisor for GatewayInner {
    fn identify_limiter(&self, shard_id: u32) -> GatewayResult<TimesPer> {
        let concurrency = (*self.max_concurrency.lock()).ok_or(GatewayError::ConcurrencyUnknown)?;
        let key = shard_id % concurrency;

        if let Some(limiter) = self.identify_limiters.get(&key) {
            return Ok(limiter.clone());
        }
        Ok(self
            .identify_limiters
            .entry(key)
            .or_insert_with(|| TimesPer::new(1, self.config.identify_window))
            .clone())
    }

    fn should_reconnect(&self, shard: &Shard) -> bool {
        if self.is_closed() {
            return false;
        }
        let sets = self.sets.lock();
        !sets.recreating || shard.generation() == sets.generation
    }

    fn report_fatal(&self, error: GatewayError) {
        tracing::error!(error = %error, "Fatal gateway error");
        self.fatal_tx.send(error).ok();
    }
}

/// Owner of every shard of one client
///
/// Cloning yields another handle to the same gateway.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new(http: Arc<HttpClient>, config: GatewayConfig) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let inner = Arc::new_cyclic(|me| GatewayInner {
            me: me.clone(),
            http,
            config,
            shard_count: Mutex::new(None),
            max_concurrency: Mutex::new(None),
            url: Mutex::new(None),
            identify_limiters: DashMap::new(),
            sets: Mutex::new(ShardSets::default()),
            events: Dispatcher::new(),
            fatal_tx,
            fatal_rx: tokio::sync::Mutex::new(fatal_rx),
            closed,
        });

        Self { inner }
    }

    /// Discover parameters, create the shard set and launch every shard
    ///
    /// Does not wait for shards to finish connecting. Only the first call
    /// launches shards; use [`Gateway::rescale`] to replace them.
    pub async fn connect(&self) -> GatewayResult<()> {
        let inner = &self.inner;
        if inner.is_closed() {
            tracing::warn!("Gateway closed before connecting");
            return Ok(());
        }
        {
            let mut sets = inner.sets.lock();
            if sets.launched {
                tracing::warn!("Gateway already connected, ignoring");
                return Ok(());
            }
            sets.launched = true;
        }

        let (recommended, url) = match inner.discover().await {
            Ok(discovered) => discovered,
            Err(e) => {
                inner.sets.lock().launched = false;
                return Err(e);
            }
        };
        let shard_count = match inner.config.shard_count {
            Some(pinned) => {
                if pinned < recommended {
                    tracing::warn!(pinned, recommended, "Pinned shard count is below the recommendation");
                }
                pinned.max(1)
            }
            None => recommended,
        };
        *inner.shard_count.lock() = Some(shard_count);

        let shards = {
            let mut sets = inner.sets.lock();
            let shards = inner.build_shards(shard_count, &url, sets.generation);
            sets.active.clone_from(&shards);
            shards
        };

        let max_concurrency = *inner.max_concurrency.lock();
        tracing::info!(
            shard_count,
            max_concurrency = ?max_concurrency,
            url = %url,
            "Launching shards"
        );
        for shard in &shards {
            shard.spawn_connect(Duration::ZERO);
        }
        Ok(())
    }

    /// Block until [`Gateway::close`] or a fatal error
    pub async fn run(&self) -> GatewayResult<()> {
        let mut closed = self.inner.closed.subscribe();
        let mut fatal = self.inner.fatal_rx.lock().await;

        tokio::select! {
            error = fatal.recv() => match error {
                Some(error) => Err(error),
                None => Ok(()),
            },
            _ = closed.wait_for(|closed| *closed) => Ok(()),
        }
    }

    /// Replace the shard set with one sized to the current recommendation
    ///
    /// Ignored while a rescale is already running. With a pinned shard count
    /// this reports [`GatewayError::NotEnoughShards`] as fatal.
    pub async fn rescale(&self) -> GatewayResult<()> {
        let inner = &self.inner;
        let generation = {
            let mut sets = inner.sets.lock();
            if sets.recreating {
                tracing::debug!("Rescale already in progress");
                return Ok(());
            }
            if inner.config.shard_count.is_some() {
                drop(sets);
                inner.report_fatal(GatewayError::NotEnoughShards);
                return Err(GatewayError::NotEnoughShards);
            }
            sets.recreating = true;
            sets.generation += 1;
            sets.generation
        };

        let (shard_count, url) = match inner.discover().await {
            Ok(discovered) => discovered,
            Err(e) => {
                inner.abandon_rescale();
                return Err(e);
            }
        };
        tracing::info!(shard_count, generation, "Rescaling shard set");

        let pending = inner.build_shards(shard_count, &url, generation);
        inner.sets.lock().pending.clone_from(&pending);
        for shard in &pending {
            shard.spawn_connect(Duration::ZERO);
        }

        let all_ready = async {
            for shard in &pending {
                if !shard.wait_for_state(ShardState::Connected).await {
                    return false;
                }
            }
            true
        };
        let mut closed = inner.closed.subscribe();
        let ready = tokio::select! {
            ready = all_ready => ready,
            _ = closed.wait_for(|closed| *closed) => false,
        };

        if !ready {
            tracing::warn!(generation, "Rescale abandoned before the new shards were ready");
            inner.abandon_rescale();
            return Ok(());
        }

        let stale = {
            let mut sets = inner.sets.lock();
            let pending = std::mem::take(&mut sets.pending);
            sets.recreating = false;
            std::mem::replace(&mut sets.active, pending)
        };
        *inner.shard_count.lock() = Some(shard_count);
        for shard in &stale {
            shard.close();
        }

        tracing::info!(shard_count, generation, retired = stale.len(), "Rescale complete");
        Ok(())
    }

    /// Close every active and pending shard. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.send_replace(true) {
            return;
        }

        let shards: Vec<Shard> = {
            let sets = self.inner.sets.lock();
            sets.active.iter().chain(&sets.pending).cloned().collect()
        };
        for shard in &shards {
            shard.close();
        }
        tracing::info!(shards = shards.len(), "Gateway closed");
    }

    /// Gateway-wide bus of dispatch events, keyed by event name
    pub fn events(&self) -> &Dispatcher<String, ShardEvent> {
        &self.inner.events
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.inner.http
    }

    pub fn shards(&self) -> Vec<Shard> {
        self.inner.sets.lock().active.clone()
    }

    pub fn shard(&self, shard_id: u32) -> Option<Shard> {
        self.inner
            .sets
            .lock()
            .active
            .iter()
            .find(|shard| shard.id() == shard_id)
            .cloned()
    }

    pub fn shard_count(&self) -> Option<u32> {
        *self.inner.shard_count.lock()
    }

    /// Connection URL handed to shards, once discovered
    pub fn url(&self) -> Option<String> {
        self.inner.url.lock().clone()
    }

    pub fn max_concurrency(&self) -> Option<u32> {
        *self.inner.max_concurrency.lock()
    }

    pub fn is_recreating(&self) -> bool {
        self.inner.sets.lock().recreating
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("shard_count", &self.shard_count())
            .field("max_concurrency", &self.max_concurrency())
            .field("recreating", &self.is_recreating())
            .field("closed", &self.is_closed())
            .finish()
    }
}
