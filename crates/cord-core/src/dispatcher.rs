//! Event dispatcher
//!
//! A named-topic publish/subscribe bus. Producers call [`Dispatcher::dispatch`],
//! which never suspends: every matching subscriber is run as its own tokio task.
//!
//! Three kinds of subscription exist:
//! - topic listeners, invoked for every payload published under their topic
//! - catch-all listeners, invoked for every payload together with its topic
//! - one-shot predicates, evaluated against every payload regardless of topic;
//!   the paired callback runs once, on the first payload the predicate accepts

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Listener<P> = Arc<dyn Fn(P) -> BoxFuture<'static, ()> + Send + Sync>;
type CatchAllListener<K, P> = Arc<dyn Fn(K, P) -> BoxFuture<'static, ()> + Send + Sync>;
type Predicate<K, P> = Arc<dyn Fn(K, P) -> BoxFuture<'static, bool> + Send + Sync>;

/// Handle identifying a registered subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registry<K, P> {
    listeners: HashMap<K, Vec<(ListenerId, Listener<P>)>>,
    catch_all: Vec<(ListenerId, CatchAllListener<K, P>)>,
    predicates: Vec<(ListenerId, Predicate<K, P>, Listener<P>)>,
}

impl<K, P> Registry<K, P> {
    /// Remove a pending predicate, returning whether it was still registered.
    ///
    /// The first caller to claim a predicate wins; later claims see `false`.
    fn claim_predicate(&mut self, id: ListenerId) -> bool {
        let before = self.predicates.len();
        self.predicates.retain(|(pid, _, _)| *pid != id);
        self.predicates.len() != before
    }
}

/// Publish/subscribe bus keyed by topic `K` carrying payloads `P`
///
/// Cloning a dispatcher yields another handle to the same registry.
pub struct Dispatcher<K, P> {
    registry: Arc<Mutex<Registry<K, P>>>,
    next_id: Arc<AtomicU64>,
}

impl<K, P> Clone for Dispatcher<K, P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K, P> Default for Dispatcher<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    P: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> Dispatcher<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    P: Clone + Send + 'static,
{
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                listeners: HashMap::new(),
                catch_all: Vec::new(),
                predicates: Vec::new(),
            })),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe to every payload published under `topic`
    pub fn add_listener<F, Fut>(&self, topic: K, listener: F) -> ListenerId
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id();
        let listener: Listener<P> =
            Arc::new(move |payload: P| -> BoxFuture<'static, ()> { Box::pin(listener(payload)) });
        self.registry
            .lock()
            .listeners
            .entry(topic)
            .or_default()
            .push((id, listener));
        id
    }

    /// Subscribe to every payload on every topic
    pub fn add_catch_all<F, Fut>(&self, listener: F) -> ListenerId
    where
        F: Fn(K, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id();
        let listener: CatchAllListener<K, P> =
            Arc::new(move |topic: K, payload: P| -> BoxFuture<'static, ()> {
                Box::pin(listener(topic, payload))
            });
        self.registry.lock().catch_all.push((id, listener));
        id
    }

    /// Register a one-shot predicate subscription
    ///
    /// `predicate` is awaited for every dispatched payload. The first payload it
    /// accepts is handed to `callback` and the subscription is removed.
    pub fn add_predicate<Pr, PFut, F, Fut>(&self, predicate: Pr, callback: F) -> ListenerId
    where
        Pr: Fn(K, P) -> PFut + Send + Sync + 'static,
        PFut: Future<Output = bool> + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id();
        let predicate: Predicate<K, P> =
            Arc::new(move |topic: K, payload: P| -> BoxFuture<'static, bool> {
                Box::pin(predicate(topic, payload))
            });
        let callback: Listener<P> =
            Arc::new(move |payload: P| -> BoxFuture<'static, ()> { Box::pin(callback(payload)) });
        self.registry.lock().predicates.push((id, predicate, callback));
        id
    }

    /// Remove any subscription by id. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.lock();

        for listeners in registry.listeners.values_mut() {
            if let Some(index) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(index);
                return true;
            }
        }

        if let Some(index) = registry.catch_all.iter().position(|(lid, _)| *lid == id) {
            registry.catch_all.remove(index);
            return true;
        }

        registry.claim_predicate(id)
    }

    /// Number of topic listeners registered under `topic`
    pub fn listener_count(&self, topic: &K) -> usize {
        self.registry.lock().listeners.get(topic).map_or(0, Vec::len)
    }

    /// Number of one-shot predicates still waiting for a match
    pub fn pending_predicates(&self) -> usize {
        self.registry.lock().predicates.len()
    }

    /// Publish `payload` under `topic`
    ///
    /// Returns immediately; subscribers run as spawned tasks. Must be called from
    /// within a tokio runtime.
    pub fn dispatch(&self, topic: K, payload: P) {
        let (listeners, catch_all, predicates) = {
            let registry = self.registry.lock();
            let listeners: Vec<Listener<P>> = registry
                .listeners
                .get(&topic)
                .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
                .unwrap_or_default();
            let catch_all: Vec<CatchAllListener<K, P>> =
                registry.catch_all.iter().map(|(_, f)| Arc::clone(f)).collect();
            let predicates: Vec<(ListenerId, Predicate<K, P>, Listener<P>)> = registry
                .predicates
                .iter()
                .map(|(id, p, f)| (*id, Arc::clone(p), Arc::clone(f)))
                .collect();
            (listeners, catch_all, predicates)
        };

        tracing::trace!(
            topic = ?topic,
            listeners = listeners.len(),
            catch_all = catch_all.len(),
            predicates = predicates.len(),
            "Dispatching event"
        );

        for listener in listeners {
            tokio::spawn(listener(payload.clone()));
        }

        for listener in catch_all {
            tokio::spawn(listener(topic.clone(), payload.clone()));
        }

        for (id, predicate, callback) in predicates {
            let registry = Arc::clone(&self.registry);
            let topic = topic.clone();
            let payload = payload.clone();

            tokio::spawn(async move {
                if !predicate(topic, payload.clone()).await {
                    return;
                }

                // Another dispatch may have matched first
                let claimed = registry.lock().claim_predicate(id);
                if claimed {
                    tracing::debug!("Predicate matched, invoking callback");
                    callback(payload).await;
                }
            });
        }
    }
}

impl<K, P> fmt::Debug for Dispatcher<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Dispatcher")
            .field("topics", &registry.listeners.len())
            .field("catch_all", &registry.catch_all.len())
            .field("predicates", &registry.predicates.len())
            .finish()
    }
}
