//! Batch loader engine
//!
//! Concurrent point lookups issued within one short window are coalesced
//! into a single call to a [`BatchFn`]. The first `load` on an idle loader
//! opens the window and arms a timer; later loads join it. The window
//! dispatches when the timer fires or when `max_batch` distinct keys are
//! queued, whichever comes first. The timer and the fetch both race the
//! request's cancellation token.
//!
//! Each key is fetched at most once per loader: successful values are
//! cached for the loader's lifetime, and a key already queued or in flight
//! is joined rather than fetched again. Failures are not cached, and a
//! panicking batch function fails its batch like any other error.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{join_all, try_join_all};
use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::error::{LoadError, LoadResult};
use crate::registry::BatchContext;

/// Bulk fetch for one entity or relation
///
/// `load` receives distinct keys and must return exactly one result per
/// key, in key order. Returning `Err` fails every caller in the batch.
#[async_trait]
pub trait BatchFn: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    async fn load(
        &self,
        ctx: &BatchContext,
        keys: &[Self::Key],
    ) -> LoadResult<Vec<LoadResult<Self::Value>>>;
}

type Waiter<V> = oneshot::Sender<LoadResult<V>>;

struct Window<K> {
    id: u64,
    keys: Vec<K>,
}

struct State<K, V> {
    cache: HashMap<K, V>,
    /// Callers per key that is queued or in flight
    waiting: HashMap<K, Vec<Waiter<V>>>,
    open: Option<Window<K>>,
    next_window: u64,
}

struct Inner<F: BatchFn> {
    batch_fn: F,
    ctx: BatchContext,
    state: Mutex<State<F::Key, F::Value>>,
    dispatches: AtomicUsize,
}

/// Coalescing, caching loader over one [`BatchFn`]
pub struct Loader<F: BatchFn> {
    inner: Arc<Inner<F>>,
}

enum Enqueued<K> {
    Joined,
    Opened(u64),
    Full(Window<K>),
}

impl<F: BatchFn> Loader<F> {
    pub fn new(batch_fn: F, ctx: BatchContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                batch_fn,
                ctx,
                state: Mutex::new(State {
                    cache: HashMap::new(),
                    waiting: HashMap::new(),
                    open: None,
                    next_window: 0,
                }),
                dispatches: AtomicUsize::new(0),
            }),
        }
    }

    /// Load one value, joining the current batch window
    pub async fn load(&self, key: F::Key) -> LoadResult<F::Value> {
        let receiver = {
            let mut state = self.inner.lock_state();
            if let Some(value) = state.cache.get(&key) {
                return Ok(value.clone());
            }
            if self.inner.ctx.cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }

            let (sender, receiver) = oneshot::channel();
            match self.inner.enqueue(&mut state, key, sender) {
                Enqueued::Joined => {}
                Enqueued::Opened(window) => Inner::arm_timer(&self.inner, window),
                Enqueued::Full(window) => Inner::spawn_dispatch(&self.inner, window),
            }
            receiver
        };

        receiver.await.unwrap_or(Err(LoadError::Dropped))
    }

    /// Load several values; results follow the order of `keys`
    pub async fn load_many(&self, keys: Vec<F::Key>) -> Vec<LoadResult<F::Value>> {
        join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Load several values, failing on the first error
    pub async fn try_load_many(&self, keys: Vec<F::Key>) -> LoadResult<Vec<F::Value>> {
        try_join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Seed the cache; an existing entry is kept. Returns whether it was inserted
    pub fn prime(&self, key: F::Key, value: F::Value) -> bool {
        let mut state = self.inner.lock_state();
        if state.cache.contains_key(&key) {
            return false;
        }
        state.cache.insert(key, value);
        true
    }

    pub fn cached_len(&self) -> usize {
        self.inner.lock_state().cache.len()
    }

    /// Number of batch function calls made so far
    pub fn dispatch_count(&self) -> usize {
        self.inner.dispatches.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &BatchContext {
        &self.inner.ctx
    }
}

impl<F: BatchFn> fmt::Debug for Loader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("batch_fn", &type_name::<F>())
            .field("cached", &self.cached_len())
            .field("dispatches", &self.dispatch_count())
            .finish()
    }
}

impl<F: BatchFn> Inner<F> {
    fn lock_state(&self) -> MutexGuard<'_, State<F::Key, F::Value>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(
        &self,
        state: &mut State<F::Key, F::Value>,
        key: F::Key,
        sender: Waiter<F::Value>,
    ) -> Enqueued<F::Key> {
        if let Some(waiters) = state.waiting.get_mut(&key) {
            waiters.push(sender);
            return Enqueued::Joined;
        }
        state.waiting.insert(key.clone(), vec![sender]);

        let mut opened = None;
        if state.open.is_none() {
            let id = state.next_window;
            state.next_window += 1;
            state.open = Some(Window {
                id,
                keys: Vec::new(),
            });
            opened = Some(id);
        }

        let queued = match state.open.as_mut() {
            Some(window) => {
                window.keys.push(key);
                window.keys.len()
            }
            None => 0,
        };

        if self.ctx.config.is_full(queued) {
            if let Some(window) = state.open.take() {
                return Enqueued::Full(window);
            }
        }
        match opened {
            Some(id) => Enqueued::Opened(id),
            None => Enqueued::Joined,
        }
    }

    /// Take the open window if it is still `id`
    fn close_window(&self, id: u64) -> Option<Window<F::Key>> {
        let mut state = self.lock_state();
        match &state.open {
            Some(window) if window.id == id => state.open.take(),
            _ => None,
        }
    }

    fn arm_timer(this: &Arc<Self>, id: u64) {
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            let cancel = inner.ctx.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => inner.cancel_all(),
                _ = tokio::time::sleep(inner.ctx.config.wait) => {
                    if let Some(window) = inner.close_window(id) {
                        inner.dispatch(window).await;
                    }
                }
            }
        });
    }

    fn spawn_dispatch(this: &Arc<Self>, window: Window<F::Key>) {
        let inner = Arc::clone(this);
        tokio::spawn(async move { inner.dispatch(window).await });
    }

    async fn dispatch(&self, window: Window<F::Key>) {
        let keys = window.keys;
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            target: "tally::loader",
            loader = type_name::<F>(),
            window = window.id,
            keys = keys.len(),
            "Dispatching batch"
        );

        let fetch = AssertUnwindSafe(self.batch_fn.load(&self.ctx, &keys)).catch_unwind();
        let result = tokio::select! {
            _ = self.ctx.cancel.cancelled() => {
                self.cancel_all();
                return;
            }
            result = fetch => result.unwrap_or_else(|panic| {
                Err(LoadError::Batch(format!("batch function panicked: {}", panic_message(&*panic))))
            }),
        };
        let result = result.and_then(|values| {
            if values.len() == keys.len() {
                Ok(values)
            } else {
                Err(LoadError::ResultCountMismatch {
                    expected: keys.len(),
                    actual: values.len(),
                })
            }
        });

        if let Err(err) = &result {
            tracing::warn!(
                target: "tally::loader",
                loader = type_name::<F>(),
                window = window.id,
                keys = keys.len(),
                error = %err,
                "Batch failed"
            );
        }
        self.resolve(keys, result);
    }

    /// Reject every queued and in-flight key with `Cancelled`
    fn cancel_all(&self) {
        let waiting: Vec<_> = {
            let mut state = self.lock_state();
            state.open = None;
            state.waiting.drain().map(|(_, waiters)| waiters).collect()
        };
        for waiter in waiting.into_iter().flatten() {
            let _ = waiter.send(Err(LoadError::Cancelled));
        }
    }

    /// Answer every caller waiting on `keys`, caching successful values
    fn resolve(&self, keys: Vec<F::Key>, result: LoadResult<Vec<LoadResult<F::Value>>>) {
        let mut answered = Vec::with_capacity(keys.len());
        {
            let mut state = self.lock_state();
            match result {
                Ok(values) => {
                    for (key, value) in keys.into_iter().zip(values) {
                        if let Ok(found) = &value {
                            state.cache.entry(key.clone()).or_insert_with(|| found.clone());
                        }
                        if let Some(waiters) = state.waiting.remove(&key) {
                            answered.push((waiters, value));
                        }
                    }
                }
                Err(err) => {
                    for key in keys {
                        if let Some(waiters) = state.waiting.remove(&key) {
                            answered.push((waiters, Err(err.clone())));
                        }
                    }
                }
            }
        }

        for (waiters, value) in answered {
            for waiter in waiters {
                // The caller may have given up; nothing to do then
                let _ = waiter.send(value.clone());
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string payload"
    }
}
