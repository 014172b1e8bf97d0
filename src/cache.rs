//! Interval-polling cache, one entry per (path, credential) key.
//!
//! Each entry owns a `watch` channel of its state so consumers read the
//! last-known value without blocking, an in-flight flag so concurrent
//! revalidations collapse into a single request, and a cancellation token
//! that tears the poll loop down when the last subscriber detaches.
//!
//! All writes to an entry go through [`CacheEntry::apply`] or
//! [`PollCache::mutate`]; within an entry the last write wins. A fetch that
//! resolves after its entry was detached is discarded.

use crate::client::FetchError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identity of one cache entry: which resource, fetched as whom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Resource path, e.g. `/api/analytics`.
    pub path: String,
    /// Bearer credential the entry's fetches are issued with, if any.
    pub credential: Option<String>,
}

impl CacheKey {
    pub fn new(path: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            path: path.into(),
            credential,
        }
    }
}

/// Source a cache entry pulls from. Implemented by the HTTP client; tests
/// substitute scripted fetchers.
#[async_trait]
pub trait Fetcher<V>: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<V, FetchError>;
}

/// Consumer-visible state of one entry.
///
/// `value` and `error` can both be set at once: a failed refresh keeps the
/// previous value readable (stale-but-available) while flagging the error.
#[derive(Debug)]
pub struct EntryState<V> {
    pub value: Option<Arc<V>>,
    pub error: Option<Arc<FetchError>>,
    /// True while a fetch is outstanding for this entry.
    pub loading: bool,
}

impl<V> EntryState<V> {
    /// The state of an entry that has never fetched (e.g. gated off).
    pub fn idle() -> Self {
        Self {
            value: None,
            error: None,
            loading: false,
        }
    }
}

impl<V> Clone for EntryState<V> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            error: self.error.clone(),
            loading: self.loading,
        }
    }
}

/// Polling behavior for a subscription.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Revalidation period.
    pub interval: Duration,
    /// When false (gating condition unmet) the entry performs no network
    /// activity at all and stays idle.
    pub enabled: bool,
}

struct CacheEntry<V> {
    key: CacheKey,
    tx: watch::Sender<EntryState<V>>,
    fetcher: Arc<dyn Fetcher<V>>,
    /// Singleflight guard: at most one outstanding fetch per entry.
    inflight: AtomicBool,
    /// Set once when the poll loop starts; later enabled subscribers reuse it.
    polling: AtomicBool,
    subscribers: AtomicUsize,
    cancel: CancellationToken,
}

impl<V: Send + Sync + 'static> CacheEntry<V> {
    fn new(key: CacheKey, fetcher: Arc<dyn Fetcher<V>>) -> Self {
        let (tx, _rx) = watch::channel(EntryState::idle());
        Self {
            key,
            tx,
            fetcher,
            inflight: AtomicBool::new(false),
            polling: AtomicBool::new(false),
            subscribers: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Run one fetch unless another is already in flight.
    async fn run_fetch(self: Arc<Self>) {
        if self
            .inflight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(path = %self.key.path, "fetch already in flight, deduplicating");
            return;
        }
        self.tx.send_modify(|state| state.loading = true);

        let result = self.fetcher.fetch(&self.key).await;

        if self.cancel.is_cancelled() {
            // Last subscriber detached while the request was outstanding.
            debug!(path = %self.key.path, "discarding fetch result for detached entry");
            self.inflight.store(false, Ordering::Release);
            return;
        }

        self.apply(result);
        self.inflight.store(false, Ordering::Release);
    }

    /// The single write path for fetch completions.
    fn apply(&self, result: Result<V, FetchError>) {
        match result {
            Ok(value) => self.tx.send_modify(|state| {
                state.value = Some(Arc::new(value));
                state.error = None;
                state.loading = false;
            }),
            Err(e) => {
                warn!(resource = e.resource(), error = %e, "fetch failed, keeping stale value");
                self.tx.send_modify(|state| {
                    state.error = Some(Arc::new(e));
                    state.loading = false;
                });
            }
        }
    }

    /// Start the poll loop if it isn't running yet. Fetches immediately,
    /// then on every tick, until the entry is cancelled.
    fn ensure_polling(self: &Arc<Self>, interval: Duration) {
        if self.polling.swap(true, Ordering::AcqRel) {
            return;
        }
        let entry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = entry.cancel.cancelled() => {
                        debug!(path = %entry.key.path, "poll loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        Arc::clone(&entry).run_fetch().await;
                    }
                }
            }
        });
    }
}

/// Keyed polling cache. Clone-cheap; all clones share the same entries.
pub struct PollCache<V> {
    entries: Arc<DashMap<CacheKey, Arc<CacheEntry<V>>>>,
}

impl<V> Clone for PollCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for PollCache<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<V: Send + Sync + 'static> PollCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in a key, lazily creating its entry.
    ///
    /// The first subscriber's fetcher is the one the entry keeps. With
    /// `enabled` false no network activity occurs; a later enabled
    /// subscriber for the same key starts the poll loop.
    pub fn subscribe(
        &self,
        key: CacheKey,
        fetcher: Arc<dyn Fetcher<V>>,
        options: SubscribeOptions,
    ) -> CacheSubscription<V> {
        let entry = {
            let slot = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CacheEntry::new(key, fetcher)));
            Arc::clone(slot.value())
        };
        entry.subscribers.fetch_add(1, Ordering::AcqRel);

        if options.enabled {
            entry.ensure_polling(options.interval);
        }

        CacheSubscription {
            entries: Arc::clone(&self.entries),
            rx: entry.tx.subscribe(),
            entry,
        }
    }

    /// Force an out-of-band fetch. Concurrent calls for the same key share
    /// one request. Returns false when no entry exists for the key.
    pub fn revalidate(&self, key: &CacheKey) -> bool {
        let Some(entry) = self.entries.get(key).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        tokio::spawn(entry.run_fetch());
        true
    }

    /// Overwrite the cached value directly, clearing any error.
    ///
    /// With `should_revalidate` false the automatic follow-up fetch is
    /// suppressed — the hook the push path uses to apply server-sent
    /// replacements without a redundant pull. Returns false when no entry
    /// exists for the key.
    pub fn mutate(&self, key: &CacheKey, value: V, should_revalidate: bool) -> bool {
        let Some(entry) = self.entries.get(key).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        entry.tx.send_modify(|state| {
            state.value = Some(Arc::new(value));
            state.error = None;
        });
        if should_revalidate {
            tokio::spawn(entry.run_fetch());
        }
        true
    }

    /// Current state for a key, if an entry exists.
    pub fn peek(&self, key: &CacheKey) -> Option<EntryState<V>> {
        self.entries.get(key).map(|e| e.tx.borrow().clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A live interest in one cache entry.
///
/// Dropping the last subscription for a key cancels its poll loop and
/// removes the entry.
pub struct CacheSubscription<V> {
    entries: Arc<DashMap<CacheKey, Arc<CacheEntry<V>>>>,
    entry: Arc<CacheEntry<V>>,
    rx: watch::Receiver<EntryState<V>>,
}

impl<V> CacheSubscription<V> {
    pub fn key(&self) -> &CacheKey {
        &self.entry.key
    }

    /// Snapshot of the entry's current state.
    pub fn state(&self) -> EntryState<V> {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) {
        // Only errors when the entry is gone, at which point the state is final.
        let _ = self.rx.changed().await;
    }

    /// A receiver observing this entry's state transitions.
    pub fn watch(&self) -> watch::Receiver<EntryState<V>> {
        self.rx.clone()
    }
}

impl<V> Drop for CacheSubscription<V> {
    fn drop(&mut self) {
        if self.entry.subscribers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.entry.cancel.cancel();
            self.entries
                .remove_if(&self.entry.key, |_, e| {
                    e.subscribers.load(Ordering::Acquire) == 0
                });
        }
    }
}
