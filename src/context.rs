//! Process-wide sync state and the consumer-facing feed handles.
//!
//! `SyncContext` is constructed once at application start and passed by
//! reference — no ambient singletons. It owns the fetch client, both
//! polling caches, the push hub, and the session receiver.
//!
//! Feed handles implement the gating contract: the analytics feed fetches
//! with or without a credential, the alerts feed withholds every request
//! until the session is resolved with a non-empty token. Because the
//! credential is part of the cache key, a session change re-keys the feed
//! by dropping the old subscription and opening a new one.

use crate::cache::{
    CacheKey, CacheSubscription, EntryState, Fetcher, PollCache, SubscribeOptions,
};
use crate::client::ApiClient;
use crate::config::Config;
use crate::model::{AnalyticsSnapshot, FraudAlert};
use crate::push::{PushHub, PushTransport, RouteGuard, WsTransport};
use crate::session::SessionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const ANALYTICS_PATH: &str = "/api/analytics";
pub const ALERTS_PATH: &str = "/api/alerts";

/// Shared state for the synchronization layer.
pub struct SyncContext {
    analytics: PollCache<AnalyticsSnapshot>,
    alerts: PollCache<Vec<FraudAlert>>,
    analytics_fetcher: Arc<dyn Fetcher<AnalyticsSnapshot>>,
    alerts_fetcher: Arc<dyn Fetcher<Vec<FraudAlert>>>,
    push: Arc<PushHub>,
    session: watch::Receiver<SessionState>,
    refresh_interval: Duration,
}

impl SyncContext {
    /// Build the production context: HTTP client against the configured API
    /// base and a WebSocket transport for the push channel.
    pub fn new(
        config: &Config,
        session: watch::Receiver<SessionState>,
    ) -> anyhow::Result<Self> {
        let client = Arc::new(ApiClient::new(&config.api_base_url)?);
        let transport = Arc::new(WsTransport::new(&config.websocket_url));
        Ok(Self::with_sources(
            client.clone(),
            client,
            transport,
            session,
            config.refresh_interval(),
        ))
    }

    /// Build a context over explicit data sources. Tests use this to
    /// substitute scripted fetchers and transports.
    pub fn with_sources(
        analytics_fetcher: Arc<dyn Fetcher<AnalyticsSnapshot>>,
        alerts_fetcher: Arc<dyn Fetcher<Vec<FraudAlert>>>,
        transport: Arc<dyn PushTransport>,
        session: watch::Receiver<SessionState>,
        refresh_interval: Duration,
    ) -> Self {
        let analytics = PollCache::new();
        let alerts = PollCache::new();
        let push = PushHub::new(transport, analytics.clone(), alerts.clone());
        Self {
            analytics,
            alerts,
            analytics_fetcher,
            alerts_fetcher,
            push,
            session,
            refresh_interval,
        }
    }

    /// Watch the aggregate analytics snapshot.
    ///
    /// Always fetches — with the bearer credential when the session has
    /// one, anonymously otherwise (the endpoint degrades gracefully).
    pub fn watch_analytics(&self) -> FeedHandle<AnalyticsSnapshot> {
        self.spawn_feed(
            ANALYTICS_PATH,
            false,
            self.analytics.clone(),
            Arc::clone(&self.analytics_fetcher),
            |hub, key| hub.route_analytics(key),
        )
    }

    /// Watch the fraud-alert list.
    ///
    /// Gated: no network activity until the session is resolved with a
    /// non-empty credential. While gated the handle reports idle.
    pub fn watch_alerts(&self) -> FeedHandle<Vec<FraudAlert>> {
        self.spawn_feed(
            ALERTS_PATH,
            true,
            self.alerts.clone(),
            Arc::clone(&self.alerts_fetcher),
            |hub, key| hub.route_alerts(key),
        )
    }

    /// The process-wide push subscriber. Hosts that drive their own
    /// transport can inject frames through it directly.
    pub fn push_hub(&self) -> &Arc<PushHub> {
        &self.push
    }

    fn spawn_feed<V, R>(
        &self,
        path: &'static str,
        gated: bool,
        cache: PollCache<V>,
        fetcher: Arc<dyn Fetcher<V>>,
        route: R,
    ) -> FeedHandle<V>
    where
        V: Send + Sync + 'static,
        R: Fn(&Arc<PushHub>, CacheKey) -> RouteGuard + Send + 'static,
    {
        let (tx, rx) = watch::channel(EntryState::idle());
        let mut session = self.session.clone();
        let hub = Arc::clone(&self.push);
        let interval = self.refresh_interval;

        let task = tokio::spawn(async move {
            // The previous subscription and push route are held until the
            // replacements are registered, so a re-key never transiently
            // drops the hub's route count to zero.
            let mut held: Option<(CacheSubscription<V>, RouteGuard)> = None;

            loop {
                let current = session.borrow_and_update().clone();
                let credential = current.credential().map(str::to_owned);

                if gated && credential.is_none() {
                    // Gating condition unmet: no subscription, no fetch.
                    drop(held.take());
                    tx.send_replace(EntryState::idle());
                    if session.changed().await.is_err() {
                        return;
                    }
                    continue;
                }

                let key = CacheKey::new(path, credential);
                let sub = cache.subscribe(
                    key.clone(),
                    Arc::clone(&fetcher),
                    SubscribeOptions {
                        interval,
                        enabled: true,
                    },
                );
                let guard = route(&hub, key);
                let mut entry_rx = sub.watch();
                drop(std::mem::replace(&mut held, Some((sub, guard))));
                tx.send_replace(entry_rx.borrow_and_update().clone());

                // Mirror entry states until the session re-keys the feed.
                loop {
                    tokio::select! {
                        changed = session.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            break;
                        }
                        changed = entry_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            tx.send_replace(entry_rx.borrow_and_update().clone());
                        }
                    }
                }
            }
        });

        FeedHandle { rx, task }
    }
}

/// A live view over one feed. Dropping it releases the underlying cache
/// subscription and push route.
pub struct FeedHandle<V> {
    rx: watch::Receiver<EntryState<V>>,
    task: JoinHandle<()>,
}

impl<V> FeedHandle<V> {
    /// Snapshot of the feed's current state.
    pub fn state(&self) -> EntryState<V> {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) {
        let _ = self.rx.changed().await;
    }

    /// An independent receiver over this feed's states.
    pub fn watch(&self) -> watch::Receiver<EntryState<V>> {
        self.rx.clone()
    }
}

impl<V> Drop for FeedHandle<V> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchError;
    use crate::push::MessageStream;
    use crate::session::SessionFeed;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every fetch key; returns defaults.
    struct RecordingFetcher {
        calls: AtomicUsize,
        keys: Mutex<Vec<CacheKey>>,
    }

    impl RecordingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                keys: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_key(&self) -> Option<CacheKey> {
            self.keys.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl<V: Send + Sync + Default> Fetcher<V> for RecordingFetcher {
        async fn fetch(&self, key: &CacheKey) -> Result<V, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys.lock().unwrap().push(key.clone());
            Ok(V::default())
        }
    }

    /// Transport that never connects; the push channel is exercised via
    /// `handle_message` in the push module's own tests.
    struct NullTransport;

    #[async_trait]
    impl crate::push::PushTransport for NullTransport {
        async fn connect(&self) -> anyhow::Result<Box<dyn MessageStream>> {
            Err(anyhow::anyhow!("no push channel in this test"))
        }
    }

    fn context_with(
        analytics: Arc<RecordingFetcher>,
        alerts: Arc<RecordingFetcher>,
        session: watch::Receiver<SessionState>,
    ) -> SyncContext {
        SyncContext::with_sources(
            analytics,
            alerts,
            Arc::new(NullTransport),
            session,
            Duration::from_secs(30),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn alerts_feed_is_gated_until_session_resolves() {
        let (feed, session_rx) = SessionFeed::new();
        let analytics_fetcher = RecordingFetcher::new();
        let alerts_fetcher = RecordingFetcher::new();
        let ctx = context_with(analytics_fetcher, alerts_fetcher.clone(), session_rx);

        let alerts = ctx.watch_alerts();
        tokio::time::sleep(Duration::from_secs(90)).await;

        // Unresolved session: zero fetches, idle state.
        assert_eq!(alerts_fetcher.calls(), 0);
        let state = alerts.state();
        assert!(!state.loading);
        assert!(state.value.is_none());

        // Session resolves with a credential: exactly one fetch.
        feed.set(SessionState::resolved(Some("tok-9".into())));
        settle().await;
        assert_eq!(alerts_fetcher.calls(), 1);
        assert_eq!(
            alerts_fetcher.last_key().unwrap().credential.as_deref(),
            Some("tok-9")
        );
        assert!(alerts.state().value.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_session_without_token_keeps_alerts_gated() {
        let (feed, session_rx) = SessionFeed::new();
        let alerts_fetcher = RecordingFetcher::new();
        let ctx = context_with(RecordingFetcher::new(), alerts_fetcher.clone(), session_rx);

        let _alerts = ctx.watch_alerts();
        feed.set(SessionState::resolved(None));
        tokio::time::sleep(Duration::from_secs(90)).await;

        assert_eq!(alerts_fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn analytics_feed_fetches_without_credential() {
        let (feed, session_rx) = SessionFeed::new();
        let analytics_fetcher = RecordingFetcher::new();
        let ctx = context_with(analytics_fetcher.clone(), RecordingFetcher::new(), session_rx);
        feed.set(SessionState::absent());

        let analytics = ctx.watch_analytics();
        settle().await;

        assert_eq!(analytics_fetcher.calls(), 1);
        assert_eq!(analytics_fetcher.last_key().unwrap().credential, None);
        assert!(analytics.state().value.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn analytics_feed_rekeys_when_credential_appears() {
        let (feed, session_rx) = SessionFeed::new();
        let analytics_fetcher = RecordingFetcher::new();
        let ctx = context_with(analytics_fetcher.clone(), RecordingFetcher::new(), session_rx);

        let _analytics = ctx.watch_analytics();
        settle().await;
        assert_eq!(analytics_fetcher.calls(), 1);
        assert_eq!(analytics_fetcher.last_key().unwrap().credential, None);

        feed.set(SessionState::resolved(Some("tok-1".into())));
        settle().await;
        assert_eq!(analytics_fetcher.calls(), 2);
        assert_eq!(
            analytics_fetcher.last_key().unwrap().credential.as_deref(),
            Some("tok-1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let (feed, session_rx) = SessionFeed::new();
        let analytics_fetcher = RecordingFetcher::new();
        let ctx = context_with(analytics_fetcher.clone(), RecordingFetcher::new(), session_rx);
        feed.set(SessionState::absent());

        let analytics = ctx.watch_analytics();
        settle().await;
        assert_eq!(analytics_fetcher.calls(), 1);

        drop(analytics);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(analytics_fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn push_message_reaches_the_watched_feed() {
        let (feed, session_rx) = SessionFeed::new();
        let ctx = context_with(
            RecordingFetcher::new(),
            RecordingFetcher::new(),
            session_rx,
        );
        feed.set(SessionState::absent());

        let analytics = ctx.watch_analytics();
        settle().await;

        // Inject a push frame the way the transport loop would.
        ctx.push.handle_message(
            r#"{"event": "analyticsUpdate", "data": {"totalTransactions": "10"}}"#,
        );
        settle().await;

        assert_eq!(analytics.state().value.unwrap().total_transactions, 10);
    }
}
