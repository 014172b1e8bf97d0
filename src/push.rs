//! Push channel: server-initiated cache replacements over a long-lived
//! WebSocket connection.
//!
//! Inbound messages are `{ "event": <kind>, "data": <payload> }` envelopes.
//! A recognized kind routes its payload — normalized, then deserialized —
//! straight into the matching cache entry via `mutate(.., false)`, so no
//! pull is triggered. Unknown kinds and unparseable messages are ignored;
//! new server-side event kinds must never break old clients.
//!
//! The hub owns the connection lifecycle: the first registered route dials
//! out, dropping the last route hangs up. Reconnection is a fixed delay in
//! the transport run loop.

use crate::cache::{CacheKey, PollCache};
use crate::client::json::from_value_with_path;
use crate::model::{AnalyticsSnapshot, FraudAlert};
use crate::normalize::normalize;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A decoded push message.
///
/// Known kinds carry the raw payload; everything else lands in `Unknown`
/// and is dropped by the dispatcher.
#[derive(Debug)]
pub enum PushMessage {
    /// Full analytics snapshot replacement (`"analyticsUpdate"`).
    AnalyticsUpdate(Value),
    /// Full alert-list replacement (`"alertsUpdate"`).
    AlertsUpdate(Value),
    Unknown { kind: String },
}

impl PushMessage {
    /// Parse an inbound text frame. `None` for non-JSON or a missing
    /// discriminant — malformed messages are not an error condition.
    pub fn parse(text: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Envelope {
            event: String,
            #[serde(default)]
            data: Value,
        }

        let envelope: Envelope = serde_json::from_str(text).ok()?;
        Some(match envelope.event.as_str() {
            "analyticsUpdate" => PushMessage::AnalyticsUpdate(envelope.data),
            "alertsUpdate" => PushMessage::AlertsUpdate(envelope.data),
            _ => PushMessage::Unknown {
                kind: envelope.event,
            },
        })
    }
}

/// Lower-level transport capability the subscriber runs on. The subscriber
/// itself holds no connection state beyond the dispatch table.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn connect(&self) -> anyhow::Result<Box<dyn MessageStream>>;
}

/// One established connection yielding text messages until it closes.
#[async_trait]
pub trait MessageStream: Send {
    async fn next_message(&mut self) -> Option<String>;
}

/// Production transport over `tokio-tungstenite`.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> anyhow::Result<Box<dyn MessageStream>> {
        let (socket, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        Ok(Box::new(WsStream { socket }))
    }
}

struct WsStream {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl MessageStream for WsStream {
    async fn next_message(&mut self) -> Option<String> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) | Err(_) => return None,
                // Ping/pong are answered by tungstenite; binary frames are
                // not part of the protocol.
                Ok(_) => continue,
            }
        }
        None
    }
}

/// Which cache a push kind targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Topic {
    Analytics,
    Alerts,
}

struct HubInner {
    routes: HashMap<Topic, Vec<CacheKey>>,
    active_routes: usize,
    cancel: Option<CancellationToken>,
}

/// Process-wide push subscriber.
///
/// Holds lookup-only back-references to the caches it updates; entry
/// ownership stays with the polling cache manager.
pub struct PushHub {
    analytics: PollCache<AnalyticsSnapshot>,
    alerts: PollCache<Vec<FraudAlert>>,
    transport: Arc<dyn PushTransport>,
    inner: Mutex<HubInner>,
}

impl PushHub {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        analytics: PollCache<AnalyticsSnapshot>,
        alerts: PollCache<Vec<FraudAlert>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            analytics,
            alerts,
            transport,
            inner: Mutex::new(HubInner {
                routes: HashMap::new(),
                active_routes: 0,
                cancel: None,
            }),
        })
    }

    /// Route `analyticsUpdate` payloads into the given cache entry.
    pub fn route_analytics(self: &Arc<Self>, key: CacheKey) -> RouteGuard {
        self.route(Topic::Analytics, key)
    }

    /// Route `alertsUpdate` payloads into the given cache entry.
    pub fn route_alerts(self: &Arc<Self>, key: CacheKey) -> RouteGuard {
        self.route(Topic::Alerts, key)
    }

    fn route(self: &Arc<Self>, topic: Topic, key: CacheKey) -> RouteGuard {
        let mut inner = self.inner.lock().unwrap();
        inner.routes.entry(topic).or_default().push(key.clone());
        inner.active_routes += 1;
        if inner.active_routes == 1 {
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            tokio::spawn(Arc::clone(self).run(cancel));
        }
        RouteGuard {
            hub: Arc::clone(self),
            topic,
            key,
        }
    }

    fn unroute(&self, topic: Topic, key: &CacheKey) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(keys) = inner.routes.get_mut(&topic)
            && let Some(pos) = keys.iter().position(|k| k == key)
        {
            keys.remove(pos);
            inner.active_routes -= 1;
        }
        if inner.active_routes == 0
            && let Some(cancel) = inner.cancel.take()
        {
            debug!("last push route dropped, closing channel");
            cancel.cancel();
        }
    }

    /// Connection loop: dial, drain messages, redial after a fixed delay.
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                connected = self.transport.connect() => match connected {
                    Ok(mut stream) => {
                        info!("push channel connected");
                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                message = stream.next_message() => match message {
                                    Some(text) => self.handle_message(&text),
                                    None => {
                                        warn!("push channel closed");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "push channel connect failed"),
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    /// Dispatch one inbound frame. Public so hosts driving their own
    /// transport (and tests) can inject messages directly.
    pub fn handle_message(&self, text: &str) {
        match PushMessage::parse(text) {
            Some(PushMessage::AnalyticsUpdate(data)) => {
                self.apply(Topic::Analytics, data, |hub, key, snapshot: AnalyticsSnapshot| {
                    hub.analytics.mutate(key, snapshot, false);
                });
            }
            Some(PushMessage::AlertsUpdate(data)) => {
                self.apply(Topic::Alerts, data, |hub, key, alerts: Vec<FraudAlert>| {
                    hub.alerts.mutate(key, alerts, false);
                });
            }
            Some(PushMessage::Unknown { kind }) => {
                debug!(kind = %kind, "ignoring unrecognized push event");
            }
            None => {
                debug!("ignoring unparseable push message");
            }
        }
    }

    /// Normalize, deserialize, and write a payload into every routed entry.
    fn apply<V, F>(&self, topic: Topic, data: Value, write: F)
    where
        V: serde::de::DeserializeOwned + Clone,
        F: Fn(&Self, &CacheKey, V),
    {
        let keys: Vec<CacheKey> = {
            let inner = self.inner.lock().unwrap();
            inner.routes.get(&topic).cloned().unwrap_or_default()
        };
        if keys.is_empty() {
            return;
        }

        let value: V = match from_value_with_path(normalize(data)) {
            Ok(value) => value,
            Err(e) => {
                warn!(topic = ?topic, error = %e, "dropping undecodable push payload");
                return;
            }
        };

        for key in &keys {
            write(self, key, value.clone());
        }
    }
}

/// Active registration of one push route; dropping it deregisters, and the
/// last drop tears the connection down.
pub struct RouteGuard {
    hub: Arc<PushHub>,
    topic: Topic,
    key: CacheKey,
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.hub.unroute(self.topic, &self.key);
    }
}
