//! Streaming connections with bounded reconnection
//!
//! At most one live connection exists per [`ResourceKey`]. Connecting a key
//! that already has a connection aborts the old task and waits for it to
//! finish before the new one is registered. Each connection runs a
//! fixed-delay retry loop that gives up after `max_attempts` consecutive
//! failed attempts; a successful open resets the count. The whole manager
//! can be paused, which holds every loop before its next attempt.

use crate::core::StreamingConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use portal_bridge_core::{ResourceKey, Result, StreamError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Messages of one open connection
pub type EventStream = BoxStream<'static, Result<String>>;

/// Opens connections for resource keys
pub trait StreamConnector: Send + Sync + 'static {
    /// Open a connection for `key`
    fn connect(&self, key: &ResourceKey) -> BoxFuture<'static, Result<EventStream>>;
}

/// Reconnection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
}

impl From<&StreamingConfig> for RetryPolicy {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            retry_delay: config.retry_delay,
            max_attempts: config.max_attempts,
        }
    }
}

/// Where a connection stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Opening, `attempt` counts from 1
    Connecting {
        /// Attempt number
        attempt: u32,
    },
    /// Open and delivering messages
    Connected,
    /// Waiting out the retry delay after `failures` failed attempts
    Retrying {
        /// Consecutive failures so far
        failures: u32,
    },
    /// Retry budget spent
    GaveUp,
}

/// Something that happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Resource the event belongs to
    pub key: ResourceKey,
    /// What happened
    pub kind: StreamEventKind,
}

/// Kinds of [`StreamEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    /// Connection opened
    Connected,
    /// A message arrived
    Message(String),
    /// Connection lost or could not be opened
    Disconnected(String),
    /// No more attempts will be made
    GaveUp {
        /// Attempts made
        attempts: u32,
    },
}

struct Connection {
    task: JoinHandle<()>,
    status: Arc<Mutex<ConnectionStatus>>,
}

impl Connection {
    async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Owns every streaming connection of a remote
pub struct StreamManager {
    connector: Arc<dyn StreamConnector>,
    policy: RetryPolicy,
    connections: DashMap<ResourceKey, Connection>,
    events_tx: flume::Sender<StreamEvent>,
    events_rx: flume::Receiver<StreamEvent>,
    paused: watch::Sender<bool>,
}

impl fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamManager")
            .field("policy", &self.policy)
            .field("connections", &self.connections.len())
            .field("paused", &self.is_paused())
            .finish()
    }
}

impl StreamManager {
    /// Create a manager with an event buffer of `event_buffer` entries
    pub fn new(connector: Arc<dyn StreamConnector>, policy: RetryPolicy, event_buffer: usize) -> Self {
        let (events_tx, events_rx) = flume::bounded(event_buffer.max(1));
        let (paused, _) = watch::channel(false);
        Self {
            connector,
            policy,
            connections: DashMap::new(),
            events_tx,
            events_rx,
            paused,
        }
    }

    /// Create a manager from the streaming configuration
    pub fn from_config(connector: Arc<dyn StreamConnector>, config: &StreamingConfig) -> Self {
        Self::new(connector, RetryPolicy::from(config), config.event_buffer)
    }

    /// Receiver of every connection's events
    pub fn events(&self) -> flume::Receiver<StreamEvent> {
        self.events_rx.clone()
    }

    /// Open `key`, tearing down any existing connection for it first
    pub async fn connect(&self, key: impl Into<ResourceKey>) {
        let key = key.into();
        // Another connect for the same key may register while we wait, so
        // only spawn once the slot is found empty.
        loop {
            let old = match self.connections.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(self.spawn(key));
                    return;
                }
                Entry::Occupied(slot) => slot.remove(),
            };
            debug!(key = %key, "replacing existing connection");
            old.shutdown().await;
        }
    }

    /// Close `key`. Returns whether a connection existed.
    pub async fn disconnect(&self, key: &ResourceKey) -> bool {
        match self.connections.remove(key) {
            Some((_, connection)) => {
                connection.shutdown().await;
                info!(key = %key, "stream disconnected");
                true
            }
            None => false,
        }
    }

    /// Close every connection
    pub async fn disconnect_all(&self) {
        let keys: Vec<ResourceKey> = self.connections.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.disconnect(&key).await;
        }
    }

    /// Hold every reconnection loop before its next attempt
    pub fn pause(&self) {
        self.paused.send_replace(true);
        debug!("streaming paused");
    }

    /// Let the reconnection loops continue
    pub fn resume(&self) {
        self.paused.send_replace(false);
        debug!("streaming resumed");
    }

    /// Whether loops are held
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Whether `key` has a running connection task
    pub fn is_live(&self, key: &ResourceKey) -> bool {
        self.connections.get(key).is_some_and(|c| !c.task.is_finished())
    }

    /// Number of running connection tasks
    pub fn live_count(&self) -> usize {
        self.connections.iter().filter(|c| !c.task.is_finished()).count()
    }

    /// Status of `key`
    pub fn status(&self, key: &ResourceKey) -> Option<ConnectionStatus> {
        self.connections.get(key).map(|c| c.status.lock().clone())
    }

    fn spawn(&self, key: ResourceKey) -> Connection {
        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting { attempt: 1 }));
        let worker = Worker {
            key,
            connector: self.connector.clone(),
            policy: self.policy,
            events: self.events_tx.clone(),
            status: status.clone(),
            paused: self.paused.subscribe(),
        };
        Connection {
            task: tokio::spawn(worker.run()),
            status,
        }
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        for connection in self.connections.iter() {
            connection.task.abort();
        }
    }
}

struct Worker {
    key: ResourceKey,
    connector: Arc<dyn StreamConnector>,
    policy: RetryPolicy,
    events: flume::Sender<StreamEvent>,
    status: Arc<Mutex<ConnectionStatus>>,
    paused: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        let mut failures = 0u32;
        loop {
            if self.paused.wait_for(|paused| !*paused).await.is_err() {
                return;
            }

            self.set_status(ConnectionStatus::Connecting { attempt: failures + 1 });
            match self.connector.connect(&self.key).await {
                Ok(mut stream) => {
                    failures = 0;
                    self.set_status(ConnectionStatus::Connected);
                    self.emit(StreamEventKind::Connected);
                    info!(key = %self.key, "stream connected");

                    let reason = loop {
                        match stream.next().await {
                            Some(Ok(message)) => self.emit(StreamEventKind::Message(message)),
                            Some(Err(e)) => break e.to_string(),
                            None => break "stream ended".to_string(),
                        }
                    };
                    warn!(key = %self.key, reason = %reason, "stream lost");
                    self.emit(StreamEventKind::Disconnected(reason));
                }
                Err(e) => {
                    failures += 1;
                    warn!(key = %self.key, attempt = failures, error = %e, "stream connect failed");
                    self.emit(StreamEventKind::Disconnected(e.to_string()));
                }
            }

            if failures >= self.policy.max_attempts {
                let err = StreamError::RetriesExhausted {
                    key: self.key.clone(),
                    attempts: failures,
                };
                warn!(key = %self.key, "{}", err);
                self.set_status(ConnectionStatus::GaveUp);
                self.emit(StreamEventKind::GaveUp { attempts: failures });
                return;
            }

            self.set_status(ConnectionStatus::Retrying { failures });
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    fn emit(&self, kind: StreamEventKind) {
        let event = StreamEvent {
            key: self.key.clone(),
            kind,
        };
        if let Err(flume::TrySendError::Full(event)) = self.events.try_send(event) {
            debug!(key = %event.key, "event buffer full, dropping event");
        }
    }
}

/// Production connector over WebSockets
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
}

impl WebSocketConnector {
    /// Connector resolving keys under `base_url` (e.g. `ws://host/streams`)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// URL a key connects to
    pub fn url_for(&self, key: &ResourceKey) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            key.as_str().trim_start_matches('/')
        )
    }
}

impl StreamConnector for WebSocketConnector {
    fn connect(&self, key: &ResourceKey) -> BoxFuture<'static, Result<EventStream>> {
        use tokio_tungstenite::tungstenite::Message;

        let url = self.url_for(key);
        let key = key.clone();
        Box::pin(async move {
            let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| StreamError::Connect {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;

            let stream = ws
                .filter_map(move |message| {
                    let item = match message {
                        Ok(Message::Text(text)) => Some(Ok(text)),
                        Ok(Message::Binary(data)) => Some(Ok(String::from_utf8_lossy(&data).into_owned())),
                        Ok(Message::Close(_)) => Some(Err(StreamError::Closed(key.clone()).into())),
                        // Ping/pong are answered by tungstenite
                        Ok(_) => None,
                        Err(e) => Some(Err(StreamError::Protocol {
                            key: key.clone(),
                            reason: e.to_string(),
                        }
                        .into())),
                    };
                    futures::future::ready(item)
                })
                .boxed();
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_bridge_core::Error;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Fail,
        Open(Vec<&'static str>),
    }

    struct OpenGuard(Arc<AtomicUsize>);

    impl Drop for OpenGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ScriptedConnector {
        script: Mutex<VecDeque<Script>>,
        attempts: AtomicUsize,
        open: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            })
        }
    }

    impl StreamConnector for ScriptedConnector {
        fn connect(&self, key: &ResourceKey) -> BoxFuture<'static, Result<EventStream>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().pop_front().unwrap_or(Script::Fail);
            let key = key.clone();
            let open = self.open.clone();
            let peak = self.peak.clone();
            Box::pin(async move {
                match step {
                    Script::Fail => Err(Error::from(StreamError::Connect {
                        key,
                        reason: "refused".into(),
                    })),
                    Script::Open(messages) => {
                        let now_open = open.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now_open, Ordering::SeqCst);
                        let guard = OpenGuard(open);
                        let items = messages.into_iter().map(|m| Ok(m.to_string()));
                        // Stays open after the scripted messages.
                        let stream = futures::stream::iter(items)
                            .chain(futures::stream::pending())
                            .map(move |item| {
                                let _held = &guard;
                                item
                            })
                            .boxed();
                        Ok(stream)
                    }
                }
            })
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            retry_delay: Duration::from_secs(5),
            max_attempts,
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_second_connect_replaces_first() {
        let connector = ScriptedConnector::new(vec![Script::Open(vec!["a"]), Script::Open(vec!["b"])]);
        let manager = StreamManager::new(connector.clone(), policy(3), 16);
        let key = ResourceKey::from("queue/timedeal/7");

        manager.connect(key.clone()).await;
        settle().await;
        manager.connect(key.clone()).await;
        settle().await;

        assert_eq!(manager.live_count(), 1);
        assert!(manager.is_live(&key));
        assert_eq!(connector.open.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status(&key), Some(ConnectionStatus::Connected));
    }

    #[tokio::test]
    async fn test_racing_connects_never_overlap() {
        let connector = ScriptedConnector::new(vec![
            Script::Open(vec![]),
            Script::Open(vec![]),
            Script::Open(vec![]),
        ]);
        let manager = StreamManager::new(connector.clone(), policy(3), 16);
        let key = ResourceKey::from("queue/timedeal/7");

        manager.connect(key.clone()).await;
        settle().await;
        tokio::join!(manager.connect(key.clone()), manager.connect(key.clone()));
        settle().await;

        assert_eq!(manager.live_count(), 1);
        assert_eq!(connector.open.load(Ordering::SeqCst), 1);
        assert_eq!(connector.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retry_gives_up() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = StreamManager::new(connector.clone(), policy(3), 16);
        let events = manager.events();
        let key = ResourceKey::from("orders");

        let started = tokio::time::Instant::now();
        manager.connect(key.clone()).await;

        let mut gave_up = None;
        while let Ok(event) = events.recv_async().await {
            if let StreamEventKind::GaveUp { attempts } = event.kind {
                gave_up = Some(attempts);
                break;
            }
        }

        assert_eq!(gave_up, Some(3));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        settle().await;
        assert_eq!(manager.status(&key), Some(ConnectionStatus::GaveUp));
        assert!(!manager.is_live(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let connector = ScriptedConnector::new(vec![Script::Fail, Script::Fail, Script::Open(vec!["hello"])]);
        let manager = StreamManager::new(connector.clone(), policy(3), 16);
        let events = manager.events();

        manager.connect("feed").await;
        let mut kinds = Vec::new();
        while let Ok(event) = events.recv_async().await {
            let done = matches!(event.kind, StreamEventKind::Message(_));
            kinds.push(event.kind);
            if done {
                break;
            }
        }

        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds[2], StreamEventKind::Connected);
        assert_eq!(kinds[3], StreamEventKind::Message("hello".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_reconnection() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = StreamManager::new(connector.clone(), policy(5), 16);

        manager.connect("feed").await;
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        manager.pause();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        manager.resume();
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let connector = ScriptedConnector::new(vec![Script::Open(vec![]), Script::Open(vec![])]);
        let manager = StreamManager::new(connector.clone(), policy(1), 16);

        manager.connect("a").await;
        manager.connect("b").await;
        settle().await;
        assert_eq!(manager.live_count(), 2);

        assert!(manager.disconnect(&ResourceKey::from("a")).await);
        assert!(!manager.disconnect(&ResourceKey::from("a")).await);
        manager.disconnect_all().await;
        assert_eq!(manager.live_count(), 0);
        assert_eq!(connector.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_websocket_url() {
        let connector = WebSocketConnector::new("ws://localhost:8080/streams/");
        assert_eq!(
            connector.url_for(&ResourceKey::from("/queue/7")),
            "ws://localhost:8080/streams/queue/7"
        );
    }
}
