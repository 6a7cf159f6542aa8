//! Reconnecting message channel to a controller.
//!
//! A [`Channel`] owns the single transport to the controller. It queues
//! commands while the link is down, flushes them in FIFO order as soon as
//! a connection opens, dispatches inbound frames to subscribers by type,
//! and reconnects after a constant delay whenever the link closes, until
//! [`disconnect`](Channel::disconnect) is called.
//!
//! # Example
//!
//! ```rust,ignore
//! use espgrow_api::{Channel, ChannelConfig, WebSocketConnector};
//! use url::Url;
//!
//! let channel = Channel::new(WebSocketConnector, ChannelConfig::default());
//! let sub = channel.subscribe("devices", |data| println!("devices: {data}"));
//!
//! channel.connect(Url::parse("ws://192.168.1.40/ws")?);
//! channel.send("get_devices", None)?;
//! // ...
//! sub.unsubscribe();
//! channel.disconnect();
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::frame;
use crate::registry::{Delivery, HandlerRegistry, Subscription};
use crate::transport::{Connector, FrameSink, FrameStream, Transport};

// ── ConnectionState ──────────────────────────────────────────────────

/// Lifecycle of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No live transport. A reconnect may be pending.
    Idle,
    /// A transport is being opened.
    Connecting,
    /// Transport is open; commands are written immediately.
    Open,
    /// Torn down on request. Never re-entered automatically.
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

// ── ChannelConfig ────────────────────────────────────────────────────

/// Reconnect and queueing policy.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Constant delay between a close and the next connect attempt. Default: 3s.
    pub reconnect_delay: Duration,

    /// Upper bound on commands held while disconnected. The oldest
    /// command is dropped when the bound is hit. Default: 256.
    pub max_queued: usize,

    /// Commands older than this at flush time are discarded instead of
    /// sent. `None` keeps them forever. Default: 60s.
    pub queued_ttl: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            max_queued: 256,
            queued_ttl: Some(Duration::from_secs(60)),
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────────

/// Handle to the controller channel.
///
/// Cheaply cloneable; all clones share one transport, one outbound queue
/// and one handler registry.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    connector: Box<dyn Connector>,
    config: ChannelConfig,
    state: watch::Sender<ConnectionState>,
    last_error: watch::Sender<Option<String>>,
    link: Mutex<Link>,
    handlers: Arc<HandlerRegistry>,
    supervisor: Mutex<Option<Supervisor>>,
}

/// Outbound side: either a live writer or the pending queue.
#[derive(Default)]
struct Link {
    /// Writer of the open session, tagged with its session number.
    writer: Option<(u64, mpsc::UnboundedSender<String>)>,
    queue: VecDeque<QueuedFrame>,
    sessions: u64,
}

struct QueuedFrame {
    kind: String,
    text: String,
    queued_at: Instant,
}

struct Supervisor {
    url: Url,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Channel {
    /// Create a channel. Does NOT connect -- call [`connect`](Self::connect).
    pub fn new(connector: impl Connector, config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (last_error, _) = watch::channel(None);

        Self {
            inner: Arc::new(ChannelInner {
                connector: Box::new(connector),
                config,
                state,
                last_error,
                link: Mutex::new(Link::default()),
                handlers: Arc::new(HandlerRegistry::default()),
                supervisor: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start connecting to `url` and keep the link up.
    ///
    /// No-op while a connection is being opened, is open, or a reconnect
    /// is already scheduled. Must be called from within a Tokio runtime.
    pub fn connect(&self, url: Url) {
        let mut supervisor = self.inner.supervisor.lock();

        if let Some(running) = supervisor.as_ref() {
            if !running.task.is_finished() {
                if !running.cancel.is_cancelled() {
                    tracing::debug!(url = %running.url, "connect ignored, channel already active");
                    return;
                }
                // Torn down but still unwinding; make sure it cannot linger.
                running.task.abort();
            }
        }

        self.inner.state.send_replace(ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            Arc::clone(&self.inner),
            url.clone(),
            cancel.clone(),
        ));

        *supervisor = Some(Supervisor { url, cancel, task });
    }

    /// Reconnect to the URL used by the last [`connect`](Self::connect).
    ///
    /// Returns `false` if the channel was never connected.
    pub fn reconnect(&self) -> bool {
        let url = self.inner.supervisor.lock().as_ref().map(|s| s.url.clone());
        match url {
            Some(url) => {
                self.connect(url);
                true
            }
            None => false,
        }
    }

    /// Deliberate teardown: cancel any pending reconnect, close the live
    /// transport, and stop reconnecting.
    pub fn disconnect(&self) {
        if let Some(supervisor) = self.inner.supervisor.lock().as_ref() {
            supervisor.cancel.cancel();
        }
        self.inner.state.send_replace(ConnectionState::Closed);
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Send a command, or queue it until the next successful connect.
    pub fn send(&self, kind: &str, data: Option<&Value>) -> Result<(), Error> {
        let text = frame::encode(kind, data)?;
        self.send_encoded(kind, text);
        Ok(())
    }

    fn send_encoded(&self, kind: &str, text: String) {
        let mut link = self.inner.link.lock();

        let text = match link.writer.as_ref() {
            Some((_, writer)) => match writer.send(text) {
                Ok(()) => {
                    tracing::trace!(kind, "frame handed to transport");
                    return;
                }
                Err(mpsc::error::SendError(text)) => text,
            },
            None => text,
        };

        if link.queue.len() >= self.inner.config.max_queued {
            if let Some(dropped) = link.queue.pop_front() {
                tracing::warn!(
                    dropped = %dropped.kind,
                    max_queued = self.inner.config.max_queued,
                    "outbound queue full, dropping oldest command"
                );
            }
        }

        tracing::debug!(kind, queued = link.queue.len() + 1, "channel not open, queueing command");
        link.queue.push_back(QueuedFrame {
            kind: kind.to_owned(),
            text,
            queued_at: Instant::now(),
        });
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register `handler` for frames of type `kind`.
    ///
    /// The handler receives the frame's `data` field, or the whole frame
    /// when it has none. Handlers for one type run in registration order.
    pub fn subscribe<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.handlers.insert(kind, Arc::new(handler))
    }

    /// Like [`subscribe`](Self::subscribe), but the handler always gets the
    /// whole frame, for pushes that carry fields beside a scalar `data`.
    pub fn subscribe_frame<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .insert_with(kind, Delivery::Frame, Arc::new(handler))
    }

    /// Number of handlers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.inner.handlers.count(kind)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Most recent transport error, cleared on successful connect.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    /// Number of commands waiting for the link to open.
    pub fn queued_len(&self) -> usize {
        self.inner.link.lock().queue.len()
    }

    /// URL of the current (or last) connection target.
    pub fn target(&self) -> Option<Url> {
        self.inner.supervisor.lock().as_ref().map(|s| s.url.clone())
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state())
            .field("queued", &self.queued_len())
            .field("handlers", &self.inner.handlers)
            .finish_non_exhaustive()
    }
}

// ── Background connection loop ───────────────────────────────────────

/// connect → run session → Idle → constant delay → connect, until cancelled.
async fn supervise(inner: Arc<ChannelInner>, url: Url, cancel: CancellationToken) {
    loop {
        set_state(&inner, &cancel, ConnectionState::Connecting);

        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = inner.connector.connect(&url) => result,
        };

        match attempt {
            Ok(transport) => run_session(&inner, transport, &cancel).await,
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "WebSocket connect failed");
                inner.last_error.send_replace(Some(e.to_string()));
            }
        }

        set_state(&inner, &cancel, ConnectionState::Idle);

        if cancel.is_cancelled() {
            break;
        }

        let delay = inner.config.reconnect_delay;
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("channel supervisor exiting");
}

/// State writes from a supervisor that has been torn down are discarded,
/// so a late `Idle` can never overwrite `Closed`.
fn set_state(inner: &ChannelInner, cancel: &CancellationToken, next: ConnectionState) -> bool {
    inner.state.send_if_modified(|current| {
        if cancel.is_cancelled() || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

/// Drive one open transport until it closes.
async fn run_session(inner: &Arc<ChannelInner>, transport: Transport, cancel: &CancellationToken) {
    let Transport { mut sink, mut stream } = transport;
    let (session, mut outbound) = open_link(inner, cancel);

    let close_reason = session_loop(inner, &mut sink, &mut stream, &mut outbound, cancel).await;

    // Every exit path closes the transport so the peer sees the close too.
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "error while closing transport");
    }

    close_link(inner, session, &mut outbound);
    tracing::info!(reason = close_reason, "WebSocket disconnected");
}

async fn session_loop(
    inner: &Arc<ChannelInner>,
    sink: &mut FrameSink,
    stream: &mut FrameStream,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> &'static str {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return "teardown",
            Some(text) = outbound.recv() => {
                if let Err(e) = sink.send(text).await {
                    tracing::warn!(error = %e, "WebSocket write failed");
                    inner.last_error.send_replace(Some(e.to_string()));
                    return "write error";
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => dispatch(inner, &text),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket error");
                    inner.last_error.send_replace(Some(e.to_string()));
                    return "read error";
                }
                None => return "closed by peer",
            },
        }
    }
}

/// Publish a fresh writer, flushing the queue into it first so queued
/// commands precede anything sent after the link opened.
fn open_link(
    inner: &ChannelInner,
    cancel: &CancellationToken,
) -> (u64, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut link = inner.link.lock();
    link.sessions += 1;
    let session = link.sessions;

    let ttl = inner.config.queued_ttl;
    let mut flushed = 0usize;
    for queued in link.queue.drain(..) {
        if ttl.is_some_and(|ttl| queued.queued_at.elapsed() > ttl) {
            tracing::debug!(kind = %queued.kind, "discarding stale queued command");
            continue;
        }
        // Receiver is in hand, the send cannot fail.
        let _ = tx.send(queued.text);
        flushed += 1;
    }

    link.writer = Some((session, tx));
    set_state(inner, cancel, ConnectionState::Open);
    inner.last_error.send_replace(None);

    if flushed > 0 {
        tracing::debug!(flushed, "flushed queued commands");
    }
    (session, rx)
}

/// Retract the writer; anything it accepted but never wrote goes back to
/// the front of the queue in its original order.
fn close_link(inner: &ChannelInner, session: u64, outbound: &mut mpsc::UnboundedReceiver<String>) {
    let mut link = inner.link.lock();
    if link.writer.as_ref().is_some_and(|(id, _)| *id == session) {
        link.writer = None;
    }
    outbound.close();

    let mut unsent = Vec::new();
    while let Ok(text) = outbound.try_recv() {
        unsent.push(text);
    }
    for text in unsent.into_iter().rev() {
        link.queue.push_front(QueuedFrame {
            kind: "unsent".into(),
            text,
            queued_at: Instant::now(),
        });
    }
}

fn dispatch(inner: &ChannelInner, text: &str) {
    let frame = match frame::decode(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed frame");
            return;
        }
    };

    let handled = inner.handlers.dispatch(&frame);
    tracing::trace!(kind = %frame.kind, handled, "frame dispatched");
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use futures_util::{sink, stream};
    use serde_json::json;

    /// Controller side of one scripted connection.
    struct Peer {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        async fn next_frame(&mut self) -> Value {
            let text = self.from_client.recv().await.unwrap();
            serde_json::from_str(&text).unwrap()
        }

        fn push(&self, frame: &Value) {
            self.to_client.send(frame.to_string()).unwrap();
        }
    }

    #[derive(Clone, Copy)]
    enum Script {
        /// Hand every connection to the test as a `Peer`.
        Accept,
        /// Open, then close immediately.
        CloseImmediately,
        /// Refuse to connect.
        Refuse,
        /// Open, fail the first read, then go silent.
        ReadError,
    }

    struct ScriptedConnector {
        script: Script,
        attempts: Arc<Mutex<Vec<Instant>>>,
        peers: mpsc::UnboundedSender<Peer>,
    }

    impl Connector for ScriptedConnector {
        fn connect<'a>(&'a self, _url: &'a Url) -> BoxFuture<'a, Result<Transport, Error>> {
            Box::pin(async move {
                self.attempts.lock().push(Instant::now());
                match self.script {
                    Script::Refuse => Err(Error::WebSocketConnect("connection refused".into())),
                    Script::CloseImmediately => Ok(Transport::new(
                        Box::pin(sink::drain::<String>().sink_map_err(|_| Error::ChannelClosed)),
                        Box::pin(stream::empty::<Result<String, Error>>()),
                    )),
                    Script::ReadError => Ok(Transport::new(
                        Box::pin(sink::drain::<String>().sink_map_err(|_| Error::ChannelClosed)),
                        Box::pin(
                            stream::iter([Err::<String, _>(Error::WebSocket("connection reset".into()))])
                                .chain(stream::pending::<Result<String, Error>>()),
                        ),
                    )),
                    Script::Accept => {
                        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
                        let (to_client, client_rx) = mpsc::unbounded_channel::<String>();

                        let sink = sink::unfold(client_tx, |tx, text: String| async move {
                            tx.send(text).map_err(|_| Error::ChannelClosed)?;
                            Ok::<_, Error>(tx)
                        });
                        let stream = stream::unfold(client_rx, |mut rx| async move {
                            rx.recv().await.map(|text| (Ok(text), rx))
                        });

                        let _ = self.peers.send(Peer { to_client, from_client });
                        Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
                    }
                }
            })
        }
    }

    struct Harness {
        channel: Channel,
        attempts: Arc<Mutex<Vec<Instant>>>,
        peers: mpsc::UnboundedReceiver<Peer>,
    }

    fn harness(script: Script, config: ChannelConfig) -> Harness {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let (peers_tx, peers) = mpsc::unbounded_channel();
        let connector = ScriptedConnector {
            script,
            attempts: Arc::clone(&attempts),
            peers: peers_tx,
        };
        Harness {
            channel: Channel::new(connector, config),
            attempts,
            peers,
        }
    }

    fn url() -> Url {
        Url::parse("ws://controller.local/ws").unwrap()
    }

    async fn wait_for_state(channel: &Channel, wanted: ConnectionState) {
        let mut rx = channel.watch_state();
        rx.wait_for(|s| *s == wanted).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn commands_sent_while_idle_flush_in_order_exactly_once() {
        let mut h = harness(Script::Accept, ChannelConfig::default());

        h.channel.send("get_sensors", None).unwrap();
        h.channel.send("get_devices", None).unwrap();
        h.channel
            .send("toggle_rule", Some(&json!({ "id": "rule_1" })))
            .unwrap();
        assert_eq!(h.channel.queued_len(), 3);

        h.channel.connect(url());
        let mut peer = h.peers.recv().await.unwrap();
        wait_for_state(&h.channel, ConnectionState::Open).await;
        assert_eq!(h.channel.queued_len(), 0);

        assert_eq!(peer.next_frame().await, json!({ "type": "get_sensors" }));
        assert_eq!(peer.next_frame().await, json!({ "type": "get_devices" }));
        assert_eq!(
            peer.next_frame().await,
            json!({ "type": "toggle_rule", "data": { "id": "rule_1" } })
        );

        // Sent after open goes straight through, after the flushed ones.
        h.channel.send("ping", None).unwrap();
        assert_eq!(peer.next_frame().await, json!({ "type": "ping" }));
        assert!(peer.from_client.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_once_per_close_with_constant_delay() {
        let delay = Duration::from_secs(3);
        let h = harness(
            Script::CloseImmediately,
            ChannelConfig {
                reconnect_delay: delay,
                ..ChannelConfig::default()
            },
        );

        h.channel.connect(url());
        tokio::time::sleep(Duration::from_millis(9_500)).await;

        let attempts = h.attempts.lock().clone();
        assert_eq!(attempts.len(), 4, "attempts at 0s, 3s, 6s, 9s");
        for pair in attempts.windows(2) {
            assert_eq!(pair[1] - pair[0], delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_reconnects_after_disconnect() {
        let h = harness(Script::CloseImmediately, ChannelConfig::default());

        h.channel.connect(url());
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(h.attempts.lock().len(), 2);

        h.channel.disconnect();
        assert_eq!(h.channel.state(), ConnectionState::Closed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.attempts.lock().len(), 2);
        assert_eq!(h.channel.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_sets_last_error_and_retries() {
        let h = harness(Script::Refuse, ChannelConfig::default());

        h.channel.connect(url());
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert_eq!(h.attempts.lock().len(), 2);
        assert!(h.channel.last_error().unwrap().contains("refused"));
        assert_ne!(h.channel.state(), ConnectionState::Open);
        h.channel.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_goes_idle_and_reconnects_after_delay() {
        let delay = Duration::from_secs(3);
        let h = harness(
            Script::ReadError,
            ChannelConfig {
                reconnect_delay: delay,
                ..ChannelConfig::default()
            },
        );

        h.channel.connect(url());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(h.channel.state(), ConnectionState::Idle);
        assert!(h.channel.last_error().unwrap().contains("connection reset"));
        assert_eq!(h.attempts.lock().len(), 1);

        tokio::time::sleep(delay).await;
        let attempts = h.attempts.lock().clone();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1] - attempts[0], delay);
        h.channel.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_active_is_a_no_op() {
        let mut h = harness(Script::Accept, ChannelConfig::default());

        h.channel.connect(url());
        let _peer = h.peers.recv().await.unwrap();
        wait_for_state(&h.channel, ConnectionState::Open).await;

        h.channel.connect(url());
        h.channel.connect(url());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.attempts.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_reach_subscribers_and_garbage_is_dropped() {
        let mut h = harness(Script::Accept, ChannelConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sub = {
            let seen = Arc::clone(&seen);
            h.channel
                .subscribe("devices", move |data| seen.lock().push(data.clone()))
        };

        h.channel.connect(url());
        let peer = h.peers.recv().await.unwrap();
        wait_for_state(&h.channel, ConnectionState::Open).await;

        peer.to_client.send("{ not json".into()).unwrap();
        peer.push(&json!({ "data": [] }));
        peer.push(&json!({ "type": "unknown_push", "data": 1 }));
        peer.push(&json!({ "type": "devices", "data": [{ "id": "fan" }] }));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*seen.lock(), vec![json!([{ "id": "fan" }])]);

        sub.unsubscribe();
        peer.push(&json!({ "type": "devices", "data": [] }));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_close_goes_idle_then_reconnects_and_flushes_new_queue() {
        let mut h = harness(Script::Accept, ChannelConfig::default());

        h.channel.connect(url());
        let first = h.peers.recv().await.unwrap();
        wait_for_state(&h.channel, ConnectionState::Open).await;

        drop(first);
        wait_for_state(&h.channel, ConnectionState::Idle).await;

        h.channel.send("get_rules", None).unwrap();
        assert_eq!(h.channel.queued_len(), 1);

        let mut second = h.peers.recv().await.unwrap();
        assert_eq!(second.next_frame().await, json!({ "type": "get_rules" }));
        assert_eq!(h.attempts.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_oldest() {
        let h = harness(
            Script::Refuse,
            ChannelConfig {
                max_queued: 2,
                ..ChannelConfig::default()
            },
        );

        h.channel.send("first", None).unwrap();
        h.channel.send("second", None).unwrap();
        h.channel.send("third", None).unwrap();
        assert_eq!(h.channel.queued_len(), 2);

        let kinds: Vec<String> = h
            .channel
            .inner
            .link
            .lock()
            .queue
            .iter()
            .map(|q| q.kind.clone())
            .collect();
        assert_eq!(kinds, vec!["second".to_string(), "third".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_queued_commands_are_discarded_on_flush() {
        let mut h = harness(
            Script::Accept,
            ChannelConfig {
                queued_ttl: Some(Duration::from_secs(10)),
                ..ChannelConfig::default()
            },
        );

        h.channel.send("stale", None).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        h.channel.send("fresh", None).unwrap();

        h.channel.connect(url());
        let mut peer = h.peers.recv().await.unwrap();
        assert_eq!(peer.next_frame().await, json!({ "type": "fresh" }));
        wait_for_state(&h.channel, ConnectionState::Open).await;
        assert_eq!(h.channel.queued_len(), 0);
    }
}
