/*
[INPUT]:  Stream URL, credential provider, typed channel subscriptions
[OUTPUT]: Decoded payloads delivered to subscriber handlers, gap notifications
[POS]:    WebSocket layer - reconnecting sequenced stream client
[UPDATE]: When changing dispatch, heartbeat, or reconnect behavior
*/

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex as TokioMutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::CredentialProvider;
use crate::auth::manager::truncate_for_log;
use crate::config::{ClientConfig, StreamConfig};
use crate::error::{GrvtError, Result};
use crate::ws::message::{Envelope, subscribe_frame, unsubscribe_frame};
use crate::ws::registry::{Entry, Gap, HandlerResult, SubscribeOptions, SubscriptionRegistry};
use crate::ws::state::{Backoff, ConnectionEvent, ConnectionState, transition};
use crate::ws::transport::{
    Connector, FrameSink, InboundFrame, Transport, TungsteniteConnector,
};

const UNROUTED_LOG_LIMIT: usize = 10;
const OTHER_LOG_LIMIT: usize = 3;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static UNROUTED_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static OTHER_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

type GapHandler = Arc<dyn Fn(String, u64, u64) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_received: u64,
    pub messages_dispatched: u64,
    pub gaps_detected: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    messages_dispatched: AtomicU64,
    gaps_detected: AtomicU64,
    decode_failures: AtomicU64,
    handler_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StreamStats {
        StreamStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost {
        error: GrvtError,
        /// `None` when the transport never came up
        uptime: Option<Duration>,
    },
}

/// Reconnecting stream client with typed channel subscriptions
///
/// Cloning yields another handle to the same connection. Subscriptions survive
/// reconnects and are re-sent after every handshake; per-channel sequence
/// tracking restarts with each new connection.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    config: StreamConfig,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    registry: SubscriptionRegistry,
    gap_handler: RwLock<Option<GapHandler>>,
    state: watch::Sender<ConnectionState>,
    // survives reconnects; drained only by a live session
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: TokioMutex<mpsc::UnboundedReceiver<String>>,
    // subscribe/unsubscribe frames for the current session only
    control_tx: mpsc::UnboundedSender<String>,
    control_rx: TokioMutex<mpsc::UnboundedReceiver<String>>,
    shutdown: CancellationToken,
    running: AtomicBool,
    closed: AtomicBool,
    counters: Counters,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("subscriptions", &self.inner.registry.channels())
            .finish()
    }
}

impl StreamClient {
    pub fn new(
        url: impl Into<String>,
        config: StreamConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self::with_connector(url, config, credentials, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(
        url: impl Into<String>,
        config: StreamConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                credentials,
                connector,
                registry: SubscriptionRegistry::new(),
                gap_handler: RwLock::new(None),
                state,
                outbound_tx,
                outbound_rx: TokioMutex::new(outbound_rx),
                control_tx,
                control_rx: TokioMutex::new(control_rx),
                shutdown: CancellationToken::new(),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Trading or market-data stream depending on `config.stream.market_data`
    pub fn from_config(config: &ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let endpoints = config.endpoints();
        let url = if config.stream.market_data {
            endpoints.ws_market
        } else {
            endpoints.ws_trades
        };
        Self::new(url, config.stream.clone(), credentials)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn stats(&self) -> StreamStats {
        self.inner.counters.snapshot()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.registry.channels()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Subscribe to `channel` and its `<channel>.*` sub-channels
    pub fn subscribe<T, F, Fut>(&self, channel: &str, handler: F) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_with(channel, SubscribeOptions::default(), handler)
    }

    /// Subscribe with explicit frame params and matching mode
    ///
    /// Subscribing again to the same channel replaces the previous handler.
    pub fn subscribe_with<T, F, Fut>(
        &self,
        channel: &str,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.is_closed() {
            return Err(GrvtError::Closed);
        }
        if channel.trim().is_empty() {
            return Err(GrvtError::validation("channel must not be empty"));
        }

        let entry = Entry::new::<T, F, Fut>(channel, options, handler);
        let frame = subscribe_frame(channel, entry.params());
        let type_name = entry.type_name();
        let params = entry.params().clone();
        let replaced = self.inner.registry.insert(entry);
        let params_changed = replaced.as_ref().is_none_or(|old| *old.params() != params);

        if params_changed && self.state() == ConnectionState::Connected {
            let _ = self.inner.control_tx.send(frame);
        }
        debug!(
            channel,
            payload_type = type_name,
            replaced = replaced.is_some(),
            "stream subscription registered"
        );
        Ok(())
    }

    /// Returns whether a subscription existed; no handler starts after this returns
    pub fn unsubscribe(&self, channel: &str) -> bool {
        let Some(removed) = self.inner.registry.remove(channel) else {
            return false;
        };
        if self.state() == ConnectionState::Connected {
            let _ = self.inner.control_tx.send(unsubscribe_frame(removed.channel()));
        }
        debug!(channel, "stream subscription removed");
        true
    }

    /// Called with `(channel, expected, received)` before the out-of-order payload is delivered
    pub fn on_gap<F, Fut>(&self, callback: F)
    where
        F: Fn(String, u64, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: GapHandler = Arc::new(move |channel, expected, actual| {
            Box::pin(callback(channel, expected, actual))
        });
        *self.inner.gap_handler.write() = Some(handler);
    }

    /// Queue a frame; it is held across reconnects until a session sends it
    pub fn send_raw<S: Serialize + ?Sized>(&self, payload: &S) -> Result<()> {
        if self.is_closed() {
            return Err(GrvtError::Closed);
        }
        let text = serde_json::to_string(payload)?;
        self.inner
            .outbound_tx
            .send(text)
            .map_err(|_| GrvtError::Closed)
    }

    /// Connect and keep reconnecting until `close` or the attempt limit
    pub async fn run_forever(&self) -> Result<()> {
        if self.is_closed() {
            return Err(GrvtError::Closed);
        }
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(GrvtError::Config("stream client is already running".to_string()));
        }
        let result = self.inner.run().await;
        self.inner.running.store(false, Ordering::Release);
        result
    }

    /// Spawn `run_forever` on the current runtime
    pub fn start(&self) -> JoinHandle<Result<()>> {
        let client = self.clone();
        tokio::spawn(async move { client.run_forever().await })
    }

    /// Stop the connection loop and drop all subscriptions; idempotent
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.registry.clear();
        self.inner.apply(ConnectionEvent::Shutdown);
        info!(url = %self.inner.url, "stream client closed");
    }
}

impl Inner {
    fn apply(&self, event: ConnectionEvent) -> ConnectionState {
        let mut entered_connected = false;
        self.state.send_if_modified(|state| {
            let Some(next) = transition(*state, event) else {
                debug!(state = %state, ?event, "ignoring invalid stream transition");
                return false;
            };
            if next == *state {
                return false;
            }
            debug!(from = %state, to = %next, ?event, "stream state changed");
            entered_connected = next == ConnectionState::Connected;
            *state = next;
            true
        });
        if entered_connected {
            self.registry.reset_sequences();
        }
        *self.state.borrow()
    }

    async fn run(&self) -> Result<()> {
        self.apply(ConnectionEvent::Start);
        let backoff = Backoff::from_config(&self.config);
        let max_attempts = self.config.max_reconnect_attempts;
        let mut attempt = 0u32;
        let mut unsent: Option<String> = None;

        loop {
            let (error, uptime) = match self.session(&mut unsent).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost { error, uptime } => (error, uptime),
            };
            if self.shutdown.is_cancelled() {
                break;
            }
            self.apply(ConnectionEvent::TransportLost);

            if uptime.is_some_and(|up| up >= self.config.stable_connection()) {
                attempt = 0;
            }
            attempt = attempt.saturating_add(1);
            if max_attempts > 0 && attempt > max_attempts {
                error!(attempts = max_attempts, error = %error, "stream reconnect attempts exhausted");
                self.apply(ConnectionEvent::GiveUp);
                return Err(GrvtError::Transport(format!(
                    "gave up after {max_attempts} reconnect attempts: {error}"
                )));
            }

            let delay = backoff.delay(attempt);
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "stream lost, reconnecting"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            Counters::bump(&self.counters.reconnects);
            self.apply(ConnectionEvent::RetryDue);
        }

        self.apply(ConnectionEvent::Shutdown);
        Ok(())
    }

    async fn session(&self, unsent: &mut Option<String>) -> SessionEnd {
        let lost = |error: GrvtError, uptime: Option<Duration>| SessionEnd::Lost { error, uptime };

        let credential = tokio::select! {
            _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
            acquired = self.credentials.acquire() => match acquired {
                Ok(credential) => credential,
                Err(err) => return lost(err, None),
            },
        };

        let connect_timeout = self.config.connect_timeout();
        let connect = tokio::time::timeout(
            connect_timeout,
            self.connector.connect(&self.url, &credential),
        );
        let Transport {
            mut sink,
            mut source,
        } = tokio::select! {
            _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
            connected = connect => match connected {
                Ok(Ok(transport)) => transport,
                Ok(Err(err)) => {
                    if err.is_auth_error() {
                        self.credentials.invalidate(&credential);
                    }
                    return lost(err, None);
                }
                Err(_) => return lost(GrvtError::timeout("stream connect", connect_timeout), None),
            },
        };

        let connected_at = Instant::now();
        self.apply(ConnectionEvent::Handshake);
        info!(url = %self.url, "stream connected");

        let mut control = self.control_rx.lock().await;
        while control.try_recv().is_ok() {}

        if let Err(err) = self.resubscribe(sink.as_mut()).await {
            return lost(err, Some(connected_at.elapsed()));
        }
        if let Some(frame) = unsent.take() {
            if let Err(err) = sink.send_text(frame.clone()).await {
                *unsent = Some(frame);
                return lost(err, Some(connected_at.elapsed()));
            }
        }

        let mut outbound = self.outbound_rx.lock().await;
        let ping_every = self.config.ping_interval();
        let idle_timeout = self.config.idle_timeout();
        let mut ping = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        let end = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break SessionEnd::Shutdown,
                frame = source.next_frame() => match frame {
                    None => {
                        break lost(
                            GrvtError::Transport("stream closed by server".to_string()),
                            Some(connected_at.elapsed()),
                        );
                    }
                    Some(Err(err)) => break lost(err, Some(connected_at.elapsed())),
                    Some(Ok(InboundFrame::Heartbeat)) => last_inbound = Instant::now(),
                    Some(Ok(InboundFrame::Text(text))) => {
                        // handlers must not hold off shutdown
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break SessionEnd::Shutdown,
                            _ = self.dispatch(&text) => {}
                        }
                        // time spent in handlers is not transport silence
                        last_inbound = Instant::now();
                    }
                },
                _ = ping.tick() => {
                    if last_inbound.elapsed() >= idle_timeout {
                        break lost(
                            GrvtError::timeout("stream heartbeat", idle_timeout),
                            Some(connected_at.elapsed()),
                        );
                    }
                    if let Err(err) = sink.send_ping().await {
                        break lost(err, Some(connected_at.elapsed()));
                    }
                }
                Some(frame) = control.recv() => {
                    if let Err(err) = sink.send_text(frame).await {
                        break lost(err, Some(connected_at.elapsed()));
                    }
                }
                Some(frame) = outbound.recv() => {
                    if let Err(err) = sink.send_text(frame.clone()).await {
                        *unsent = Some(frame);
                        break lost(err, Some(connected_at.elapsed()));
                    }
                }
            }
        };

        if matches!(end, SessionEnd::Shutdown) {
            if let Err(err) = sink.close().await {
                debug!(error = %err, "stream close frame not sent");
            }
        }
        end
    }

    async fn resubscribe(&self, sink: &mut dyn FrameSink) -> Result<()> {
        let entries = self.registry.snapshot();
        for entry in &entries {
            sink.send_text(subscribe_frame(entry.channel(), entry.params()))
                .await?;
        }
        if !entries.is_empty() {
            info!(count = entries.len(), "stream subscriptions sent");
        }
        Ok(())
    }

    async fn dispatch(&self, raw: &str) {
        Counters::bump(&self.counters.frames_received);

        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                Counters::bump(&self.counters.decode_failures);
                log_parse_failure_once(raw, &err);
                return;
            }
        };
        if envelope.channel.is_empty() {
            log_other_once(raw);
            return;
        }

        let entries = self.registry.matching(&envelope.channel);
        if entries.is_empty() {
            log_unrouted_once(&envelope.channel);
            return;
        }

        if let Some(sequence) = envelope.sequence_number {
            let mut reported: Option<Gap> = None;
            for entry in &entries {
                let Some(gap) = entry.observe_sequence(&envelope.channel, sequence) else {
                    continue;
                };
                if reported != Some(gap) {
                    reported = Some(gap);
                    self.report_gap(&envelope.channel, gap).await;
                }
            }
        }

        for entry in &entries {
            self.deliver(entry, &envelope).await;
        }
    }

    async fn report_gap(&self, channel: &str, gap: Gap) {
        Counters::bump(&self.counters.gaps_detected);
        warn!(
            channel,
            expected = gap.expected,
            received = gap.actual,
            "stream sequence gap"
        );

        let Some(callback) = self.gap_handler.read().clone() else {
            return;
        };
        let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| {
            callback(channel.to_string(), gap.expected, gap.actual)
        }));
        let outcome = match invoked {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(channel, error = %err, "gap callback failed"),
            Err(panic) => error!(channel, panic = %panic_message(&panic), "gap callback panicked"),
        }
    }

    async fn deliver(&self, entry: &Entry, envelope: &Envelope) {
        if !entry.is_active() {
            return;
        }
        let channel = envelope.channel.as_str();

        let prepared = std::panic::catch_unwind(AssertUnwindSafe(|| entry.prepare(&envelope.payload)));
        let future = match prepared {
            Ok(Ok(future)) => future,
            Ok(Err(source)) => {
                Counters::bump(&self.counters.decode_failures);
                let err = GrvtError::Deserialization {
                    channel: channel.to_string(),
                    source,
                };
                warn!(
                    subscription = entry.channel(),
                    payload_type = entry.type_name(),
                    error = %err,
                    "dropping undecodable stream payload"
                );
                return;
            }
            Err(panic) => {
                Counters::bump(&self.counters.handler_failures);
                error!(channel, panic = %panic_message(&panic), "stream handler panicked");
                return;
            }
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => Counters::bump(&self.counters.messages_dispatched),
            Ok(Err(source)) => {
                Counters::bump(&self.counters.handler_failures);
                let err = GrvtError::Handler {
                    channel: channel.to_string(),
                    message: source.to_string(),
                };
                error!(subscription = entry.channel(), error = %err, "stream handler failed");
            }
            Err(panic) => {
                Counters::bump(&self.counters.handler_failures);
                error!(channel, panic = %panic_message(&panic), "stream handler panicked");
            }
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_parse_failure_once(raw: &str, err: &serde_json::Error) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= PARSE_FAIL_LOG_LIMIT {
        return;
    }
    let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
    warn!(
        sample_index = count + 1,
        sample_limit = PARSE_FAIL_LOG_LIMIT,
        error = %err,
        raw = %preview,
        "stream frame is not json"
    );
}

fn log_other_once(raw: &str) {
    let count = OTHER_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= OTHER_LOG_LIMIT {
        return;
    }
    let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
    debug!(
        sample_index = count + 1,
        sample_limit = OTHER_LOG_LIMIT,
        raw = %preview,
        "stream frame without channel"
    );
}

fn log_unrouted_once(channel: &str) {
    let count = UNROUTED_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= UNROUTED_LOG_LIMIT {
        return;
    }
    debug!(
        sample_index = count + 1,
        sample_limit = UNROUTED_LOG_LIMIT,
        channel,
        "no subscriber for stream channel"
    );
}
