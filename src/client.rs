//! The Sparkplug MQTT client supervisor.
//!
//! [`TahuClient`] owns one logical MQTT session: a supervisor task that
//! drives the connection (with retry and jitter), a connection monitor that
//! detects unsolicited disconnects, a subscription registry replayed on every
//! (re)connect, and the BIRTH/LWT lifecycle messages. The underlying
//! transport is a `rumqttc` async client; all public operations are explicit
//! `Result`s and all background loops observe a cancellation token.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use rand::Rng;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, LastWill, MqttOptions, Packet, QoS, SubscribeFilter,
    SubscribeReasonCode,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// How long the supervisor sleeps between failed connect attempts by default.
pub const DEFAULT_CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Tick interval of the connection monitor.
pub const DEFAULT_CONNECT_MONITOR_INTERVAL: Duration = Duration::from_millis(10_000);

/// Consecutive monitor ticks without a connection before it is reported lost.
const MONITOR_LOST_TICKS: u32 = 5;

/// Poll interval while waiting for LWT delivery confirmation.
const LWT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A logical name for an MQTT server, used as a registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MqttServerName(String);

impl MqttServerName {
    /// Wraps a server name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MqttServerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An MQTT broker URL such as `tcp://localhost:1883`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MqttServerUrl(String);

impl MqttServerUrl {
    /// Wraps a broker URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the URL into host and port, validating the scheme.
    pub fn host_and_port(&self) -> Result<(String, u16)> {
        let rest = self
            .0
            .strip_prefix("tcp://")
            .or_else(|| self.0.strip_prefix("mqtt://"))
            .unwrap_or(&self.0);
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
            Error::InvalidArgument(format!("MQTT server URL '{}' has no port", self.0))
        })?;
        if host.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "MQTT server URL '{}' has no host",
                self.0
            )));
        }
        let port = port.parse::<u16>().map_err(|_| {
            Error::InvalidArgument(format!("MQTT server URL '{}' has a bad port", self.0))
        })?;
        Ok((host.to_string(), port))
    }
}

impl std::fmt::Display for MqttServerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique MQTT client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MqttClientId(String);

impl MqttClientId {
    /// Wraps a client id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MqttClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from the broker.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Quality of service the message arrived with.
    pub qos: QoS,
    /// Whether the broker flagged the message as retained.
    pub retain: bool,
}

/// Callbacks a client owner provides to observe the session.
#[async_trait]
pub trait ClientCallback: Send + Sync {
    /// Invoked after every successful (re)connect, before subscription replay.
    async fn connect_complete(
        &self,
        reconnect: bool,
        server_name: &MqttServerName,
        server_url: &MqttServerUrl,
        client_id: &MqttClientId,
    );

    /// Invoked when the connection is lost, solicited or not.
    async fn connection_lost(
        &self,
        server_name: &MqttServerName,
        server_url: &MqttServerUrl,
        client_id: &MqttClientId,
        reason: &Error,
    );

    /// Invoked for every message arriving on a subscribed topic.
    async fn message_arrived(
        &self,
        server_name: &MqttServerName,
        server_url: &MqttServerUrl,
        client_id: &MqttClientId,
        topic: &str,
        message: MqttMessage,
    );

    /// Invoked when the owning component shuts down.
    async fn shutdown(&self);
}

/// A BIRTH message published after every (re)connect.
#[derive(Debug, Clone)]
pub struct BirthMessage {
    /// Topic to publish on.
    pub topic: String,
    /// Encoded payload.
    pub payload: Vec<u8>,
    /// Whether the broker should retain it.
    pub retain: bool,
}

/// The Last-Will-and-Testament registered with the broker, also published
/// explicitly on graceful disconnect.
#[derive(Debug, Clone)]
pub struct LwtMessage {
    /// Topic to publish on.
    pub topic: String,
    /// Encoded payload.
    pub payload: Vec<u8>,
    /// Quality of service for the explicit publish.
    pub qos: QoS,
    /// Whether the broker should retain it.
    pub retain: bool,
}

/// A bounded random delay applied before connect attempts so that fleets of
/// clients do not reconnect in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RandomStartupDelay {
    /// Lower bound in milliseconds.
    pub low_ms: u64,
    /// Upper bound in milliseconds.
    pub high_ms: u64,
}

impl RandomStartupDelay {
    /// Creates a delay range.
    pub fn new(low_ms: u64, high_ms: u64) -> Self {
        Self { low_ms, high_ms }
    }

    /// Picks a delay from the range.
    pub fn pick(&self) -> Duration {
        if self.high_ms <= self.low_ms {
            return Duration::from_millis(self.low_ms);
        }
        let ms = rand::thread_rng().gen_range(self.low_ms..=self.high_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration for a [`TahuClient`].
#[derive(Debug, Clone)]
pub struct TahuClientConfig {
    /// Logical server name, used as the registry key on the host side.
    pub server_name: MqttServerName,
    /// Broker URL.
    pub server_url: MqttServerUrl,
    /// MQTT client id.
    pub client_id: MqttClientId,
    /// Optional username.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// MQTT clean-session flag.
    pub clean_session: bool,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// Maximum number of in-flight messages.
    pub max_inflight: u16,
    /// TCP/MQTT connect timeout for a single attempt.
    pub connect_timeout: Duration,
    /// Whether to keep retrying after failures and reconnect after losses.
    pub auto_reconnect: bool,
    /// Sleep between failed connect attempts.
    pub connect_retry_interval: Duration,
    /// Optional random jitter before connecting.
    pub random_startup_delay: Option<RandomStartupDelay>,
    /// Optional BIRTH published after every (re)connect.
    pub birth: Option<BirthMessage>,
    /// Optional LWT registered on the connection.
    pub lwt: Option<LwtMessage>,
}

impl TahuClientConfig {
    /// Creates a configuration with the defaults used throughout: clean
    /// session, 30 s keep-alive, 10 in-flight messages, auto-reconnect with a
    /// 1 s retry interval.
    pub fn new(
        server_name: MqttServerName,
        server_url: MqttServerUrl,
        client_id: MqttClientId,
    ) -> Self {
        Self {
            server_name,
            server_url,
            client_id,
            username: None,
            password: None,
            clean_session: true,
            keep_alive: Duration::from_secs(30),
            max_inflight: 10,
            connect_timeout: Duration::from_secs(30),
            auto_reconnect: true,
            connect_retry_interval: DEFAULT_CONNECT_RETRY_INTERVAL,
            random_startup_delay: None,
            birth: None,
            lwt: None,
        }
    }

    /// Sets credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the BIRTH message.
    pub fn with_birth(mut self, birth: BirthMessage) -> Self {
        self.birth = Some(birth);
        self
    }

    /// Sets the LWT message.
    pub fn with_lwt(mut self, lwt: LwtMessage) -> Self {
        self.lwt = Some(lwt);
        self
    }

    /// Enables or disables auto-reconnect.
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Sets the random startup delay range.
    pub fn with_random_startup_delay(mut self, delay: RandomStartupDelay) -> Self {
        self.random_startup_delay = Some(delay);
        self
    }
}

/// Connection state of a [`TahuClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No session and no supervisor running.
    Idle,
    /// The supervisor is attempting to connect.
    Connecting,
    /// A live broker session exists.
    Connected,
    /// A graceful teardown is in progress.
    Disconnecting,
}

struct PendingSubscribe {
    requested: Vec<QoS>,
    notify: Option<oneshot::Sender<Result<()>>>,
    // Set on the reconnect replay batch: BIRTH goes out only after this
    // SubAck validates, and a grant mismatch force-disconnects.
    replay: bool,
}

struct Inner {
    state: ClientState,
    handle: Option<AsyncClient>,
    subscriptions: BTreeMap<String, QoS>,
    pending_subacks: VecDeque<PendingSubscribe>,
    lwt_pending: bool,
    lwt_delivered: bool,
    supervisor_cancel: Option<CancellationToken>,
    supervisor: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Timeline {
    connect_time: Option<Instant>,
    disconnect_time: Option<Instant>,
    online_date: Option<SystemTime>,
    offline_date: Option<SystemTime>,
    total_uptime: Duration,
    total_downtime: Duration,
}

struct Stats {
    connection_count: AtomicU32,
    msgs_arrived: AtomicU64,
    last_msgs_arrived: AtomicU64,
    timeline: Mutex<Timeline>,
}

struct Shared {
    config: TahuClientConfig,
    callback: Arc<dyn ClientCallback>,
    inner: Mutex<Inner>,
    stats: Stats,
}

/// One logical MQTT session with supervised connect/retry, subscription
/// replay, lifecycle messages and availability accounting.
///
/// The client is cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct TahuClient {
    shared: Arc<Shared>,
}

impl TahuClient {
    /// Creates a client. No connection is attempted until [`connect`].
    ///
    /// [`connect`]: TahuClient::connect
    pub fn new(config: TahuClientConfig, callback: Arc<dyn ClientCallback>) -> Self {
        let mut timeline = Timeline::default();
        timeline.disconnect_time = Some(Instant::now());
        timeline.offline_date = Some(SystemTime::now());
        Self {
            shared: Arc::new(Shared {
                config,
                callback,
                inner: Mutex::new(Inner {
                    state: ClientState::Idle,
                    handle: None,
                    subscriptions: BTreeMap::new(),
                    pending_subacks: VecDeque::new(),
                    lwt_pending: false,
                    lwt_delivered: false,
                    supervisor_cancel: None,
                    supervisor: None,
                    monitor: None,
                }),
                stats: Stats {
                    connection_count: AtomicU32::new(0),
                    msgs_arrived: AtomicU64::new(0),
                    last_msgs_arrived: AtomicU64::new(0),
                    timeline: Mutex::new(timeline),
                },
            }),
        }
    }

    /// The logical server name this client talks to.
    pub fn server_name(&self) -> &MqttServerName {
        &self.shared.config.server_name
    }

    /// The broker URL this client talks to.
    pub fn server_url(&self) -> &MqttServerUrl {
        &self.shared.config.server_url
    }

    /// The MQTT client id.
    pub fn client_id(&self) -> &MqttClientId {
        &self.shared.config.client_id
    }

    /// Whether the client reconnects on its own after losses.
    pub fn auto_reconnect(&self) -> bool {
        self.shared.config.auto_reconnect
    }

    /// The current connection state.
    pub fn state(&self) -> ClientState {
        lock(&self.shared.inner).state
    }

    /// Returns true when a live broker session exists.
    pub fn is_connected(&self) -> bool {
        let inner = lock(&self.shared.inner);
        inner.state == ClientState::Connected && inner.handle.is_some()
    }

    /// Starts the connect supervisor.
    ///
    /// Validates the broker URL, then spawns a task that applies the optional
    /// startup jitter and drives connect attempts, sleeping the configured
    /// retry interval between failures while `auto_reconnect` is set. Calling
    /// this while a supervisor is already running is a no-op.
    pub fn connect(&self) -> Result<()> {
        let (host, port) = self.shared.config.server_url.host_and_port().map_err(|e| {
            error!(url = %self.shared.config.server_url, "invalid MQTT server URL");
            e
        })?;

        let mut inner = lock(&self.shared.inner);
        if matches!(inner.state, ClientState::Connecting | ClientState::Connected) {
            debug!(client = %self.shared.config.client_id, "connect attempt already in progress");
            return Ok(());
        }
        inner.state = ClientState::Connecting;
        let cancel = CancellationToken::new();
        inner.supervisor_cancel = Some(cancel.clone());

        let shared = self.shared.clone();
        inner.supervisor = Some(tokio::spawn(async move {
            run_supervisor(shared, cancel, host, port).await;
        }));
        Ok(())
    }

    /// Gracefully tears the session down.
    ///
    /// If connected and `publish_lwt` is set, publishes the configured LWT
    /// first; with `wait_for_lwt` the call polls every 250 ms, up to
    /// `keep_alive x 4` iterations, for delivery confirmation. The connect
    /// supervisor and monitor are then cancelled, an MQTT DISCONNECT is sent
    /// when `send_disconnect` is set, and the client handle is released.
    pub async fn disconnect(
        &self,
        quiesce: Duration,
        _timeout: Duration,
        send_disconnect: bool,
        publish_lwt: bool,
        wait_for_lwt: bool,
    ) -> Result<()> {
        let (handle, was_connected, monitor) = {
            let mut inner = lock(&self.shared.inner);
            let was_connected = inner.state == ClientState::Connected;
            inner.state = ClientState::Disconnecting;
            (inner.handle.clone(), was_connected, inner.monitor.take())
        };
        if let Some(monitor) = monitor {
            monitor.abort();
        }

        if let (Some(handle), Some(lwt), true, true) =
            (&handle, &self.shared.config.lwt, was_connected, publish_lwt)
        {
            info!(
                client = %self.shared.config.client_id,
                topic = %lwt.topic,
                "publishing LWT before disconnect"
            );
            {
                let mut inner = lock(&self.shared.inner);
                inner.lwt_pending = true;
                inner.lwt_delivered = lwt.qos == QoS::AtMostOnce;
            }
            handle
                .publish(lwt.topic.clone(), lwt.qos, lwt.retain, lwt.payload.clone())
                .await?;

            if wait_for_lwt && !self.wait_for_lwt_delivery().await {
                warn!(client = %self.shared.config.client_id, "LWT delivery confirmation - timeout");
            }
        }

        if let Some(handle) = &handle {
            if send_disconnect {
                let _ = handle.disconnect().await;
            }
            if !quiesce.is_zero() {
                tokio::time::sleep(quiesce).await;
            }
        }

        let (cancel, supervisor) = {
            let mut inner = lock(&self.shared.inner);
            inner.handle = None;
            inner.lwt_pending = false;
            inner.pending_subacks.clear();
            inner.state = ClientState::Idle;
            (inner.supervisor_cancel.take(), inner.supervisor.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }

        record_offline(&self.shared.stats);
        Ok(())
    }

    async fn wait_for_lwt_delivery(&self) -> bool {
        let iterations = self.shared.config.keep_alive.as_secs().max(1) * 4;
        for _ in 0..iterations {
            if lock(&self.shared.inner).lwt_delivered {
                info!("LWT delivery confirmation - done waiting");
                return true;
            }
            tokio::time::sleep(LWT_POLL_INTERVAL).await;
        }
        false
    }

    /// Subscribes to a topic.
    ///
    /// The registry is updated regardless of connection state so the
    /// subscription is replayed on every (re)connect. While connected, the
    /// subscription is additionally sent to the broker and the call blocks
    /// until the broker acknowledges it; a granted QoS different from the
    /// requested one fails with [`Error::NotAuthorized`].
    pub async fn subscribe(&self, topic: impl Into<String>, qos: QoS) -> Result<()> {
        let topic = topic.into();
        let (handle, rx) = {
            let mut inner = lock(&self.shared.inner);
            inner.subscriptions.insert(topic.clone(), qos);
            if inner.state != ClientState::Connected {
                debug!(topic = %topic, "not connected - storing the subscription for now");
                return Ok(());
            }
            let Some(handle) = inner.handle.clone() else {
                return Ok(());
            };
            let (tx, rx) = oneshot::channel();
            inner.pending_subacks.push_back(PendingSubscribe {
                requested: vec![qos],
                notify: Some(tx),
                replay: false,
            });
            (handle, rx)
        };

        handle.subscribe(topic.clone(), qos).await?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Internal(format!(
                "subscription to {} was dropped before acknowledgement",
                topic
            ))),
        }
    }

    /// Unsubscribes from a topic, updating the registry regardless of
    /// connection state.
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let handle = {
            let mut inner = lock(&self.shared.inner);
            inner.subscriptions.remove(topic);
            if inner.state != ClientState::Connected {
                return Ok(());
            }
            inner.handle.clone()
        };
        if let Some(handle) = handle {
            handle.unsubscribe(topic).await?;
        }
        Ok(())
    }

    /// Returns a snapshot of the subscription registry in replay order.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        lock(&self.shared.inner)
            .subscriptions
            .iter()
            .map(|(t, q)| (t.clone(), *q))
            .collect()
    }

    /// Publishes a message, failing with [`Error::NotConnected`] when no live
    /// session exists.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: Vec<u8>,
        qos: QoS,
        retained: bool,
    ) -> Result<()> {
        let topic = topic.into();
        let handle = {
            let inner = lock(&self.shared.inner);
            if inner.state != ClientState::Connected {
                return Err(Error::NotConnected {
                    client_id: self.shared.config.client_id.to_string(),
                });
            }
            inner.handle.clone().ok_or_else(|| Error::NotConnected {
                client_id: self.shared.config.client_id.to_string(),
            })?
        };
        debug!(
            client = %self.shared.config.client_id,
            topic = %topic,
            size = payload.len(),
            "publishing"
        );
        handle.publish(topic, qos, retained, payload).await?;
        Ok(())
    }

    /// Publishes from a background task, retrying while disconnected.
    ///
    /// Each attempt publishes if the client is currently connected, otherwise
    /// sleeps `retry_delay`; after `num_attempts` attempts the task resolves
    /// with an error. The returned handle can be awaited or dropped.
    pub fn async_publish(
        &self,
        topic: impl Into<String>,
        payload: Vec<u8>,
        qos: QoS,
        retained: bool,
        retry_delay: Duration,
        num_attempts: u32,
    ) -> JoinHandle<Result<()>> {
        let client = self.clone();
        let topic = topic.into();
        tokio::spawn(async move {
            for _ in 0..num_attempts.max(1) {
                if client.is_connected() {
                    match client
                        .publish(topic.clone(), payload.clone(), qos, retained)
                        .await
                    {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            debug!(topic = %topic, "async publish attempt failed: {e}");
                        }
                    }
                }
                tokio::time::sleep(retry_delay).await;
            }
            error!(topic = %topic, attempts = num_attempts, "failed to publish after all attempts");
            Err(Error::Timeout(format!(
                "failed to publish on {} after {} attempts",
                topic, num_attempts
            )))
        })
    }

    // ===== Accounting =====

    /// Number of messages arrived since the counter was last cleared.
    pub fn num_msgs_arrived(&self) -> u64 {
        self.shared.stats.msgs_arrived.load(Ordering::Relaxed)
    }

    /// Number of messages arrived since this method was last called.
    pub fn msgs_arrived_delta(&self) -> u64 {
        let current = self.shared.stats.msgs_arrived.load(Ordering::Relaxed);
        let last = self
            .shared
            .stats
            .last_msgs_arrived
            .swap(current, Ordering::Relaxed);
        current.saturating_sub(last)
    }

    /// Clears the arrived-message counters.
    pub fn clear_msgs_arrived(&self) {
        self.shared.stats.msgs_arrived.store(0, Ordering::Relaxed);
        self.shared
            .stats
            .last_msgs_arrived
            .store(0, Ordering::Relaxed);
    }

    /// Number of successful connections over the client's lifetime.
    pub fn connection_count(&self) -> u32 {
        self.shared.stats.connection_count.load(Ordering::Relaxed)
    }

    /// Clears the connection counter.
    pub fn clear_connection_count(&self) {
        self.shared
            .stats
            .connection_count
            .store(0, Ordering::Relaxed);
    }

    /// Wall-clock time when the client last came online.
    pub fn online_date(&self) -> Option<SystemTime> {
        lock(&self.shared.stats.timeline).online_date
    }

    /// Wall-clock time when the client last went offline.
    pub fn offline_date(&self) -> Option<SystemTime> {
        lock(&self.shared.stats.timeline).offline_date
    }

    /// Availability as a percentage: `uptime / (uptime + downtime) * 100`.
    ///
    /// Fails with [`Error::Internal`] before any connect or disconnect has
    /// been observed.
    pub fn availability(&self) -> Result<f64> {
        let timeline = lock(&self.shared.stats.timeline);
        let now = Instant::now();
        let uptime = timeline.total_uptime
            + timeline
                .connect_time
                .map_or(Duration::ZERO, |t| now.duration_since(t));
        let downtime = timeline.total_downtime
            + timeline
                .disconnect_time
                .map_or(Duration::ZERO, |t| now.duration_since(t));
        let total = uptime + downtime;
        if total.is_zero() {
            return Err(Error::Internal("connect time is unknown".to_string()));
        }
        Ok(uptime.as_secs_f64() / total.as_secs_f64() * 100.0)
    }

    /// Resets the availability accumulators.
    pub fn reset_availability(&self) {
        let mut timeline = lock(&self.shared.stats.timeline);
        timeline.total_uptime = Duration::ZERO;
        timeline.total_downtime = Duration::ZERO;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn record_online(stats: &Stats) {
    let mut timeline = lock(&stats.timeline);
    let now = Instant::now();
    if let Some(disconnected_at) = timeline.disconnect_time.take() {
        timeline.total_downtime += now.duration_since(disconnected_at);
    }
    timeline.connect_time = Some(now);
    timeline.online_date = Some(SystemTime::now());
}

fn record_offline(stats: &Stats) {
    let mut timeline = lock(&stats.timeline);
    let now = Instant::now();
    if let Some(connected_at) = timeline.connect_time.take() {
        timeline.total_uptime += now.duration_since(connected_at);
    }
    if timeline.disconnect_time.is_none() {
        timeline.disconnect_time = Some(now);
    }
    timeline.offline_date = Some(SystemTime::now());
}

async fn run_supervisor(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    host: String,
    port: u16,
) {
    let config = &shared.config;

    if let Some(jitter) = &config.random_startup_delay {
        let delay = jitter.pick();
        debug!(delay_ms = delay.as_millis() as u64, "waiting random startup delay");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let mut options = MqttOptions::new(config.client_id.as_str(), host, port);
    options.set_clean_session(config.clean_session);
    options.set_keep_alive(config.keep_alive);
    options.set_inflight(config.max_inflight);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }
    if let Some(lwt) = &config.lwt {
        debug!(topic = %lwt.topic, retain = lwt.retain, "setting WILL");
        options.set_last_will(LastWill::new(
            lwt.topic.clone(),
            lwt.payload.clone(),
            lwt.qos,
            lwt.retain,
        ));
    }

    info!(
        client = %config.client_id,
        url = %config.server_url,
        "creating the MQTT client"
    );
    let (client, mut eventloop) = AsyncClient::new(options, usize::from(config.max_inflight));
    lock(&shared.inner).handle = Some(client.clone());

    loop {
        let connecting = lock(&shared.inner).state == ClientState::Connecting;
        let polled = if connecting {
            // A single attempt is bounded by the connect timeout.
            tokio::select! {
                _ = cancel.cancelled() => return,
                r = tokio::time::timeout(config.connect_timeout, eventloop.poll()) => match r {
                    Ok(inner) => inner,
                    Err(_) => {
                        warn!(client = %config.client_id, "connect attempt timed out");
                        if !sleep_retry(&shared, &cancel).await {
                            return;
                        }
                        continue;
                    }
                },
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return,
                r = eventloop.poll() => r,
            }
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    on_connected(&shared, &client, &cancel).await;
                } else {
                    warn!(client = %config.client_id, code = ?ack.code, "broker refused connection");
                    if !sleep_retry(&shared, &cancel).await {
                        return;
                    }
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                on_suback(&shared, &client, ack.return_codes).await;
            }
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                let mut inner = lock(&shared.inner);
                if inner.lwt_pending {
                    // The LWT is the only tracked in-flight publish once a
                    // graceful disconnect has begun.
                    inner.lwt_pending = false;
                    inner.lwt_delivered = true;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.stats.msgs_arrived.fetch_add(1, Ordering::Relaxed);
                let message = MqttMessage {
                    payload: publish.payload.to_vec(),
                    qos: publish.qos,
                    retain: publish.retain,
                };
                shared
                    .callback
                    .message_arrived(
                        &config.server_name,
                        &config.server_url,
                        &config.client_id,
                        &publish.topic,
                        message,
                    )
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                let was_connected = {
                    let mut inner = lock(&shared.inner);
                    let was = inner.state == ClientState::Connected;
                    if inner.state != ClientState::Disconnecting {
                        inner.state = if config.auto_reconnect {
                            ClientState::Connecting
                        } else {
                            ClientState::Idle
                        };
                    }
                    inner.pending_subacks.clear();
                    was
                };
                if was_connected {
                    record_offline(&shared.stats);
                    let reason = Error::Internal(format!("connection lost: {e}"));
                    warn!(client = %config.client_id, "connection lost: {e}");
                    shared
                        .callback
                        .connection_lost(
                            &config.server_name,
                            &config.server_url,
                            &config.client_id,
                            &reason,
                        )
                        .await;
                } else {
                    debug!(
                        client = %config.client_id,
                        retry_ms = config.connect_retry_interval.as_millis() as u64,
                        "unable to connect: {e}"
                    );
                }
                if !sleep_retry(&shared, &cancel).await {
                    return;
                }
            }
        }
    }
}

/// Sleeps the retry interval; returns false when the supervisor should exit.
async fn sleep_retry(shared: &Arc<Shared>, cancel: &CancellationToken) -> bool {
    if !shared.config.auto_reconnect {
        // Terminal exit: the loss has already been reported, so the monitor
        // must not outlive the supervisor and report it a second time.
        let monitor = {
            let mut inner = lock(&shared.inner);
            inner.state = ClientState::Idle;
            inner.monitor.take()
        };
        if let Some(monitor) = monitor {
            monitor.abort();
        }
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(shared.config.connect_retry_interval) => true,
    }
}

async fn on_connected(shared: &Arc<Shared>, client: &AsyncClient, cancel: &CancellationToken) {
    let config = &shared.config;
    let reconnect = shared.stats.connection_count.load(Ordering::Relaxed) > 0;
    shared
        .stats
        .connection_count
        .fetch_add(1, Ordering::Relaxed);
    record_online(&shared.stats);

    let replay: Vec<(String, QoS)> = {
        let mut inner = lock(&shared.inner);
        inner.state = ClientState::Connected;
        if inner.monitor.is_none() {
            let monitor_shared = shared.clone();
            let monitor_cancel = cancel.child_token();
            inner.monitor = Some(tokio::spawn(async move {
                run_monitor(monitor_shared, monitor_cancel).await;
            }));
        }
        inner
            .subscriptions
            .iter()
            .map(|(t, q)| (t.clone(), *q))
            .collect()
    };

    info!(client = %config.client_id, url = %config.server_url, reconnect, "connected");
    shared
        .callback
        .connect_complete(
            reconnect,
            &config.server_name,
            &config.server_url,
            &config.client_id,
        )
        .await;

    // Re-subscribe as one batch, before any BIRTH publish, so subscribers
    // never miss messages between connect and subscribe.
    if !replay.is_empty() {
        let requested: Vec<QoS> = replay.iter().map(|(_, q)| *q).collect();
        let filters: Vec<SubscribeFilter> = replay
            .iter()
            .map(|(topic, qos)| SubscribeFilter::new(topic.clone(), *qos))
            .collect();
        debug!(client = %config.client_id, count = filters.len(), "replaying subscriptions");
        lock(&shared.inner)
            .pending_subacks
            .push_back(PendingSubscribe {
                requested,
                notify: None,
                replay: true,
            });
        if let Err(e) = client.subscribe_many(filters).await {
            error!(client = %config.client_id, "failed to replay subscriptions: {e}");
            let _ = client.disconnect().await;
            return;
        }
    } else if let Some(birth) = &config.birth {
        publish_birth(shared, client, birth).await;
    }
}

async fn on_suback(
    shared: &Arc<Shared>,
    client: &AsyncClient,
    return_codes: Vec<SubscribeReasonCode>,
) {
    let pending = lock(&shared.inner).pending_subacks.pop_front();
    let Some(pending) = pending else {
        debug!("unexpected SubAck");
        return;
    };

    let granted_ok = return_codes.len() == pending.requested.len()
        && return_codes
            .iter()
            .zip(&pending.requested)
            .all(|(code, requested)| matches!(code, SubscribeReasonCode::Success(q) if q == requested));

    if granted_ok {
        if let Some(notify) = pending.notify {
            let _ = notify.send(Ok(()));
        }
        if pending.replay {
            if let Some(birth) = &shared.config.birth {
                publish_birth(shared, client, birth).await;
            }
        }
        return;
    }

    error!(
        client = %shared.config.client_id,
        granted = ?return_codes,
        "broker granted different QoS than requested"
    );
    if let Some(notify) = pending.notify {
        let _ = notify.send(Err(Error::NotAuthorized(
            "granted QoS does not match requested QoS".to_string(),
        )));
    }
    if pending.replay {
        // Failed replay grant invalidates the whole session.
        let _ = client.disconnect().await;
    }
}

async fn publish_birth(shared: &Arc<Shared>, client: &AsyncClient, birth: &BirthMessage) {
    debug!(
        client = %shared.config.client_id,
        topic = %birth.topic,
        retain = birth.retain,
        "publishing BIRTH"
    );
    if let Err(e) = client
        .publish(
            birth.topic.clone(),
            QoS::AtLeastOnce,
            birth.retain,
            birth.payload.clone(),
        )
        .await
    {
        error!(client = %shared.config.client_id, "BIRTH publish failed: {e}");
        let _ = client.disconnect().await;
    }
}

async fn run_monitor(shared: Arc<Shared>, cancel: CancellationToken) {
    let config = &shared.config;
    let mut lost_ticks = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(DEFAULT_CONNECT_MONITOR_INTERVAL) => {}
        }

        let state = lock(&shared.inner).state;
        match state {
            ClientState::Connected => lost_ticks = 0,
            ClientState::Connecting => {
                // An attempt is in progress; the supervisor owns recovery.
                lost_ticks = 0;
            }
            ClientState::Disconnecting => lost_ticks = 0,
            ClientState::Idle => lost_ticks += 1,
        }

        if lost_ticks == MONITOR_LOST_TICKS {
            warn!(client = %config.client_id, "uncaught disconnect detected by monitor");
            record_offline(&shared.stats);
            let reason = Error::Internal("uncaught disconnect".to_string());
            shared
                .callback
                .connection_lost(
                    &config.server_name,
                    &config.server_url,
                    &config.client_id,
                    &reason,
                )
                .await;
            if config.auto_reconnect {
                let client = TahuClient {
                    shared: shared.clone(),
                };
                if let Err(e) = client.connect() {
                    error!(client = %config.client_id, "monitor-triggered reconnect failed: {e}");
                }
            }
            lost_ticks = 0;
        }
    }
}
