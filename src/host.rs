//! Host application message dispatch.
//!
//! [`TahuHostCallback`] is the [`ClientCallback`] a Sparkplug host wires into
//! its [`TahuClient`]s. Arriving Sparkplug messages are routed to one of N
//! single-worker executors keyed by `hash(group/edge)`, so distinct edge
//! nodes proceed in parallel while a single edge node is strictly
//! serialized. With sequence reordering enabled, submission goes through a
//! [`SequenceReorderManager`] first. Decoded events reach the application
//! through [`HostApplicationEventHandler`], and sequence failures trigger a
//! `Node Control/Rebirth` NCMD through [`CommandPublisher`].

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::client::{
    ClientCallback, MqttClientId, MqttMessage, MqttServerName, MqttServerUrl, TahuClient,
};
use crate::error::{Error, Result};
use crate::node::EdgeNodeManager;
use crate::payload::SparkplugBPayloadDecoder;
use crate::reorder::{Ingest, ReorderConfig, SequenceReorderManager};
use crate::topic::{MessageType, ParsedTopic, SPARKPLUG_B_TOPIC_PREFIX, STATE_TOPIC_PREFIX};
use crate::types::{
    DeviceDescriptor, EdgeNodeDescriptor, Metric, MetricDataType, MetricValue, SparkplugBPayload,
    NODE_CONTROL_REBIRTH,
};

/// Default number of shard executors.
pub const DEFAULT_NUM_EXECUTORS: usize = 100;

/// Application-side handler for decoded Sparkplug events.
///
/// All methods default to no-ops so implementors only override what they
/// care about.
#[async_trait]
pub trait HostApplicationEventHandler: Send + Sync {
    /// An edge node came online.
    async fn on_node_birth(&self, _node: &EdgeNodeDescriptor, _payload: &SparkplugBPayload) {}

    /// An edge node published data.
    async fn on_node_data(&self, _node: &EdgeNodeDescriptor, _payload: &SparkplugBPayload) {}

    /// An edge node went offline.
    async fn on_node_death(&self, _node: &EdgeNodeDescriptor, _payload: &SparkplugBPayload) {}

    /// A device came online.
    async fn on_device_birth(&self, _device: &DeviceDescriptor, _payload: &SparkplugBPayload) {}

    /// A device published data.
    async fn on_device_data(&self, _device: &DeviceDescriptor, _payload: &SparkplugBPayload) {}

    /// A device went offline.
    async fn on_device_death(&self, _device: &DeviceDescriptor, _payload: &SparkplugBPayload) {}

    /// A command (NCMD/DCMD) was observed.
    async fn on_command(&self, _topic: &ParsedTopic, _payload: &SparkplugBPayload) {}

    /// A host application STATE message was observed.
    async fn on_state(&self, _host_id: &str, _payload: &[u8]) {}

    /// A sequence check failed for an edge node. The library has already
    /// requested a rebirth when a command publisher is wired in.
    async fn on_sequence_gap(&self, _node: &EdgeNodeDescriptor, _error: &Error) {}
}

/// Emits NCMD/DCMD messages on behalf of the host.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publishes an NCMD to an edge node.
    async fn publish_node_command(
        &self,
        node: &EdgeNodeDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<()>;

    /// Publishes a DCMD to a device.
    async fn publish_device_command(
        &self,
        device: &DeviceDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<()>;
}

/// Configuration for the host dispatcher.
#[derive(Debug, Clone)]
pub struct TahuHostConfig {
    /// Number of single-worker shard executors.
    pub num_executors: usize,
    /// Sequence reordering configuration; `None` disables reordering.
    pub reorder: Option<ReorderConfig>,
}

impl Default for TahuHostConfig {
    fn default() -> Self {
        Self {
            num_executors: DEFAULT_NUM_EXECUTORS,
            reorder: None,
        }
    }
}

type ReorderKey = (MqttServerName, EdgeNodeDescriptor);

enum ShardJob {
    Message {
        server_name: MqttServerName,
        client_id: MqttClientId,
        topic: ParsedTopic,
        message: MqttMessage,
        arrived: Instant,
    },
    Gap {
        server_name: MqttServerName,
        node: EdgeNodeDescriptor,
        error: Error,
    },
}

/// The host-side [`ClientCallback`]: a sharded executor in front of the
/// payload handler.
pub struct TahuHostCallback {
    shards: Vec<mpsc::UnboundedSender<ShardJob>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    clients: Mutex<HashMap<MqttServerName, TahuClient>>,
    handler: Arc<TahuPayloadHandler>,
    reorder: Option<Arc<Mutex<SequenceReorderManager<ReorderKey, ShardJob>>>>,
}

impl TahuHostCallback {
    /// Creates the dispatcher and spawns its shard workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        event_handler: Arc<dyn HostApplicationEventHandler>,
        command_publisher: Arc<dyn CommandPublisher>,
        config: TahuHostConfig,
    ) -> Self {
        let handler = Arc::new(TahuPayloadHandler::new(event_handler, command_publisher));

        let num = config.num_executors.max(1);
        let mut shards = Vec::with_capacity(num);
        let mut tasks = Vec::with_capacity(num + 1);
        for _ in 0..num {
            let (tx, mut rx) = mpsc::unbounded_channel::<ShardJob>();
            let worker_handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    worker_handler.process(job).await;
                }
            }));
            shards.push(tx);
        }

        let reorder = config.reorder.map(|reorder_config| {
            Arc::new(Mutex::new(SequenceReorderManager::new(reorder_config)))
        });

        let callback = Self {
            shards,
            tasks: Mutex::new(tasks),
            clients: Mutex::new(HashMap::new()),
            handler,
            reorder: reorder.clone(),
        };

        if let (Some(manager), Some(reorder_config)) = (reorder, config.reorder) {
            let shards = callback.shards.clone();
            let sweep_interval = (reorder_config.timeout / 2)
                .max(std::time::Duration::from_millis(100));
            let sweep = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(sweep_interval).await;
                    let gaps = {
                        let mut manager = lock(&manager);
                        manager.expire(Instant::now())
                    };
                    for gap in gaps {
                        let (server_name, node) = gap.key;
                        let error = Error::SequenceGap {
                            expected: Some(gap.expected),
                            got: gap.got,
                        };
                        let index = shard_index(&node, shards.len());
                        let _ = shards[index].send(ShardJob::Gap {
                            server_name,
                            node,
                            error,
                        });
                    }
                }
            });
            lock(&callback.tasks).push(sweep);
        }

        callback
    }

    /// Registers the clients this host listens through, keyed by server name.
    pub fn set_clients(&self, clients: HashMap<MqttServerName, TahuClient>) {
        *lock(&self.clients) = clients;
    }

    /// The edge-node state tracked by this host.
    pub fn node_manager(&self) -> &EdgeNodeManager {
        &self.handler.nodes
    }

    /// Stops all shard workers.
    pub fn stop(&self) {
        info!("shutting down host dispatcher");
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }

    fn dispatch(&self, job: ShardJob, node: &EdgeNodeDescriptor) {
        let index = shard_index(node, self.shards.len());
        trace!(node = %node, shard = index, "submitting to shard executor");
        if self.shards[index].send(job).is_err() {
            error!(node = %node, "shard executor is gone; dropping message");
        }
    }
}

#[async_trait]
impl ClientCallback for TahuHostCallback {
    async fn connect_complete(
        &self,
        reconnect: bool,
        server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        client_id: &MqttClientId,
    ) {
        debug!(server = %server_name, client = %client_id, reconnect, "host client connected");
    }

    async fn connection_lost(
        &self,
        server_name: &MqttServerName,
        server_url: &MqttServerUrl,
        client_id: &MqttClientId,
        reason: &Error,
    ) {
        warn!(server = %server_name, url = %server_url, client = %client_id, "connection lost: {reason}");
        let client = lock(&self.clients).get(server_name).cloned();
        if let Some(client) = client {
            client.clear_connection_count();
            if client.auto_reconnect() {
                if let Err(e) = client.connect() {
                    error!(server = %server_name, "reconnect failed: {e}");
                }
            }
        }
    }

    async fn message_arrived(
        &self,
        server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        client_id: &MqttClientId,
        topic: &str,
        message: MqttMessage,
    ) {
        if lock(&self.clients).get(server_name).is_none() {
            error!(topic, server = %server_name, "message arrived from unknown client");
            return;
        }
        trace!(topic, client = %client_id, "message arrived");

        if topic.starts_with(STATE_TOPIC_PREFIX) {
            if let Ok(parsed @ ParsedTopic::State { .. }) = ParsedTopic::parse(topic) {
                if let Some(host_id) = parsed.host_id() {
                    self.handler
                        .event_handler
                        .on_state(host_id, &message.payload)
                        .await;
                }
            }
            return;
        }

        if !topic.starts_with(SPARKPLUG_B_TOPIC_PREFIX) {
            debug!(topic, "received non-Sparkplug message");
            return;
        }

        let parsed = match ParsedTopic::parse(topic) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(topic, "unparseable Sparkplug topic: {e}");
                return;
            }
        };
        let Some(node) = parsed.edge_node_descriptor() else {
            return;
        };
        let Some(message_type) = parsed.message_type() else {
            return;
        };

        let arrived = Instant::now();
        let job = ShardJob::Message {
            server_name: server_name.clone(),
            client_id: client_id.clone(),
            topic: parsed,
            message,
            arrived,
        };

        match &self.reorder {
            None => self.dispatch(job, &node),
            Some(manager) => {
                let seq = match &job {
                    ShardJob::Message { message, .. } => {
                        SparkplugBPayloadDecoder::peek_seq(&message.payload)
                    }
                    ShardJob::Gap { .. } => None,
                };
                let key = (server_name.clone(), node.clone());
                let outcome = {
                    let mut manager = lock(manager);
                    manager.ingest(&key, message_type, seq, job, arrived)
                };
                match outcome {
                    Ingest::Dispatch(jobs) => {
                        for job in jobs {
                            self.dispatch(job, &node);
                        }
                    }
                    Ingest::Buffered => {}
                    Ingest::Gap { expected, got } => {
                        self.dispatch(
                            ShardJob::Gap {
                                server_name: server_name.clone(),
                                node: node.clone(),
                                error: Error::SequenceGap {
                                    expected: Some(expected),
                                    got,
                                },
                            },
                            &node,
                        );
                    }
                }
            }
        }
    }

    async fn shutdown(&self) {
        self.stop();
    }
}

fn shard_index(node: &EdgeNodeDescriptor, num_shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    node.group_id.hash(&mut hasher);
    "/".hash(&mut hasher);
    node.edge_node_id.hash(&mut hasher);
    (hasher.finish() % num_shards as u64) as usize
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Decodes released payloads, updates session state and invokes the
/// application handler.
pub struct TahuPayloadHandler {
    event_handler: Arc<dyn HostApplicationEventHandler>,
    command_publisher: Arc<dyn CommandPublisher>,
    nodes: EdgeNodeManager,
    decoder: SparkplugBPayloadDecoder,
}

impl TahuPayloadHandler {
    /// Creates a handler.
    pub fn new(
        event_handler: Arc<dyn HostApplicationEventHandler>,
        command_publisher: Arc<dyn CommandPublisher>,
    ) -> Self {
        Self {
            event_handler,
            command_publisher,
            nodes: EdgeNodeManager::new(),
            decoder: SparkplugBPayloadDecoder::new(),
        }
    }

    async fn process(&self, job: ShardJob) {
        match job {
            ShardJob::Message {
                server_name,
                client_id,
                topic,
                message,
                arrived,
            } => {
                if let Err(e) = self
                    .handle_payload(&server_name, &client_id, &topic, &message)
                    .await
                {
                    error!(topic = %topic, "failed to handle Sparkplug message: {e}");
                }
                trace!(
                    latency_us = arrived.elapsed().as_micros() as u64,
                    "message processed"
                );
            }
            ShardJob::Gap {
                server_name,
                node,
                error,
            } => {
                self.handle_gap(&server_name, &node, &error).await;
            }
        }
    }

    /// Decodes one released message and runs it through the session state
    /// machine and the application handler.
    pub async fn handle_payload(
        &self,
        server_name: &MqttServerName,
        client_id: &MqttClientId,
        topic: &ParsedTopic,
        message: &MqttMessage,
    ) -> Result<()> {
        let (Some(message_type), Some(descriptor)) =
            (topic.message_type(), topic.edge_node_descriptor())
        else {
            return Ok(());
        };

        let payload = match self.decoder.decode(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                // Undecodable payloads are dropped; the seq chain is now
                // suspect, so ask the node to start over.
                error!(topic = %topic, "dropping undecodable payload: {e}");
                self.request_rebirth(&descriptor).await;
                return Ok(());
            }
        };

        let node = self.nodes.get_or_insert(&descriptor, server_name, client_id);

        match message_type {
            MessageType::NBirth => {
                node.set_online(payload.timestamp, payload.bd_seq(), payload.seq)?;
                self.event_handler.on_node_birth(&descriptor, &payload).await;
            }
            MessageType::NDeath => {
                if node.set_offline(payload.timestamp, payload.bd_seq())? {
                    self.event_handler.on_node_death(&descriptor, &payload).await;
                }
            }
            MessageType::NData => {
                if let Err(e) = self.check_seq(&node, payload.seq, true) {
                    self.report_gap(&descriptor, &e).await;
                    return Ok(());
                }
                self.event_handler.on_node_data(&descriptor, &payload).await;
            }
            MessageType::DBirth => {
                if let Err(e) = self.check_seq(&node, payload.seq, true) {
                    self.report_gap(&descriptor, &e).await;
                    return Ok(());
                }
                if let Some(device) = topic.device_descriptor() {
                    node.device_online(&device.device_id, payload.timestamp);
                    self.event_handler.on_device_birth(&device, &payload).await;
                }
            }
            MessageType::DData => {
                if let Err(e) = self.check_seq(&node, payload.seq, true) {
                    self.report_gap(&descriptor, &e).await;
                    return Ok(());
                }
                if let Some(device) = topic.device_descriptor() {
                    self.event_handler.on_device_data(&device, &payload).await;
                }
            }
            MessageType::DDeath => {
                if let Err(e) = self.check_seq(&node, payload.seq, false) {
                    self.report_gap(&descriptor, &e).await;
                    return Ok(());
                }
                if let Some(device) = topic.device_descriptor() {
                    node.device_offline(&device.device_id, payload.timestamp);
                    self.event_handler.on_device_death(&device, &payload).await;
                }
            }
            MessageType::NCmd | MessageType::DCmd => {
                // Commands sit in the same seq chain as data messages; only
                // DDEATH is exempt from carrying one.
                if let Err(e) = self.check_seq(&node, payload.seq, true) {
                    self.report_gap(&descriptor, &e).await;
                    return Ok(());
                }
                self.event_handler.on_command(topic, &payload).await;
            }
            MessageType::State => {}
        }

        Ok(())
    }

    /// Runs the seq check; `required` controls whether a missing seq fails.
    fn check_seq(
        &self,
        node: &crate::node::SparkplugEdgeNode,
        seq: Option<u64>,
        required: bool,
    ) -> Result<()> {
        match seq {
            Some(seq) => node.advance(seq),
            None if required => Err(Error::InvalidArgument(
                "message is missing its seq number".to_string(),
            )),
            None => Ok(()),
        }
    }

    async fn report_gap(&self, descriptor: &EdgeNodeDescriptor, error: &Error) {
        warn!(node = %descriptor, "sequence check failed: {error}");
        self.event_handler.on_sequence_gap(descriptor, error).await;
        self.request_rebirth(descriptor).await;
    }

    async fn handle_gap(&self, _server_name: &MqttServerName, node: &EdgeNodeDescriptor, error: &Error) {
        self.report_gap(node, error).await;
    }

    /// Publishes a `Node Control/Rebirth` NCMD for the node.
    async fn request_rebirth(&self, descriptor: &EdgeNodeDescriptor) {
        let mut payload = SparkplugBPayload::new();
        payload.metrics.push(Metric::new(
            NODE_CONTROL_REBIRTH,
            MetricDataType::Boolean,
            MetricValue::Boolean(true),
        ));
        if let Err(e) = self
            .command_publisher
            .publish_node_command(descriptor, payload)
            .await
        {
            error!(node = %descriptor, "failed to request rebirth: {e}");
        }
    }
}
