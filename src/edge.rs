//! Edge node publishing.
//!
//! [`EdgeClient`] wraps a [`TahuClient`] with the edge side of the Sparkplug
//! session: it owns the node's `bdSeq` and `seq` counters, stamps every
//! outgoing payload, and publishes on the right topics. [`PeriodicPublisher`]
//! drives recurring DDATA publishes from a [`DataSimulator`] collaborator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rumqttc::QoS;
use tracing::{debug, error, info};

use crate::client::TahuClient;
use crate::error::Result;
use crate::payload::SparkplugBPayloadEncoder;
use crate::topic::{MessageType, ParsedTopic};
use crate::types::{
    DeviceDescriptor, EdgeNodeDescriptor, Metric, MetricDataType, MetricValue, SparkplugBPayload,
    BDSEQ_METRIC_NAME,
};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

struct EdgeCounters {
    bd_seq: u8,
    seq: u8,
}

/// The edge side of a Sparkplug session.
///
/// Handles the lifecycle of an edge node: NBIRTH on (re)connect, NDATA for
/// updates, NDEATH on teardown, DBIRTH/DDATA/DDEATH for attached devices,
/// with automatic `seq` management and `bdSeq` pairing.
pub struct EdgeClient {
    client: TahuClient,
    descriptor: EdgeNodeDescriptor,
    encoder: SparkplugBPayloadEncoder,
    counters: Mutex<EdgeCounters>,
}

impl EdgeClient {
    /// Creates an edge client publishing through the given MQTT session.
    pub fn new(client: TahuClient, descriptor: EdgeNodeDescriptor) -> Self {
        Self {
            client,
            descriptor,
            encoder: SparkplugBPayloadEncoder::new(),
            counters: Mutex::new(EdgeCounters { bd_seq: 0, seq: 0 }),
        }
    }

    /// The edge node this client publishes as.
    pub fn descriptor(&self) -> &EdgeNodeDescriptor {
        &self.descriptor
    }

    /// The underlying MQTT session.
    pub fn client(&self) -> &TahuClient {
        &self.client
    }

    /// The current message sequence number (the next one to be used).
    pub fn seq(&self) -> u8 {
        self.lock_counters().seq
    }

    /// The current birth/death sequence number.
    pub fn bd_seq(&self) -> u8 {
        self.lock_counters().bd_seq
    }

    /// Builds the NDEATH payload pairing with the next NBIRTH.
    ///
    /// Applications register the encoded form as the LWT on the client
    /// configuration before connecting.
    pub fn death_payload(&self) -> SparkplugBPayload {
        let bd_seq = self.lock_counters().bd_seq;
        let mut payload = SparkplugBPayload::new();
        payload.timestamp = Some(now_millis());
        payload.metrics.push(bdseq_metric(bd_seq));
        payload
    }

    /// Encodes the NDEATH payload for LWT registration.
    pub fn death_payload_bytes(&self) -> Result<Vec<u8>> {
        self.encoder.encode(&self.death_payload())
    }

    /// Publishes an NBIRTH.
    ///
    /// Resets `seq` to 0, stamps the payload with `seq`, timestamp and the
    /// `bdSeq` metric, and publishes at QoS 1.
    pub async fn publish_node_birth(&self, mut payload: SparkplugBPayload) -> Result<()> {
        let bd_seq = {
            let mut counters = self.lock_counters();
            counters.seq = 1;
            counters.bd_seq
        };
        payload.seq = Some(0);
        if payload.timestamp.is_none() {
            payload.timestamp = Some(now_millis());
        }
        payload.metrics.insert(0, bdseq_metric(bd_seq));

        let topic = ParsedTopic::for_node(MessageType::NBirth, &self.descriptor)?;
        info!(node = %self.descriptor, bd_seq, "publishing NBIRTH");
        self.publish(&topic, &payload, QoS::AtLeastOnce).await
    }

    /// Publishes an NDEATH explicitly (normally delivered by the broker as
    /// the LWT) and increments `bdSeq` for the next session.
    pub async fn publish_node_death(&self) -> Result<()> {
        let payload = self.death_payload();
        let topic = ParsedTopic::for_node(MessageType::NDeath, &self.descriptor)?;
        info!(node = %self.descriptor, "publishing NDEATH");
        self.publish(&topic, &payload, QoS::AtLeastOnce).await?;
        let mut counters = self.lock_counters();
        counters.bd_seq = counters.bd_seq.wrapping_add(1);
        Ok(())
    }

    /// Publishes an NDATA with the next sequence number.
    pub async fn publish_node_data(&self, mut payload: SparkplugBPayload) -> Result<()> {
        self.stamp(&mut payload);
        let topic = ParsedTopic::for_node(MessageType::NData, &self.descriptor)?;
        self.publish(&topic, &payload, QoS::AtMostOnce).await
    }

    /// Publishes a DBIRTH for a device of this node.
    pub async fn publish_device_birth(
        &self,
        device_id: &str,
        mut payload: SparkplugBPayload,
    ) -> Result<()> {
        self.stamp(&mut payload);
        let device = DeviceDescriptor::new(self.descriptor.clone(), device_id);
        let topic = ParsedTopic::for_device(MessageType::DBirth, &device)?;
        info!(device = %device, "publishing DBIRTH");
        self.publish(&topic, &payload, QoS::AtLeastOnce).await
    }

    /// Publishes a DDATA for a device of this node.
    pub async fn publish_device_data(
        &self,
        device_id: &str,
        mut payload: SparkplugBPayload,
    ) -> Result<()> {
        self.stamp(&mut payload);
        let device = DeviceDescriptor::new(self.descriptor.clone(), device_id);
        let topic = ParsedTopic::for_device(MessageType::DData, &device)?;
        self.publish(&topic, &payload, QoS::AtMostOnce).await
    }

    /// Publishes a DDEATH for a device of this node.
    pub async fn publish_device_death(&self, device_id: &str) -> Result<()> {
        let mut payload = SparkplugBPayload::new();
        self.stamp(&mut payload);
        let device = DeviceDescriptor::new(self.descriptor.clone(), device_id);
        let topic = ParsedTopic::for_device(MessageType::DDeath, &device)?;
        info!(device = %device, "publishing DDEATH");
        self.publish(&topic, &payload, QoS::AtLeastOnce).await
    }

    /// Starts a new birth/death generation and publishes a fresh NBIRTH.
    ///
    /// Typically called in response to a `Node Control/Rebirth` NCMD.
    pub async fn rebirth(&self, birth_payload: SparkplugBPayload) -> Result<()> {
        {
            let mut counters = self.lock_counters();
            counters.bd_seq = counters.bd_seq.wrapping_add(1);
            counters.seq = 0;
        }
        debug!(node = %self.descriptor, "rebirth requested");
        self.publish_node_birth(birth_payload).await
    }

    async fn publish(
        &self,
        topic: &ParsedTopic,
        payload: &SparkplugBPayload,
        qos: QoS,
    ) -> Result<()> {
        let bytes = self.encoder.encode(payload)?;
        self.client
            .publish(topic.to_topic_string(), bytes, qos, false)
            .await
    }

    /// Applies the next seq and a timestamp to an outgoing payload.
    fn stamp(&self, payload: &mut SparkplugBPayload) {
        let mut counters = self.lock_counters();
        payload.seq = Some(u64::from(counters.seq));
        counters.seq = counters.seq.wrapping_add(1);
        if payload.timestamp.is_none() {
            payload.timestamp = Some(now_millis());
        }
    }

    fn lock_counters(&self) -> MutexGuard<'_, EdgeCounters> {
        match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Supplies payloads for an edge node's periodic publishes.
///
/// Production deployments implement this against real I/O; tests use a
/// simulated source.
pub trait DataSimulator: Send + Sync {
    /// The NBIRTH payload for a node.
    fn node_birth_payload(&self, node: &EdgeNodeDescriptor) -> SparkplugBPayload;

    /// The DBIRTH payload for a device.
    fn device_birth_payload(&self, device: &DeviceDescriptor) -> SparkplugBPayload;

    /// The next DDATA payload for a device.
    fn device_data_payload(&self, device: &DeviceDescriptor) -> SparkplugBPayload;
}

/// Publishes DDATA for a set of devices on a fixed period until shut down.
pub struct PeriodicPublisher {
    period: Duration,
    simulator: Arc<dyn DataSimulator>,
    edge_client: Arc<EdgeClient>,
    devices: Vec<DeviceDescriptor>,
    running: Arc<AtomicBool>,
}

impl PeriodicPublisher {
    /// Creates a periodic publisher.
    pub fn new(
        period: Duration,
        simulator: Arc<dyn DataSimulator>,
        edge_client: Arc<EdgeClient>,
        devices: Vec<DeviceDescriptor>,
    ) -> Self {
        Self {
            period,
            simulator,
            edge_client,
            devices,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Runs the publish loop until [`shutdown`] is called.
    ///
    /// [`shutdown`]: PeriodicPublisher::shutdown
    pub async fn run(&self) {
        while self.running.load(Ordering::Relaxed) {
            tokio::time::sleep(self.period).await;
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            for device in &self.devices {
                let payload = self.simulator.device_data_payload(device);
                if let Err(e) = self
                    .edge_client
                    .publish_device_data(&device.device_id, payload)
                    .await
                {
                    error!(device = %device, "failed periodic publish: {e}");
                }
            }
        }
        debug!("periodic publisher stopped");
    }

    /// Requests a cooperative stop of the publish loop.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn bdseq_metric(bd_seq: u8) -> Metric {
    Metric::new(
        BDSEQ_METRIC_NAME,
        MetricDataType::UInt64,
        MetricValue::UInt64(u64::from(bd_seq)),
    )
}
