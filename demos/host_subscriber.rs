//! Sparkplug B host application example.
//!
//! Subscribes to a group, tracks edge node lifecycles and sequence numbers,
//! and prints every event. Sequence gaps trigger a rebirth request.
//!
//! Run a broker on localhost:1883, then:
//! `cargo run --example host_subscriber`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sparkplug_mqtt::{
    group_wildcard, CommandPublisher, DeviceDescriptor, EdgeNodeDescriptor, Error,
    HostApplicationEventHandler, MessageType, MqttClientId, MqttServerName, MqttServerUrl,
    ParsedTopic, QoS, Result, SparkplugBPayload, SparkplugBPayloadEncoder, TahuClient,
    TahuClientConfig, TahuHostCallback, TahuHostConfig,
};

struct PrintingHandler;

#[async_trait]
impl HostApplicationEventHandler for PrintingHandler {
    async fn on_node_birth(&self, node: &EdgeNodeDescriptor, payload: &SparkplugBPayload) {
        println!(
            "[BIRTH] {node} online, bdSeq {:?}, {} metrics",
            payload.bd_seq(),
            payload.metrics.len()
        );
    }

    async fn on_node_data(&self, node: &EdgeNodeDescriptor, payload: &SparkplugBPayload) {
        println!("[DATA ] {node} seq {:?}", payload.seq);
        for metric in &payload.metrics {
            println!(
                "        {} = {:?}",
                metric.name.as_deref().unwrap_or("<alias>"),
                metric.value
            );
        }
    }

    async fn on_node_death(&self, node: &EdgeNodeDescriptor, payload: &SparkplugBPayload) {
        println!("[DEATH] {node} offline, bdSeq {:?}", payload.bd_seq());
    }

    async fn on_device_birth(&self, device: &DeviceDescriptor, _payload: &SparkplugBPayload) {
        println!("[BIRTH] device {device} online");
    }

    async fn on_device_data(&self, device: &DeviceDescriptor, payload: &SparkplugBPayload) {
        println!("[DATA ] device {device} seq {:?}", payload.seq);
    }

    async fn on_device_death(&self, device: &DeviceDescriptor, _payload: &SparkplugBPayload) {
        println!("[DEATH] device {device} offline");
    }

    async fn on_state(&self, host_id: &str, payload: &[u8]) {
        println!("[STATE] {host_id}: {}", String::from_utf8_lossy(payload));
    }

    async fn on_sequence_gap(&self, node: &EdgeNodeDescriptor, error: &Error) {
        println!("[GAP  ] {node}: {error} - requesting rebirth");
    }
}

/// Publishes NCMD/DCMD through the host's own client.
struct HostCommandPublisher {
    client: TahuClient,
    encoder: SparkplugBPayloadEncoder,
}

#[async_trait]
impl CommandPublisher for HostCommandPublisher {
    async fn publish_node_command(
        &self,
        node: &EdgeNodeDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<()> {
        let topic = ParsedTopic::for_node(MessageType::NCmd, node)?;
        let bytes = self.encoder.encode(&payload)?;
        self.client
            .publish(topic.to_topic_string(), bytes, QoS::AtMostOnce, false)
            .await
    }

    async fn publish_device_command(
        &self,
        device: &DeviceDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<()> {
        let topic = ParsedTopic::for_device(MessageType::DCmd, device)?;
        let bytes = self.encoder.encode(&payload)?;
        self.client
            .publish(topic.to_topic_string(), bytes, QoS::AtMostOnce, false)
            .await
    }
}

/// Wires the circular host callback / client / command publisher trio.
struct LateBoundCommands {
    inner: std::sync::OnceLock<HostCommandPublisher>,
}

#[async_trait]
impl CommandPublisher for LateBoundCommands {
    async fn publish_node_command(
        &self,
        node: &EdgeNodeDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<()> {
        match self.inner.get() {
            Some(commands) => commands.publish_node_command(node, payload).await,
            None => Err(Error::Internal("command publisher not wired yet".into())),
        }
    }

    async fn publish_device_command(
        &self,
        device: &DeviceDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<()> {
        match self.inner.get() {
            Some(commands) => commands.publish_device_command(device, payload).await,
            None => Err(Error::Internal("command publisher not wired yet".into())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sparkplug_mqtt=info".into()),
        )
        .init();

    let commands = Arc::new(LateBoundCommands {
        inner: std::sync::OnceLock::new(),
    });

    let callback = Arc::new(TahuHostCallback::new(
        Arc::new(PrintingHandler),
        commands.clone(),
        TahuHostConfig::default(),
    ));

    let server_name = MqttServerName::new("local-broker");
    let config = TahuClientConfig::new(
        server_name.clone(),
        MqttServerUrl::new("tcp://localhost:1883"),
        MqttClientId::new("rust_host_example"),
    );
    let client = TahuClient::new(config, callback.clone());

    let _ = commands.inner.set(HostCommandPublisher {
        client: client.clone(),
        encoder: SparkplugBPayloadEncoder::new(),
    });
    callback.set_clients(HashMap::from([(server_name, client.clone())]));

    // Subscriptions land in the registry now and are replayed on connect,
    // before any BIRTH traffic can be missed.
    client
        .subscribe(group_wildcard("Energy"), QoS::AtLeastOnce)
        .await?;
    client.subscribe("STATE/+", QoS::AtLeastOnce).await?;

    client.connect()?;
    println!("listening for Sparkplug traffic on group 'Energy' (ctrl-c to quit)");

    loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        if let Ok(availability) = client.availability() {
            println!(
                "[INFO ] availability {:.1}%, {} messages",
                availability,
                client.num_msgs_arrived()
            );
        }
    }
}
