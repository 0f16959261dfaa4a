//! Sparkplug B edge node example.
//!
//! Connects to a local broker, announces the node with an NBIRTH, publishes a
//! stream of NDATA/DDATA updates and tears down with an NDEATH.
//!
//! Run a broker on localhost:1883, then:
//! `cargo run --example edge_publisher`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sparkplug_mqtt::{
    ClientCallback, EdgeClient, EdgeNodeDescriptor, Error, LwtMessage, MessageType, MqttClientId,
    MqttMessage, MqttServerName, MqttServerUrl, ParsedTopic, PayloadBuilder, QoS, Result,
    TahuClient, TahuClientConfig,
};

struct EdgeCallback;

#[async_trait]
impl ClientCallback for EdgeCallback {
    async fn connect_complete(
        &self,
        reconnect: bool,
        _server_name: &MqttServerName,
        server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
    ) {
        println!("[OK] connected to {server_url} (reconnect: {reconnect})");
    }

    async fn connection_lost(
        &self,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
        reason: &Error,
    ) {
        println!("[!!] connection lost: {reason}");
    }

    async fn message_arrived(
        &self,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
        topic: &str,
        _message: MqttMessage,
    ) {
        println!("[<-] {topic}");
    }

    async fn shutdown(&self) {}
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sparkplug_mqtt=info".into()),
        )
        .init();

    let descriptor = EdgeNodeDescriptor::new("Energy", "Gateway01");

    // The NDEATH topic and payload double as the MQTT Last Will.
    let death_topic = ParsedTopic::for_node(MessageType::NDeath, &descriptor)?.to_topic_string();

    // The will pairs with the first NBIRTH through bdSeq 0.
    let mut will = PayloadBuilder::new();
    will.add_uint64("bdSeq", 0);

    let config = TahuClientConfig::new(
        MqttServerName::new("local-broker"),
        MqttServerUrl::new("tcp://localhost:1883"),
        MqttClientId::new("rust_edge_example"),
    )
    .with_lwt(LwtMessage {
        topic: death_topic,
        payload: will.serialize()?,
        qos: QoS::AtLeastOnce,
        retain: false,
    });

    let client = TahuClient::new(config, Arc::new(EdgeCallback));
    let edge = EdgeClient::new(client.clone(), descriptor);

    client.connect()?;

    // Give the supervisor a moment to establish the session.
    for _ in 0..50 {
        if client.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if !client.is_connected() {
        eprintln!("could not reach the broker on localhost:1883");
        return Ok(());
    }

    // NBIRTH with the full metric set and aliases.
    let mut birth = PayloadBuilder::new();
    birth
        .add_double_with_alias("Temperature", 1, 20.5)
        .add_double_with_alias("Voltage", 2, 230.0)
        .add_bool_with_alias("Active", 3, true)
        .add_int64_with_alias("Uptime", 4, 0)
        .add_string("Properties/Hardware", "x86_64")
        .add_string("Properties/OS", "Linux");
    edge.publish_node_birth(birth.into_payload()).await?;
    println!("[OK] published NBIRTH (bdSeq {})", edge.bd_seq());

    // NDATA updates by alias only (report by exception).
    for i in 0..10i64 {
        let mut data = PayloadBuilder::new();
        data.add_double_by_alias(1, 20.5 + i as f64 * 0.1)
            .add_int64_by_alias(4, i);
        edge.publish_node_data(data.into_payload()).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    println!("[OK] published 10 NDATA messages (seq {})", edge.seq());

    // Device lifecycle.
    let mut device_birth = PayloadBuilder::new();
    device_birth
        .add_double_with_alias("Sensor/Temp", 10, 22.5)
        .add_bool_with_alias("Sensor/Online", 11, true);
    edge.publish_device_birth("Sensor01", device_birth.into_payload())
        .await?;

    let mut device_data = PayloadBuilder::new();
    device_data.add_double_by_alias(10, 23.0);
    edge.publish_device_data("Sensor01", device_data.into_payload())
        .await?;
    edge.publish_device_death("Sensor01").await?;
    println!("[OK] device lifecycle complete");

    // Graceful teardown: explicit NDEATH, then disconnect with LWT delivery.
    edge.publish_node_death().await?;
    client
        .disconnect(Duration::from_millis(100), Duration::ZERO, true, false, false)
        .await?;
    println!("[OK] disconnected");

    Ok(())
}
