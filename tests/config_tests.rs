//! Tests for client configuration and the subscription registry

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sparkplug_mqtt::{
    BirthMessage, ClientCallback, ClientState, Error, LwtMessage, MqttClientId, MqttMessage,
    MqttServerName, MqttServerUrl, QoS, RandomStartupDelay, TahuClient, TahuClientConfig,
};

struct NullCallback;

#[async_trait]
impl ClientCallback for NullCallback {
    async fn connect_complete(
        &self,
        _reconnect: bool,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
    ) {
    }

    async fn connection_lost(
        &self,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
        _reason: &Error,
    ) {
    }

    async fn message_arrived(
        &self,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
        _topic: &str,
        _message: MqttMessage,
    ) {
    }

    async fn shutdown(&self) {}
}

fn test_config() -> TahuClientConfig {
    TahuClientConfig::new(
        MqttServerName::new("plant-broker"),
        MqttServerUrl::new("tcp://localhost:1883"),
        MqttClientId::new("test-client-1"),
    )
}

fn test_client() -> TahuClient {
    TahuClient::new(test_config(), Arc::new(NullCallback))
}

#[test]
fn test_config_defaults() {
    let config = test_config();
    assert!(config.clean_session);
    assert_eq!(config.keep_alive, Duration::from_secs(30));
    assert_eq!(config.max_inflight, 10);
    assert_eq!(config.connect_timeout, Duration::from_secs(30));
    assert!(config.auto_reconnect);
    assert_eq!(config.connect_retry_interval, Duration::from_millis(1000));
    assert!(config.username.is_none());
    assert!(config.birth.is_none());
    assert!(config.lwt.is_none());
}

#[test]
fn test_config_builders() {
    let config = test_config()
        .with_credentials("operator", "secret")
        .with_auto_reconnect(false)
        .with_random_startup_delay(RandomStartupDelay::new(10, 50))
        .with_birth(BirthMessage {
            topic: "spBv1.0/Energy/NBIRTH/Gateway01".to_string(),
            payload: vec![1, 2, 3],
            retain: false,
        })
        .with_lwt(LwtMessage {
            topic: "spBv1.0/Energy/NDEATH/Gateway01".to_string(),
            payload: vec![4, 5, 6],
            qos: QoS::AtLeastOnce,
            retain: false,
        });

    assert_eq!(config.username.as_deref(), Some("operator"));
    assert_eq!(config.password.as_deref(), Some("secret"));
    assert!(!config.auto_reconnect);
    assert!(config.random_startup_delay.is_some());
    assert_eq!(config.birth.as_ref().unwrap().payload, vec![1, 2, 3]);
    assert_eq!(config.lwt.as_ref().unwrap().qos, QoS::AtLeastOnce);
}

#[test]
fn test_server_url_parsing() {
    let (host, port) = MqttServerUrl::new("tcp://broker.example.com:8883")
        .host_and_port()
        .unwrap();
    assert_eq!(host, "broker.example.com");
    assert_eq!(port, 8883);

    let (host, port) = MqttServerUrl::new("mqtt://localhost:1883")
        .host_and_port()
        .unwrap();
    assert_eq!(host, "localhost");
    assert_eq!(port, 1883);

    let (host, port) = MqttServerUrl::new("localhost:1883").host_and_port().unwrap();
    assert_eq!(host, "localhost");
    assert_eq!(port, 1883);

    assert!(MqttServerUrl::new("tcp://no-port").host_and_port().is_err());
    assert!(MqttServerUrl::new("tcp://:1883").host_and_port().is_err());
    assert!(MqttServerUrl::new("tcp://host:notaport")
        .host_and_port()
        .is_err());
}

#[test]
fn test_random_startup_delay_bounds() {
    let delay = RandomStartupDelay::new(10, 50);
    for _ in 0..100 {
        let picked = delay.pick();
        assert!(picked >= Duration::from_millis(10));
        assert!(picked <= Duration::from_millis(50));
    }

    // A degenerate range pins to the lower bound.
    assert_eq!(
        RandomStartupDelay::new(25, 25).pick(),
        Duration::from_millis(25)
    );
}

#[tokio::test]
async fn test_client_identity() {
    let client = test_client();
    assert_eq!(client.server_name().as_str(), "plant-broker");
    assert_eq!(client.server_url().as_str(), "tcp://localhost:1883");
    assert_eq!(client.client_id().as_str(), "test-client-1");
    assert_eq!(client.state(), ClientState::Idle);
    assert!(!client.is_connected());
    assert!(client.auto_reconnect());
}

#[tokio::test]
async fn test_subscriptions_stored_while_disconnected() {
    let client = test_client();

    client
        .subscribe("spBv1.0/Energy/#", QoS::AtLeastOnce)
        .await
        .unwrap();
    client
        .subscribe("STATE/ScadaHost01", QoS::ExactlyOnce)
        .await
        .unwrap();
    client
        .subscribe("spBv1.0/Energy/#", QoS::AtMostOnce)
        .await
        .unwrap();

    // The registry keeps one entry per topic, last QoS wins, replay order is
    // deterministic.
    let subs = client.subscriptions();
    assert_eq!(
        subs,
        vec![
            ("STATE/ScadaHost01".to_string(), QoS::ExactlyOnce),
            ("spBv1.0/Energy/#".to_string(), QoS::AtMostOnce),
        ]
    );

    client.unsubscribe("STATE/ScadaHost01").await.unwrap();
    assert_eq!(client.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_publish_fails_when_disconnected() {
    let client = test_client();
    let result = client
        .publish("spBv1.0/Energy/NDATA/Gateway01", vec![1], QoS::AtMostOnce, false)
        .await;
    assert!(matches!(result, Err(Error::NotConnected { .. })));
}

#[tokio::test]
async fn test_async_publish_exhausts_attempts() {
    let client = test_client();
    let handle = client.async_publish(
        "spBv1.0/Energy/NDATA/Gateway01",
        vec![1],
        QoS::AtMostOnce,
        false,
        Duration::from_millis(1),
        3,
    );
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[tokio::test]
async fn test_message_counters() {
    let client = test_client();
    assert_eq!(client.num_msgs_arrived(), 0);
    assert_eq!(client.msgs_arrived_delta(), 0);
    assert_eq!(client.connection_count(), 0);
    client.clear_msgs_arrived();
    client.clear_connection_count();
}

#[tokio::test]
async fn test_availability_starts_at_zero() {
    let client = test_client();
    tokio::time::sleep(Duration::from_millis(20)).await;
    // Never connected: all observed time is downtime.
    let availability = client.availability().unwrap();
    assert!(availability < 1.0);
}

#[tokio::test]
async fn test_failed_connect_without_auto_reconnect_goes_idle() {
    // Nothing listens on port 1, so every attempt is refused immediately.
    let config = TahuClientConfig::new(
        MqttServerName::new("unreachable"),
        MqttServerUrl::new("tcp://127.0.0.1:1"),
        MqttClientId::new("one-shot-client"),
    )
    .with_auto_reconnect(false);
    let counter = Arc::new(CountingCallback::default());
    let client = TahuClient::new(config, counter.clone());

    client.connect().unwrap();

    // The supervisor gives up after the single failed attempt and parks the
    // client back in Idle rather than retrying.
    let mut settled = false;
    for _ in 0..200 {
        if client.state() == ClientState::Idle {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(settled, "supervisor should return the client to Idle");
    assert!(!client.is_connected());

    // A session that never came up reports no loss, once or twice; nothing
    // keeps ticking in the background to change that later.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        counter
            .connection_lost_calls
            .load(std::sync::atomic::Ordering::Relaxed),
        0
    );
    assert_eq!(client.state(), ClientState::Idle);
}

#[derive(Default)]
struct CountingCallback {
    connection_lost_calls: std::sync::atomic::AtomicU32,
}

#[async_trait]
impl ClientCallback for CountingCallback {
    async fn connect_complete(
        &self,
        _reconnect: bool,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
    ) {
    }

    async fn connection_lost(
        &self,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
        _reason: &Error,
    ) {
        self.connection_lost_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    async fn message_arrived(
        &self,
        _server_name: &MqttServerName,
        _server_url: &MqttServerUrl,
        _client_id: &MqttClientId,
        _topic: &str,
        _message: MqttMessage,
    ) {
    }

    async fn shutdown(&self) {}
}

#[tokio::test]
async fn test_connect_rejects_bad_url() {
    let config = TahuClientConfig::new(
        MqttServerName::new("bad"),
        MqttServerUrl::new("not-a-url"),
        MqttClientId::new("bad-client"),
    );
    let client = TahuClient::new(config, Arc::new(NullCallback));
    assert!(matches!(client.connect(), Err(Error::InvalidArgument(_))));
    assert_eq!(client.state(), ClientState::Idle);
}
