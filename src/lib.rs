//! A Sparkplug B edge and host application library over MQTT.
//!
//! This library implements the two halves of an Industrial IoT Sparkplug B
//! deployment: the payload codec (typed metrics over the Sparkplug protobuf
//! wire schema, including the packed binary array encodings) and the session
//! machinery (birth/death lifecycle, per-edge-node sequence tracking,
//! optional sequence reordering, a supervised MQTT client, and a sharded
//! host-side dispatcher).
//!
//! # Architecture
//!
//! - [`PayloadBuilder`], [`SparkplugBPayloadEncoder`], [`SparkplugBPayloadDecoder`]:
//!   build, encode and decode payloads
//! - [`TahuClient`]: one supervised MQTT session with reconnect, subscription
//!   replay and BIRTH/LWT lifecycle
//! - [`TahuHostCallback`]: host-side dispatcher routing messages through a
//!   sharded executor and the sequence checker to an event handler
//! - [`EdgeClient`] and [`PeriodicPublisher`]: edge-side publishing with
//!   automatic `seq`/`bdSeq` management
//!
//! # Example: building and encoding a payload
//!
//! ```
//! use sparkplug_mqtt::{PayloadBuilder, SparkplugBPayloadDecoder};
//!
//! # fn main() -> Result<(), sparkplug_mqtt::Error> {
//! let mut birth = PayloadBuilder::new();
//! birth
//!     .set_timestamp(1_700_000_000_000)
//!     .set_seq(0)
//!     .add_double_with_alias("Temperature", 1, 20.5)
//!     .add_bool_with_alias("Active", 2, true);
//!
//! let bytes = birth.serialize()?;
//!
//! let decoded = SparkplugBPayloadDecoder::new().decode(&bytes)?;
//! assert_eq!(decoded.metrics.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Example: subscribing as a host application
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use sparkplug_mqtt::{
//!     group_wildcard, MqttClientId, MqttServerName, MqttServerUrl, TahuClient,
//!     TahuClientConfig, TahuHostCallback, TahuHostConfig,
//! };
//! # use sparkplug_mqtt::{CommandPublisher, HostApplicationEventHandler};
//! # struct Handler;
//! # #[async_trait::async_trait]
//! # impl HostApplicationEventHandler for Handler {}
//! # struct Commands;
//! # #[async_trait::async_trait]
//! # impl CommandPublisher for Commands {
//! #     async fn publish_node_command(&self, _: &sparkplug_mqtt::EdgeNodeDescriptor, _: sparkplug_mqtt::SparkplugBPayload) -> sparkplug_mqtt::Result<()> { Ok(()) }
//! #     async fn publish_device_command(&self, _: &sparkplug_mqtt::DeviceDescriptor, _: sparkplug_mqtt::SparkplugBPayload) -> sparkplug_mqtt::Result<()> { Ok(()) }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sparkplug_mqtt::Error> {
//! let callback = Arc::new(TahuHostCallback::new(
//!     Arc::new(Handler),
//!     Arc::new(Commands),
//!     TahuHostConfig::default(),
//! ));
//!
//! let config = TahuClientConfig::new(
//!     MqttServerName::new("plant-broker"),
//!     MqttServerUrl::new("tcp://localhost:1883"),
//!     MqttClientId::new("host-app-1"),
//! );
//! let client = TahuClient::new(config, callback.clone());
//! callback.set_clients(HashMap::from([(
//!     client.server_name().clone(),
//!     client.clone(),
//! )]));
//!
//! client.subscribe(group_wildcard("Energy"), sparkplug_mqtt::QoS::AtLeastOnce).await?;
//! client.connect()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod edge;
pub mod error;
pub mod host;
pub mod node;
pub mod payload;
pub mod protobuf;
pub mod reorder;
pub mod topic;
pub mod types;

pub use rumqttc::QoS;

pub use client::{
    BirthMessage, ClientCallback, ClientState, LwtMessage, MqttClientId, MqttMessage,
    MqttServerName, MqttServerUrl, RandomStartupDelay, TahuClient, TahuClientConfig,
};
pub use edge::{DataSimulator, EdgeClient, PeriodicPublisher};
pub use error::{Error, Result};
pub use host::{
    CommandPublisher, HostApplicationEventHandler, TahuHostCallback, TahuHostConfig,
    TahuPayloadHandler,
};
pub use node::{EdgeNodeManager, SparkplugDevice, SparkplugEdgeNode};
pub use payload::{PayloadBuilder, SparkplugBPayloadDecoder, SparkplugBPayloadEncoder};
pub use reorder::{Ingest, ReorderConfig, SequenceReorderManager};
pub use topic::{group_wildcard, node_wildcard, state_topic, MessageType, ParsedTopic};
pub use types::{
    DataSet, DataSetDataType, DeviceDescriptor, EdgeNodeDescriptor, File, MetaData, Metric,
    MetricDataType, MetricValue, Parameter, ParameterDataType, PropertyDataType, PropertySet,
    PropertyValue, PropertyValueKind, Row, ScalarValue, SparkplugBPayload, Template,
    TemplateRegistry, BDSEQ_METRIC_NAME, NODE_CONTROL_REBIRTH,
};
