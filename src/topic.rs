//! Topic handling for the Sparkplug B namespace.
//!
//! Two topic families exist side by side on a Sparkplug broker: payload
//! topics under the `spBv1.0` namespace, shaped
//! `spBv1.0/{group_id}/{kind}/{edge_node_id}` with an optional trailing
//! `/{device_id}` for device-level kinds, and host availability topics shaped
//! `STATE/{host_id}`. [`ParsedTopic`] is the typed form of both; free helpers
//! build the wildcard filters a host subscribes with.

use crate::error::{Error, Result};
use crate::types::{DeviceDescriptor, EdgeNodeDescriptor};

/// The Sparkplug B topic namespace token.
pub const SPARKPLUG_B_NAMESPACE: &str = "spBv1.0";

/// Prefix every Sparkplug B topic starts with.
pub const SPARKPLUG_B_TOPIC_PREFIX: &str = "spBv1.0/";

/// Prefix of host application STATE topics.
pub const STATE_TOPIC_PREFIX: &str = "STATE/";

/// The nine Sparkplug B message kinds, as carried in the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Edge node announces itself with its full metric set
    NBirth,
    /// Edge node has gone offline
    NDeath,
    /// Edge node metric update
    NData,
    /// Command addressed to an edge node
    NCmd,
    /// Device announces itself with its full metric set
    DBirth,
    /// Device has gone offline
    DDeath,
    /// Device metric update
    DData,
    /// Command addressed to a device
    DCmd,
    /// Host application availability announcement
    State,
}

impl MessageType {
    const ALL: [MessageType; 9] = [
        MessageType::NBirth,
        MessageType::NDeath,
        MessageType::NData,
        MessageType::NCmd,
        MessageType::DBirth,
        MessageType::DDeath,
        MessageType::DData,
        MessageType::DCmd,
        MessageType::State,
    ];

    /// The topic segment token for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NBirth => "NBIRTH",
            MessageType::NDeath => "NDEATH",
            MessageType::NData => "NDATA",
            MessageType::NCmd => "NCMD",
            MessageType::DBirth => "DBIRTH",
            MessageType::DDeath => "DDEATH",
            MessageType::DData => "DDATA",
            MessageType::DCmd => "DCMD",
            MessageType::State => "STATE",
        }
    }

    /// Whether this kind addresses an edge node itself.
    pub fn is_node_message(&self) -> bool {
        self.as_str().starts_with('N')
    }

    /// Whether this kind addresses a device attached to an edge node.
    pub fn is_device_message(&self) -> bool {
        self.as_str().starts_with('D')
    }

    /// Whether this is a birth announcement (NBIRTH or DBIRTH).
    pub fn is_birth(&self) -> bool {
        self.as_str().ends_with("BIRTH")
    }

    /// Whether this is a death announcement (NDEATH or DDEATH).
    pub fn is_death(&self) -> bool {
        self.as_str().ends_with("DEATH")
    }

    /// Whether this carries metric data (NDATA or DDATA).
    pub fn is_data(&self) -> bool {
        self.as_str().ends_with("DATA")
    }

    /// Whether this is a command (NCMD or DCMD).
    pub fn is_command(&self) -> bool {
        self.as_str().ends_with("CMD")
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == token)
            .ok_or_else(|| Error::InvalidTopic(format!("'{token}' is not a message kind")))
    }
}

/// A topic understood by this library, in typed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTopic {
    /// A payload topic under the `spBv1.0` namespace.
    Sparkplug {
        /// The message kind.
        message_type: MessageType,
        /// The group ID.
        group_id: String,
        /// The edge node ID.
        edge_node_id: String,
        /// The device ID; present exactly for device-level kinds.
        device_id: Option<String>,
    },
    /// A host application STATE topic.
    State {
        /// The host application ID.
        host_id: String,
    },
}

impl ParsedTopic {
    /// Parses a topic string into its typed form.
    ///
    /// Segment counts and the message kind must agree: node-level kinds take
    /// exactly four segments, device-level kinds exactly five, and STATE
    /// topics exactly two.
    ///
    /// # Examples
    ///
    /// ```
    /// use sparkplug_mqtt::ParsedTopic;
    ///
    /// let node = ParsedTopic::parse("spBv1.0/Fieldbus/NDATA/rig-07")?;
    /// let device = ParsedTopic::parse("spBv1.0/Fieldbus/DDATA/rig-07/pump-1")?;
    /// let state = ParsedTopic::parse("STATE/primary-scada")?;
    /// # Ok::<(), sparkplug_mqtt::Error>(())
    /// ```
    pub fn parse(topic: &str) -> Result<Self> {
        let segments: Vec<&str> = topic.split('/').collect();

        match segments.as_slice() {
            ["STATE", host_id] => Ok(ParsedTopic::State {
                host_id: (*host_id).to_string(),
            }),
            [namespace, group_id, kind, edge_node_id]
                if *namespace == SPARKPLUG_B_NAMESPACE =>
            {
                let message_type: MessageType = kind.parse()?;
                if !message_type.is_node_message() {
                    return Err(Error::InvalidTopic(format!(
                        "{message_type} cannot appear on a node-level topic"
                    )));
                }
                Ok(ParsedTopic::Sparkplug {
                    message_type,
                    group_id: (*group_id).to_string(),
                    edge_node_id: (*edge_node_id).to_string(),
                    device_id: None,
                })
            }
            [namespace, group_id, kind, edge_node_id, device_id]
                if *namespace == SPARKPLUG_B_NAMESPACE =>
            {
                let message_type: MessageType = kind.parse()?;
                if !message_type.is_device_message() {
                    return Err(Error::InvalidTopic(format!(
                        "{message_type} cannot appear on a device-level topic"
                    )));
                }
                Ok(ParsedTopic::Sparkplug {
                    message_type,
                    group_id: (*group_id).to_string(),
                    edge_node_id: (*edge_node_id).to_string(),
                    device_id: Some((*device_id).to_string()),
                })
            }
            _ => Err(Error::InvalidTopic(format!(
                "'{topic}' is neither a Sparkplug B nor a STATE topic"
            ))),
        }
    }

    /// Builds a node-level topic for an edge node.
    pub fn for_node(message_type: MessageType, node: &EdgeNodeDescriptor) -> Result<Self> {
        if !message_type.is_node_message() {
            return Err(Error::InvalidTopic(format!(
                "{message_type} is not a node-level message kind"
            )));
        }
        Ok(ParsedTopic::Sparkplug {
            message_type,
            group_id: node.group_id.clone(),
            edge_node_id: node.edge_node_id.clone(),
            device_id: None,
        })
    }

    /// Builds a device-level topic for a device.
    pub fn for_device(message_type: MessageType, device: &DeviceDescriptor) -> Result<Self> {
        if !message_type.is_device_message() {
            return Err(Error::InvalidTopic(format!(
                "{message_type} is not a device-level message kind"
            )));
        }
        Ok(ParsedTopic::Sparkplug {
            message_type,
            group_id: device.edge_node.group_id.clone(),
            edge_node_id: device.edge_node.edge_node_id.clone(),
            device_id: Some(device.device_id.clone()),
        })
    }

    /// The message kind, for payload topics.
    pub fn message_type(&self) -> Option<MessageType> {
        if let ParsedTopic::Sparkplug { message_type, .. } = self {
            Some(*message_type)
        } else {
            None
        }
    }

    /// The group ID, for payload topics.
    pub fn group_id(&self) -> Option<&str> {
        if let ParsedTopic::Sparkplug { group_id, .. } = self {
            Some(group_id)
        } else {
            None
        }
    }

    /// The edge node ID, for payload topics.
    pub fn edge_node_id(&self) -> Option<&str> {
        if let ParsedTopic::Sparkplug { edge_node_id, .. } = self {
            Some(edge_node_id)
        } else {
            None
        }
    }

    /// The device ID, for device-level payload topics.
    pub fn device_id(&self) -> Option<&str> {
        if let ParsedTopic::Sparkplug { device_id, .. } = self {
            device_id.as_deref()
        } else {
            None
        }
    }

    /// The host application ID, for STATE topics.
    pub fn host_id(&self) -> Option<&str> {
        if let ParsedTopic::State { host_id } = self {
            Some(host_id)
        } else {
            None
        }
    }

    /// The edge node this topic belongs to, for payload topics.
    pub fn edge_node_descriptor(&self) -> Option<EdgeNodeDescriptor> {
        if let ParsedTopic::Sparkplug {
            group_id,
            edge_node_id,
            ..
        } = self
        {
            Some(EdgeNodeDescriptor::new(
                group_id.clone(),
                edge_node_id.clone(),
            ))
        } else {
            None
        }
    }

    /// The device this topic belongs to, for device-level payload topics.
    pub fn device_descriptor(&self) -> Option<DeviceDescriptor> {
        match self {
            ParsedTopic::Sparkplug {
                group_id,
                edge_node_id,
                device_id: Some(device_id),
                ..
            } => Some(DeviceDescriptor::new(
                EdgeNodeDescriptor::new(group_id.clone(), edge_node_id.clone()),
                device_id.clone(),
            )),
            _ => None,
        }
    }

    /// Renders the topic back to its string form.
    pub fn to_topic_string(&self) -> String {
        match self {
            ParsedTopic::Sparkplug {
                message_type,
                group_id,
                edge_node_id,
                device_id,
            } => {
                let mut topic = format!(
                    "{SPARKPLUG_B_NAMESPACE}/{group_id}/{message_type}/{edge_node_id}"
                );
                if let Some(device_id) = device_id {
                    topic.push('/');
                    topic.push_str(device_id);
                }
                topic
            }
            ParsedTopic::State { host_id } => format!("{STATE_TOPIC_PREFIX}{host_id}"),
        }
    }
}

impl std::fmt::Display for ParsedTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_topic_string())
    }
}

/// Wildcard subscription covering every message in a group: `spBv1.0/{group}/#`.
pub fn group_wildcard(group_id: &str) -> String {
    format!("{SPARKPLUG_B_NAMESPACE}/{group_id}/#")
}

/// Wildcard subscription covering one edge node: `spBv1.0/{group}/+/{edge}/#`.
pub fn node_wildcard(node: &EdgeNodeDescriptor) -> String {
    format!(
        "{SPARKPLUG_B_NAMESPACE}/{}/+/{}/#",
        node.group_id, node.edge_node_id
    )
}

/// STATE topic for a host application: `STATE/{host_id}`.
pub fn state_topic(host_id: &str) -> String {
    format!("{STATE_TOPIC_PREFIX}{host_id}")
}
