//! Per-edge-node session state tracking.
//!
//! A host application tracks every edge node it hears from: online/offline
//! transitions driven by NBIRTH/NDEATH, the `bdSeq` pairing between the two,
//! and the mod-256 message sequence number every subsequent message must
//! advance by exactly one. All mutations happen under a per-node lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::client::{MqttClientId, MqttServerName};
use crate::error::{Error, Result};
use crate::types::{DeviceDescriptor, EdgeNodeDescriptor};

#[derive(Debug, Default)]
struct NodeState {
    online: bool,
    online_timestamp: Option<u64>,
    offline_timestamp: Option<u64>,
    birth_bd_seq: Option<u64>,
    last_seq: Option<u8>,
}

/// Session state for one Sparkplug edge node as seen by a host application.
#[derive(Debug)]
pub struct SparkplugEdgeNode {
    descriptor: EdgeNodeDescriptor,
    server_name: MqttServerName,
    host_client_id: MqttClientId,
    state: Mutex<NodeState>,
    devices: Mutex<HashMap<String, SparkplugDevice>>,
}

impl SparkplugEdgeNode {
    /// Creates state for an edge node heard through the given client.
    pub fn new(
        descriptor: EdgeNodeDescriptor,
        server_name: MqttServerName,
        host_client_id: MqttClientId,
    ) -> Self {
        Self {
            descriptor,
            server_name,
            host_client_id,
            state: Mutex::new(NodeState::default()),
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// The edge node this state belongs to.
    pub fn descriptor(&self) -> &EdgeNodeDescriptor {
        &self.descriptor
    }

    /// The MQTT server the node was heard on.
    pub fn server_name(&self) -> &MqttServerName {
        &self.server_name
    }

    /// The host application client that owns this state.
    pub fn host_client_id(&self) -> &MqttClientId {
        &self.host_client_id
    }

    /// Returns true when the node is online.
    pub fn is_online(&self) -> bool {
        self.lock_state().online
    }

    /// Timestamp of the last NBIRTH, milliseconds since the Unix epoch.
    pub fn online_timestamp(&self) -> Option<u64> {
        self.lock_state().online_timestamp
    }

    /// Timestamp of the last accepted NDEATH.
    pub fn offline_timestamp(&self) -> Option<u64> {
        self.lock_state().offline_timestamp
    }

    /// The bdSeq registered by the last NBIRTH.
    pub fn birth_bd_seq(&self) -> Option<u64> {
        self.lock_state().birth_bd_seq
    }

    /// The last accepted sequence number.
    pub fn last_seq(&self) -> Option<u8> {
        self.lock_state().last_seq
    }

    /// Marks the node online from an NBIRTH.
    ///
    /// Timestamp, bdSeq and seq are all required on an NBIRTH; a missing
    /// field fails with [`Error::InvalidArgument`].
    pub fn set_online(
        &self,
        timestamp: Option<u64>,
        bd_seq: Option<u64>,
        seq: Option<u64>,
    ) -> Result<()> {
        let timestamp = timestamp.ok_or_else(|| {
            Error::InvalidArgument("the timestamp can not be missing from an NBIRTH".to_string())
        })?;
        let bd_seq = bd_seq.ok_or_else(|| {
            Error::InvalidArgument("the bdSeq can not be missing from an NBIRTH".to_string())
        })?;
        let seq = seq.ok_or_else(|| {
            Error::InvalidArgument("the seq can not be missing from an NBIRTH".to_string())
        })?;
        let seq = seq_in_range(seq)?;

        let mut state = self.lock_state();
        state.online = true;
        state.online_timestamp = Some(timestamp);
        state.birth_bd_seq = Some(bd_seq);
        state.last_seq = Some(seq);
        Ok(())
    }

    /// Marks the node offline from an NDEATH.
    ///
    /// The bdSeq is required. An NDEATH whose bdSeq does not pair with the
    /// last NBIRTH is ignored silently, per Sparkplug; the return value tells
    /// the caller whether the node actually transitioned offline.
    pub fn set_offline(&self, timestamp: Option<u64>, bd_seq: Option<u64>) -> Result<bool> {
        let bd_seq = bd_seq.ok_or_else(|| {
            Error::InvalidArgument("the bdSeq can not be missing from an NDEATH".to_string())
        })?;

        let mut state = self.lock_state();
        if state.birth_bd_seq != Some(bd_seq) {
            debug!(
                node = %self.descriptor,
                got = bd_seq,
                expected = ?state.birth_bd_seq,
                "mismatched bdSeq on NDEATH - ignoring"
            );
            return Ok(false);
        }
        state.online = false;
        state.offline_timestamp = timestamp;
        Ok(true)
    }

    /// Advances the sequence tracker by one message.
    ///
    /// Fails with [`Error::SequenceGap`] if no NBIRTH has registered a
    /// sequence yet, or if the incoming seq is not `(last + 1) mod 256`.
    pub fn advance(&self, seq: u64) -> Result<()> {
        let seq = seq_in_range(seq)?;
        let mut state = self.lock_state();
        match state.last_seq {
            None => Err(Error::SequenceGap {
                expected: None,
                got: seq,
            }),
            Some(last) => {
                // The tracker advances even on a mismatch; recovery happens
                // through a rebirth, not by replaying the failed seq.
                let expected = last.wrapping_add(1);
                state.last_seq = Some(expected);
                if expected != seq {
                    return Err(Error::SequenceGap {
                        expected: Some(expected),
                        got: seq,
                    });
                }
                Ok(())
            }
        }
    }

    /// Returns the device state for the given id, creating it if new.
    pub fn device(&self, device_id: &str) -> SparkplugDevice {
        let mut devices = match self.devices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        devices
            .entry(device_id.to_string())
            .or_insert_with(|| {
                SparkplugDevice::new(DeviceDescriptor::new(self.descriptor.clone(), device_id))
            })
            .clone()
    }

    /// Records a device coming online.
    pub fn device_online(&self, device_id: &str, timestamp: Option<u64>) {
        self.update_device(device_id, true, timestamp);
    }

    /// Records a device going offline.
    pub fn device_offline(&self, device_id: &str, timestamp: Option<u64>) {
        self.update_device(device_id, false, timestamp);
    }

    fn update_device(&self, device_id: &str, online: bool, timestamp: Option<u64>) {
        let mut devices = match self.devices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let device = devices
            .entry(device_id.to_string())
            .or_insert_with(|| {
                SparkplugDevice::new(DeviceDescriptor::new(self.descriptor.clone(), device_id))
            });
        device.online = online;
        if online {
            device.online_timestamp = timestamp;
        } else {
            device.offline_timestamp = timestamp;
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, NodeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Session state for one device attached to an edge node.
#[derive(Debug, Clone)]
pub struct SparkplugDevice {
    /// The device this state belongs to.
    pub descriptor: DeviceDescriptor,
    /// Whether the device is online.
    pub online: bool,
    /// Timestamp of the last DBIRTH.
    pub online_timestamp: Option<u64>,
    /// Timestamp of the last DDEATH.
    pub offline_timestamp: Option<u64>,
}

impl SparkplugDevice {
    fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            online: false,
            online_timestamp: None,
            offline_timestamp: None,
        }
    }
}

/// Tracks every edge node a host application has heard from.
#[derive(Debug, Default)]
pub struct EdgeNodeManager {
    nodes: Mutex<HashMap<EdgeNodeDescriptor, Arc<SparkplugEdgeNode>>>,
}

impl EdgeNodeManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node state for a descriptor, creating it on first sight.
    pub fn get_or_insert(
        &self,
        descriptor: &EdgeNodeDescriptor,
        server_name: &MqttServerName,
        host_client_id: &MqttClientId,
    ) -> Arc<SparkplugEdgeNode> {
        let mut nodes = match self.nodes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        nodes
            .entry(descriptor.clone())
            .or_insert_with(|| {
                Arc::new(SparkplugEdgeNode::new(
                    descriptor.clone(),
                    server_name.clone(),
                    host_client_id.clone(),
                ))
            })
            .clone()
    }

    /// Looks up a node without creating it.
    pub fn get(&self, descriptor: &EdgeNodeDescriptor) -> Option<Arc<SparkplugEdgeNode>> {
        let nodes = match self.nodes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        nodes.get(descriptor).cloned()
    }
}

fn seq_in_range(seq: u64) -> Result<u8> {
    u8::try_from(seq).map_err(|_| {
        Error::InvalidArgument(format!("sequence number {} is outside 0..=255", seq))
    })
}
