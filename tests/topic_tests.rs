//! Tests for topic parsing, construction and classification

use std::str::FromStr;

use sparkplug_mqtt::{
    group_wildcard, node_wildcard, state_topic, DeviceDescriptor, EdgeNodeDescriptor, MessageType,
    ParsedTopic,
};

#[test]
fn parses_every_node_level_kind() {
    let cases = [
        ("spBv1.0/Fieldbus/NBIRTH/rig-07", MessageType::NBirth),
        ("spBv1.0/Fieldbus/NDEATH/rig-07", MessageType::NDeath),
        ("spBv1.0/Fieldbus/NDATA/rig-07", MessageType::NData),
        ("spBv1.0/Fieldbus/NCMD/rig-07", MessageType::NCmd),
    ];
    for (raw, kind) in cases {
        let topic = ParsedTopic::parse(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
        assert_eq!(topic.message_type(), Some(kind), "{raw}");
        assert_eq!(topic.group_id(), Some("Fieldbus"), "{raw}");
        assert_eq!(topic.edge_node_id(), Some("rig-07"), "{raw}");
        assert_eq!(topic.device_id(), None, "{raw}");
        assert_eq!(topic.to_topic_string(), raw);
    }
}

#[test]
fn parses_every_device_level_kind() {
    let cases = [
        ("spBv1.0/Fieldbus/DBIRTH/rig-07/pump-1", MessageType::DBirth),
        ("spBv1.0/Fieldbus/DDEATH/rig-07/pump-1", MessageType::DDeath),
        ("spBv1.0/Fieldbus/DDATA/rig-07/pump-1", MessageType::DData),
        ("spBv1.0/Fieldbus/DCMD/rig-07/pump-1", MessageType::DCmd),
    ];
    for (raw, kind) in cases {
        let topic = ParsedTopic::parse(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
        assert_eq!(topic.message_type(), Some(kind), "{raw}");
        assert_eq!(topic.device_id(), Some("pump-1"), "{raw}");
        assert_eq!(topic.to_topic_string(), raw);
    }
}

#[test]
fn parses_state_topics() {
    let topic = ParsedTopic::parse("STATE/primary-scada").unwrap();
    assert_eq!(topic.host_id(), Some("primary-scada"));
    assert_eq!(topic.message_type(), None);
    assert_eq!(topic.group_id(), None);
    assert_eq!(topic.edge_node_id(), None);
    assert_eq!(topic.to_string(), "STATE/primary-scada");
}

#[test]
fn rejects_malformed_topics() {
    let bad = [
        // wrong namespace
        "spAv1.0/Fieldbus/NDATA/rig-07",
        "telemetry/rig-07/temperature",
        // unknown kind token
        "spBv1.0/Fieldbus/NOISE/rig-07",
        "spBv1.0/Fieldbus/ndata/rig-07",
        // arity disagrees with the kind
        "spBv1.0/Fieldbus/DDATA/rig-07",
        "spBv1.0/Fieldbus/NDATA/rig-07/pump-1",
        // wrong segment counts
        "spBv1.0/Fieldbus/NDATA",
        "spBv1.0/Fieldbus/DDATA/rig-07/pump-1/extra",
        "STATE",
        "STATE/primary-scada/extra",
    ];
    for raw in bad {
        assert!(ParsedTopic::parse(raw).is_err(), "should reject {raw}");
    }
}

#[test]
fn ids_with_unusual_characters_survive() {
    let topic = ParsedTopic::parse("spBv1.0/Cell-3_B/NDATA/edge.gateway-01").unwrap();
    assert_eq!(topic.group_id(), Some("Cell-3_B"));
    assert_eq!(topic.edge_node_id(), Some("edge.gateway-01"));
}

#[test]
fn descriptors_from_parsed_topics() {
    let topic = ParsedTopic::parse("spBv1.0/Fieldbus/DDATA/rig-07/pump-1").unwrap();

    let node = topic.edge_node_descriptor().unwrap();
    assert_eq!(node, EdgeNodeDescriptor::new("Fieldbus", "rig-07"));
    assert_eq!(node.to_string(), "Fieldbus/rig-07");

    let device = topic.device_descriptor().unwrap();
    assert_eq!(device.device_id, "pump-1");
    assert_eq!(device.to_string(), "Fieldbus/rig-07/pump-1");

    // A node-level topic has no device descriptor.
    let topic = ParsedTopic::parse("spBv1.0/Fieldbus/NDATA/rig-07").unwrap();
    assert!(topic.device_descriptor().is_none());
}

#[test]
fn builders_mirror_the_parser() {
    let node = EdgeNodeDescriptor::new("Fieldbus", "rig-07");
    for kind in [
        MessageType::NBirth,
        MessageType::NDeath,
        MessageType::NData,
        MessageType::NCmd,
    ] {
        let built = ParsedTopic::for_node(kind, &node).unwrap();
        assert_eq!(ParsedTopic::parse(&built.to_topic_string()).unwrap(), built);
    }

    let device = DeviceDescriptor::new(node.clone(), "pump-1");
    for kind in [
        MessageType::DBirth,
        MessageType::DDeath,
        MessageType::DData,
        MessageType::DCmd,
    ] {
        let built = ParsedTopic::for_device(kind, &device).unwrap();
        assert_eq!(ParsedTopic::parse(&built.to_topic_string()).unwrap(), built);
    }

    // Each builder refuses kinds from the other level.
    assert!(ParsedTopic::for_node(MessageType::DData, &node).is_err());
    assert!(ParsedTopic::for_device(MessageType::NData, &device).is_err());
}

#[test]
fn kind_classification() {
    let node_kinds = [
        MessageType::NBirth,
        MessageType::NDeath,
        MessageType::NData,
        MessageType::NCmd,
    ];
    let device_kinds = [
        MessageType::DBirth,
        MessageType::DDeath,
        MessageType::DData,
        MessageType::DCmd,
    ];
    for kind in node_kinds {
        assert!(kind.is_node_message() && !kind.is_device_message(), "{kind}");
    }
    for kind in device_kinds {
        assert!(kind.is_device_message() && !kind.is_node_message(), "{kind}");
    }
    assert!(!MessageType::State.is_node_message());
    assert!(!MessageType::State.is_device_message());

    assert!(MessageType::NBirth.is_birth() && MessageType::DBirth.is_birth());
    assert!(MessageType::NDeath.is_death() && MessageType::DDeath.is_death());
    assert!(MessageType::NData.is_data() && MessageType::DData.is_data());
    assert!(MessageType::NCmd.is_command() && MessageType::DCmd.is_command());
    assert!(!MessageType::NBirth.is_death() && !MessageType::DData.is_command());
}

#[test]
fn kind_tokens_round_trip_through_strings() {
    let tokens = [
        "NBIRTH", "NDEATH", "NDATA", "NCMD", "DBIRTH", "DDEATH", "DDATA", "DCMD", "STATE",
    ];
    for token in tokens {
        let kind = MessageType::from_str(token).unwrap_or_else(|e| panic!("{token}: {e}"));
        assert_eq!(kind.to_string(), token);
    }
    assert!(MessageType::from_str("REBIRTH").is_err());
}

#[test]
fn subscription_wildcards() {
    assert_eq!(group_wildcard("Fieldbus"), "spBv1.0/Fieldbus/#");
    assert_eq!(
        node_wildcard(&EdgeNodeDescriptor::new("Fieldbus", "rig-07")),
        "spBv1.0/Fieldbus/+/rig-07/#"
    );
    assert_eq!(state_topic("primary-scada"), "STATE/primary-scada");
}
