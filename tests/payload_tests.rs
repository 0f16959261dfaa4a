//! Tests for payload building, encoding and decoding

use prost::Message as _;
use sparkplug_mqtt::protobuf as pb;
use sparkplug_mqtt::{
    DataSet, DataSetDataType, Error, File, MetaData, Metric, MetricDataType, MetricValue,
    Parameter, ParameterDataType, PayloadBuilder, PropertyDataType, PropertySet, PropertyValue,
    PropertyValueKind, Row, ScalarValue, SparkplugBPayload, SparkplugBPayloadDecoder,
    SparkplugBPayloadEncoder, Template,
};

fn encode(payload: &SparkplugBPayload) -> Vec<u8> {
    SparkplugBPayloadEncoder::new().encode(payload).unwrap()
}

fn decode(bytes: &[u8]) -> SparkplugBPayload {
    SparkplugBPayloadDecoder::new().decode(bytes).unwrap()
}

fn round_trip(payload: &SparkplugBPayload) -> SparkplugBPayload {
    decode(&encode(payload))
}

fn single_metric_payload(metric: Metric) -> SparkplugBPayload {
    let mut payload = SparkplugBPayload::new();
    payload.metrics.push(metric);
    payload
}

/// The raw wire value of the first metric in an encoded payload.
fn wire_value(bytes: &[u8]) -> pb::metric::Value {
    let proto = pb::Payload::decode(bytes).unwrap();
    proto.metrics[0].value.clone().unwrap()
}

#[test]
fn test_envelope_round_trip() {
    let mut payload = SparkplugBPayload::new();
    payload.timestamp = Some(1_234_567_890);
    payload.seq = Some(42);
    payload.uuid = Some("a-payload-uuid".to_string());
    payload.body = Some(vec![1, 2, 3]);

    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_scalar_round_trips() {
    let metrics = vec![
        Metric::new("i8", MetricDataType::Int8, MetricValue::Int8(-128)),
        Metric::new("i16", MetricDataType::Int16, MetricValue::Int16(-1234)),
        Metric::new("i32", MetricDataType::Int32, MetricValue::Int32(-123456)),
        Metric::new("i64", MetricDataType::Int64, MetricValue::Int64(i64::MIN)),
        Metric::new("u8", MetricDataType::UInt8, MetricValue::UInt8(255)),
        Metric::new("u16", MetricDataType::UInt16, MetricValue::UInt16(65535)),
        Metric::new("u32", MetricDataType::UInt32, MetricValue::UInt32(u32::MAX)),
        Metric::new("u64", MetricDataType::UInt64, MetricValue::UInt64(u64::MAX)),
        Metric::new("f32", MetricDataType::Float, MetricValue::Float(3.5)),
        Metric::new("f64", MetricDataType::Double, MetricValue::Double(-2.25)),
        Metric::new("b", MetricDataType::Boolean, MetricValue::Boolean(true)),
        Metric::new(
            "s",
            MetricDataType::String,
            MetricValue::String("hello".to_string()),
        ),
        Metric::new(
            "dt",
            MetricDataType::DateTime,
            MetricValue::DateTime(1_700_000_000_000),
        ),
        Metric::new(
            "txt",
            MetricDataType::Text,
            MetricValue::Text("longer text".to_string()),
        ),
        Metric::new(
            "id",
            MetricDataType::Uuid,
            MetricValue::Uuid("123e4567-e89b-12d3-a456-426614174000".to_string()),
        ),
        Metric::new(
            "bytes",
            MetricDataType::Bytes,
            MetricValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        ),
    ];
    let mut payload = SparkplugBPayload::new();
    payload.metrics = metrics;

    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_array_round_trips() {
    let metrics = vec![
        Metric::new(
            "i8a",
            MetricDataType::Int8Array,
            MetricValue::Int8Array(vec![-1, 0, 1, 127, -128]),
        ),
        Metric::new(
            "i16a",
            MetricDataType::Int16Array,
            MetricValue::Int16Array(vec![-300, 300]),
        ),
        Metric::new(
            "i32a",
            MetricDataType::Int32Array,
            MetricValue::Int32Array(vec![i32::MIN, 0, i32::MAX]),
        ),
        Metric::new(
            "i64a",
            MetricDataType::Int64Array,
            MetricValue::Int64Array(vec![i64::MIN, i64::MAX]),
        ),
        Metric::new(
            "u8a",
            MetricDataType::UInt8Array,
            MetricValue::UInt8Array(vec![0, 128, 255]),
        ),
        Metric::new(
            "u16a",
            MetricDataType::UInt16Array,
            MetricValue::UInt16Array(vec![0, 40000]),
        ),
        Metric::new(
            "u32a",
            MetricDataType::UInt32Array,
            MetricValue::UInt32Array(vec![0, u32::MAX]),
        ),
        Metric::new(
            "u64a",
            MetricDataType::UInt64Array,
            MetricValue::UInt64Array(vec![0, u64::MAX]),
        ),
        Metric::new(
            "f32a",
            MetricDataType::FloatArray,
            MetricValue::FloatArray(vec![1.5, -0.25]),
        ),
        Metric::new(
            "f64a",
            MetricDataType::DoubleArray,
            MetricValue::DoubleArray(vec![1e100, -1e-100]),
        ),
        Metric::new(
            "ba",
            MetricDataType::BooleanArray,
            MetricValue::BooleanArray(vec![
                true, false, true, true, false, false, false, false, true,
            ]),
        ),
        Metric::new(
            "sa",
            MetricDataType::StringArray,
            MetricValue::StringArray(vec!["ab".to_string(), String::new(), "c".to_string()]),
        ),
        Metric::new(
            "dta",
            MetricDataType::DateTimeArray,
            MetricValue::DateTimeArray(vec![0, 1_700_000_000_000]),
        ),
    ];
    let mut payload = SparkplugBPayload::new();
    payload.metrics = metrics;

    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_int32_negative_wire_representation() {
    // A negative Int32 travels as the zero-extended two's complement bits.
    let payload = single_metric_payload(Metric::new(
        "t",
        MetricDataType::Int32,
        MetricValue::Int32(-1),
    ));
    let bytes = encode(&payload);

    match wire_value(&bytes) {
        pb::metric::Value::IntValue(v) => assert_eq!(v, 0xFFFF_FFFF),
        other => panic!("expected IntValue, got {:?}", other),
    }

    let decoded = decode(&bytes);
    assert_eq!(decoded.metrics[0].value, Some(MetricValue::Int32(-1)));
}

#[test]
fn test_narrow_ints_zero_extended() {
    let payload = single_metric_payload(Metric::new(
        "t",
        MetricDataType::Int8,
        MetricValue::Int8(-1),
    ));
    match wire_value(&encode(&payload)) {
        pb::metric::Value::IntValue(v) => assert_eq!(v, 0xFF),
        other => panic!("expected IntValue, got {:?}", other),
    }

    let payload = single_metric_payload(Metric::new(
        "t",
        MetricDataType::Int16,
        MetricValue::Int16(-1),
    ));
    match wire_value(&encode(&payload)) {
        pb::metric::Value::IntValue(v) => assert_eq!(v, 0xFFFF),
        other => panic!("expected IntValue, got {:?}", other),
    }
}

#[test]
fn test_uint64_boundaries() {
    // 2^64 - 1 is representable and travels as all-ones.
    let max = MetricValue::uint64_checked((1i128 << 64) - 1).unwrap();
    let payload = single_metric_payload(Metric::new("t", MetricDataType::UInt64, max));
    match wire_value(&encode(&payload)) {
        pb::metric::Value::LongValue(v) => assert_eq!(v, u64::MAX),
        other => panic!("expected LongValue, got {:?}", other),
    }

    // 2^64 and negative values are rejected at ingress.
    assert!(matches!(
        MetricValue::uint64_checked(1i128 << 64),
        Err(Error::OutOfRange { .. })
    ));
    assert!(matches!(
        MetricValue::uint64_checked(-1),
        Err(Error::OutOfRange { .. })
    ));
}

#[test]
fn test_uint32_boundaries() {
    assert!(MetricValue::uint32_checked(i64::from(u32::MAX)).is_ok());
    assert!(matches!(
        MetricValue::uint32_checked(i64::from(u32::MAX) + 1),
        Err(Error::OutOfRange { .. })
    ));
    assert!(matches!(
        MetricValue::uint32_checked(-1),
        Err(Error::OutOfRange { .. })
    ));
}

#[test]
fn test_boolean_array_wire_layout() {
    // 9 elements: 4-byte LE count, then big-endian bit order within bytes.
    let payload = single_metric_payload(Metric::new(
        "flags",
        MetricDataType::BooleanArray,
        MetricValue::BooleanArray(vec![
            true, false, true, true, false, false, false, false, true,
        ]),
    ));
    match wire_value(&encode(&payload)) {
        pb::metric::Value::BytesValue(bytes) => {
            assert_eq!(bytes, vec![0x09, 0x00, 0x00, 0x00, 0xB0, 0x80]);
        }
        other => panic!("expected BytesValue, got {:?}", other),
    }
}

#[test]
fn test_string_array_wire_layout() {
    let payload = single_metric_payload(Metric::new(
        "names",
        MetricDataType::StringArray,
        MetricValue::StringArray(vec!["ab".to_string(), String::new(), "c".to_string()]),
    ));
    match wire_value(&encode(&payload)) {
        pb::metric::Value::BytesValue(bytes) => {
            assert_eq!(bytes, vec![0x61, 0x62, 0x00, 0x00, 0x63, 0x00]);
        }
        other => panic!("expected BytesValue, got {:?}", other),
    }
}

#[test]
fn test_null_metric_round_trip() {
    let payload = single_metric_payload(Metric::null("nothing", MetricDataType::Double));
    let decoded = round_trip(&payload);
    assert!(decoded.metrics[0].is_null());
    assert_eq!(decoded.metrics[0].data_type, MetricDataType::Double);

    let proto = pb::Payload::decode(encode(&payload).as_slice()).unwrap();
    assert_eq!(proto.metrics[0].is_null, Some(true));
    assert!(proto.metrics[0].value.is_none());
}

#[test]
fn test_alias_only_metric() {
    let payload = single_metric_payload(Metric::by_alias(
        7,
        MetricDataType::Double,
        MetricValue::Double(21.5),
    ));
    let decoded = round_trip(&payload);
    assert_eq!(decoded.metrics[0].name, None);
    assert_eq!(decoded.metrics[0].alias, Some(7));
}

#[test]
fn test_value_shape_mismatch_rejected() {
    let payload = single_metric_payload(Metric::new(
        "wrong",
        MetricDataType::Int32,
        MetricValue::Double(1.5),
    ));
    let result = SparkplugBPayloadEncoder::new().encode(&payload);
    assert!(matches!(result, Err(Error::InvalidType { .. })));
}

#[test]
fn test_unknown_datatype_rejected() {
    let payload = single_metric_payload(Metric::new(
        "unknown",
        MetricDataType::Unknown,
        MetricValue::Int32(1),
    ));
    let result = SparkplugBPayloadEncoder::new().encode(&payload);
    assert!(matches!(result, Err(Error::UnknownType(_))));
}

#[test]
fn test_decoder_rejects_inconsistent_value_field() {
    // datatype says Int32, wire carries a double
    let proto = pb::Payload {
        metrics: vec![pb::Metric {
            name: Some("bad".to_string()),
            datatype: Some(MetricDataType::Int32.code()),
            value: Some(pb::metric::Value::DoubleValue(1.5)),
            ..Default::default()
        }],
        ..Default::default()
    };
    let result = SparkplugBPayloadDecoder::new().decode(&proto.encode_to_vec());
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_decoder_rejects_truncated_array() {
    let proto = pb::Payload {
        metrics: vec![pb::Metric {
            name: Some("short".to_string()),
            datatype: Some(MetricDataType::Int32Array.code()),
            value: Some(pb::metric::Value::BytesValue(vec![1, 2, 3, 4, 5])),
            ..Default::default()
        }],
        ..Default::default()
    };
    let result = SparkplugBPayloadDecoder::new().decode(&proto.encode_to_vec());
    assert!(matches!(result, Err(Error::TruncatedArray { .. })));
}

#[test]
fn test_decoder_rejects_garbage() {
    let result = SparkplugBPayloadDecoder::new().decode(&[0xFF, 0xFF, 0xFF, 0xFF]);
    assert!(matches!(result, Err(Error::InvalidWire(_))));
}

#[test]
fn test_file_synthesizes_metadata() {
    let mut metric = Metric::new(
        "firmware",
        MetricDataType::File,
        MetricValue::File(File {
            file_name: "fw-1.2.bin".to_string(),
            bytes: vec![1, 2, 3],
        }),
    );
    metric.metadata = Some(MetaData {
        md5: Some("abc123".to_string()),
        ..Default::default()
    });
    let payload = single_metric_payload(metric);

    let proto = pb::Payload::decode(encode(&payload).as_slice()).unwrap();
    let metadata = proto.metrics[0].metadata.as_ref().unwrap();
    // The File's name is merged with, not replaced by, the explicit metadata.
    assert_eq!(metadata.file_name.as_deref(), Some("fw-1.2.bin"));
    assert_eq!(metadata.md5.as_deref(), Some("abc123"));

    let decoded = decode(&encode(&payload));
    match decoded.metrics[0].value.as_ref().unwrap() {
        MetricValue::File(file) => {
            assert_eq!(file.file_name, "fw-1.2.bin");
            assert_eq!(file.bytes, vec![1, 2, 3]);
        }
        other => panic!("expected File, got {:?}", other),
    }
}

#[test]
fn test_property_set_round_trip_preserves_order() {
    let mut properties = PropertySet::new();
    properties.insert(
        "engUnit",
        PropertyValue::new(
            PropertyDataType::String,
            PropertyValueKind::Scalar(ScalarValue::String("degC".to_string())),
        ),
    );
    properties.insert(
        "engHigh",
        PropertyValue::new(
            PropertyDataType::Double,
            PropertyValueKind::Scalar(ScalarValue::Double(100.0)),
        ),
    );
    properties.insert("engLow", PropertyValue::null(PropertyDataType::Double));

    let mut metric = Metric::new("temp", MetricDataType::Double, MetricValue::Double(21.0));
    metric.properties = Some(properties.clone());
    let payload = single_metric_payload(metric);

    let decoded = round_trip(&payload);
    let decoded_props = decoded.metrics[0].properties.as_ref().unwrap();
    let keys: Vec<&str> = decoded_props.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["engUnit", "engHigh", "engLow"]);
    assert!(decoded_props.get("engLow").unwrap().is_null());
    assert_eq!(decoded_props, &properties);
}

#[test]
fn test_nested_property_set() {
    let mut inner = PropertySet::new();
    inner.insert(
        "nested",
        PropertyValue::new(
            PropertyDataType::Boolean,
            PropertyValueKind::Scalar(ScalarValue::Boolean(true)),
        ),
    );
    let mut outer = PropertySet::new();
    outer.insert(
        "child",
        PropertyValue::new(
            PropertyDataType::PropertySet,
            PropertyValueKind::PropertySet(inner),
        ),
    );
    outer.insert(
        "children",
        PropertyValue::new(
            PropertyDataType::PropertySetList,
            PropertyValueKind::PropertySetList(vec![PropertySet::new()]),
        ),
    );

    let mut metric = Metric::new("m", MetricDataType::Int32, MetricValue::Int32(1));
    metric.properties = Some(outer.clone());
    let decoded = round_trip(&single_metric_payload(metric));
    assert_eq!(decoded.metrics[0].properties.as_ref(), Some(&outer));
}

#[test]
fn test_dataset_round_trip() {
    let dataset = DataSet::new(
        vec!["name".to_string(), "value".to_string(), "ok".to_string()],
        vec![
            DataSetDataType::String,
            DataSetDataType::Double,
            DataSetDataType::Boolean,
        ],
        vec![
            Row::new(vec![
                Some(ScalarValue::String("a".to_string())),
                Some(ScalarValue::Double(1.0)),
                Some(ScalarValue::Boolean(true)),
            ]),
            Row::new(vec![
                Some(ScalarValue::String("b".to_string())),
                None,
                Some(ScalarValue::Boolean(false)),
            ]),
        ],
    );
    let payload = single_metric_payload(Metric::new(
        "table",
        MetricDataType::DataSet,
        MetricValue::DataSet(dataset.clone()),
    ));
    let decoded = round_trip(&payload);
    assert_eq!(
        decoded.metrics[0].value,
        Some(MetricValue::DataSet(dataset))
    );
}

#[test]
fn test_dataset_cell_type_mismatch_rejected() {
    let dataset = DataSet::new(
        vec!["value".to_string()],
        vec![DataSetDataType::Double],
        vec![Row::new(vec![Some(ScalarValue::Boolean(true))])],
    );
    let payload = single_metric_payload(Metric::new(
        "table",
        MetricDataType::DataSet,
        MetricValue::DataSet(dataset),
    ));
    assert!(matches!(
        SparkplugBPayloadEncoder::new().encode(&payload),
        Err(Error::InvalidType { .. })
    ));
}

#[test]
fn test_template_round_trip() {
    let definition = Template {
        version: Some("1.0".to_string()),
        template_ref: None,
        is_definition: true,
        metrics: vec![
            Metric::new("setpoint", MetricDataType::Double, MetricValue::Double(0.0)),
            Metric::null("status", MetricDataType::String),
        ],
        parameters: vec![Parameter::new(
            "scale",
            ParameterDataType::Float,
            Some(ScalarValue::Float(1.5)),
        )],
    };
    let payload = single_metric_payload(Metric::new(
        "motorType",
        MetricDataType::Template,
        MetricValue::Template(definition.clone()),
    ));
    let decoded = round_trip(&payload);
    assert_eq!(
        decoded.metrics[0].value,
        Some(MetricValue::Template(definition))
    );
}

#[test]
fn test_template_instance_requires_ref() {
    let instance = Template {
        version: None,
        template_ref: None,
        is_definition: false,
        metrics: vec![],
        parameters: vec![],
    };
    let payload = single_metric_payload(Metric::new(
        "motor1",
        MetricDataType::Template,
        MetricValue::Template(instance),
    ));
    assert!(matches!(
        SparkplugBPayloadEncoder::new().encode(&payload),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_template_definition_forbids_ref() {
    let template = Template {
        version: None,
        template_ref: Some("motorType".to_string()),
        is_definition: true,
        metrics: vec![],
        parameters: vec![],
    };
    let payload = single_metric_payload(Metric::new(
        "bad",
        MetricDataType::Template,
        MetricValue::Template(template),
    ));
    assert!(matches!(
        SparkplugBPayloadEncoder::new().encode(&payload),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_nested_template() {
    let inner = Template {
        version: None,
        template_ref: Some("innerType".to_string()),
        is_definition: false,
        metrics: vec![Metric::new(
            "x",
            MetricDataType::Int32,
            MetricValue::Int32(5),
        )],
        parameters: vec![],
    };
    let outer = Template {
        version: None,
        template_ref: None,
        is_definition: true,
        metrics: vec![Metric::new(
            "inner",
            MetricDataType::Template,
            MetricValue::Template(inner),
        )],
        parameters: vec![],
    };
    let payload = single_metric_payload(Metric::new(
        "outerType",
        MetricDataType::Template,
        MetricValue::Template(outer.clone()),
    ));
    let decoded = round_trip(&payload);
    assert_eq!(decoded.metrics[0].value, Some(MetricValue::Template(outer)));
}

#[test]
fn test_builder_fluent_payload() {
    let mut builder = PayloadBuilder::new();
    builder
        .set_timestamp(1_700_000_000_000)
        .set_seq(3)
        .add_int32("count", -5)
        .add_double_with_alias("temp", 1, 21.5)
        .add_bool_by_alias(2, true)
        .add_string("unit", "degC");

    let decoded = decode(&builder.serialize().unwrap());
    assert_eq!(decoded.timestamp, Some(1_700_000_000_000));
    assert_eq!(decoded.seq, Some(3));
    assert_eq!(decoded.metrics.len(), 4);
    assert_eq!(decoded.metrics[1].alias, Some(1));
    assert_eq!(decoded.metrics[2].name, None);
}

#[test]
fn test_builder_checked_ingress() {
    let mut builder = PayloadBuilder::new();
    assert!(builder.add_uint64_checked("ok", (1i128 << 64) - 1).is_ok());
    assert!(builder.add_uint64_checked("bad", 1i128 << 64).is_err());
    assert!(builder.add_uint32_checked("bad", -1).is_err());
}

#[test]
fn test_metric_flags_round_trip() {
    let mut metric = Metric::new("h", MetricDataType::Int32, MetricValue::Int32(9));
    metric.is_historical = true;
    metric.is_transient = true;
    metric.timestamp = Some(123);
    let decoded = round_trip(&single_metric_payload(metric));
    assert!(decoded.metrics[0].is_historical);
    assert!(decoded.metrics[0].is_transient);
    assert_eq!(decoded.metrics[0].timestamp, Some(123));
}

#[test]
fn test_bd_seq_extraction() {
    let mut builder = PayloadBuilder::new();
    builder.set_seq(0).add_uint64("bdSeq", 7);
    let decoded = decode(&builder.serialize().unwrap());
    assert_eq!(decoded.bd_seq(), Some(7));
}

#[test]
fn test_peek_seq() {
    let mut builder = PayloadBuilder::new();
    builder.set_seq(200).add_int32("m", 1);
    let bytes = builder.serialize().unwrap();
    assert_eq!(SparkplugBPayloadDecoder::peek_seq(&bytes), Some(200));
    assert_eq!(SparkplugBPayloadDecoder::peek_seq(&[0xFF]), None);
}

#[test]
fn test_unicode_strings() {
    let mut builder = PayloadBuilder::new();
    builder
        .add_string("温度", "value1")
        .add_string("name", "Hello 世界 🌍");
    let decoded = decode(&builder.serialize().unwrap());
    assert_eq!(decoded.metrics[0].name.as_deref(), Some("温度"));
    assert_eq!(
        decoded.metrics[1].value,
        Some(MetricValue::String("Hello 世界 🌍".to_string()))
    );
}
