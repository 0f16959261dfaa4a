//! Tests for type conversions and data types

use sparkplug_mqtt::{
    DataSet, DataSetDataType, Error, MetricDataType, MetricValue, PropertyDataType, PropertySet,
    PropertyValue, PropertyValueKind, Row, ScalarValue,
};

#[test]
fn test_metric_datatype_codes() {
    // The wire code table is fixed by the Sparkplug specification.
    let expected: &[(MetricDataType, u32)] = &[
        (MetricDataType::Unknown, 0),
        (MetricDataType::Int8, 1),
        (MetricDataType::Int16, 2),
        (MetricDataType::Int32, 3),
        (MetricDataType::Int64, 4),
        (MetricDataType::UInt8, 5),
        (MetricDataType::UInt16, 6),
        (MetricDataType::UInt32, 7),
        (MetricDataType::UInt64, 8),
        (MetricDataType::Float, 9),
        (MetricDataType::Double, 10),
        (MetricDataType::Boolean, 11),
        (MetricDataType::String, 12),
        (MetricDataType::DateTime, 13),
        (MetricDataType::Text, 14),
        (MetricDataType::Uuid, 15),
        (MetricDataType::DataSet, 16),
        (MetricDataType::Bytes, 17),
        (MetricDataType::File, 18),
        (MetricDataType::Template, 19),
        (MetricDataType::Int8Array, 22),
        (MetricDataType::Int16Array, 23),
        (MetricDataType::Int32Array, 24),
        (MetricDataType::Int64Array, 25),
        (MetricDataType::UInt8Array, 26),
        (MetricDataType::UInt16Array, 27),
        (MetricDataType::UInt32Array, 28),
        (MetricDataType::UInt64Array, 29),
        (MetricDataType::FloatArray, 30),
        (MetricDataType::DoubleArray, 31),
        (MetricDataType::BooleanArray, 32),
        (MetricDataType::StringArray, 33),
        (MetricDataType::DateTimeArray, 34),
    ];
    assert_eq!(expected.len(), 33, "all metric data types covered");

    for (data_type, code) in expected {
        assert_eq!(data_type.code(), *code);
        assert_eq!(MetricDataType::from_code(*code).unwrap(), *data_type);
    }

    // 20/21 are the property-only set types, never metric data types.
    assert!(MetricDataType::from_code(20).is_err());
    assert!(MetricDataType::from_code(21).is_err());
    assert!(MetricDataType::from_code(35).is_err());
}

#[test]
fn test_property_datatype_codes() {
    assert_eq!(PropertyDataType::PropertySet.code(), 20);
    assert_eq!(PropertyDataType::PropertySetList.code(), 21);
    assert_eq!(
        PropertyDataType::from_code(20).unwrap(),
        PropertyDataType::PropertySet
    );
    // Arrays are not legal property types.
    assert!(PropertyDataType::from_code(22).is_err());
}

#[test]
fn test_value_shape_natural_type() {
    assert_eq!(MetricValue::Int8(1).data_type(), MetricDataType::Int8);
    assert_eq!(MetricValue::UInt64(1).data_type(), MetricDataType::UInt64);
    assert_eq!(
        MetricValue::StringArray(vec![]).data_type(),
        MetricDataType::StringArray
    );
    assert_eq!(
        MetricValue::DateTime(0).data_type(),
        MetricDataType::DateTime
    );
}

#[test]
fn test_metric_value_equality_and_clone() {
    assert_eq!(MetricValue::Int32(42), MetricValue::Int32(42));
    assert_ne!(MetricValue::Int32(42), MetricValue::Int32(43));

    let value = MetricValue::String("test".to_string());
    assert_eq!(value.clone(), value);
}

#[test]
fn test_coerce_boolean_from_numbers() {
    assert!(!MetricValue::Int32(0).coerce_boolean().unwrap());
    assert!(MetricValue::Int32(-7).coerce_boolean().unwrap());
    assert!(!MetricValue::UInt64(0).coerce_boolean().unwrap());
    assert!(MetricValue::UInt64(1).coerce_boolean().unwrap());
    assert!(!MetricValue::Double(0.0).coerce_boolean().unwrap());
    assert!(MetricValue::Double(0.5).coerce_boolean().unwrap());
}

#[test]
fn test_coerce_boolean_from_strings() {
    assert!(MetricValue::String("true".to_string())
        .coerce_boolean()
        .unwrap());
    assert!(MetricValue::String("TRUE".to_string())
        .coerce_boolean()
        .unwrap());
    assert!(!MetricValue::String("False".to_string())
        .coerce_boolean()
        .unwrap());

    assert!(matches!(
        MetricValue::String("yes".to_string()).coerce_boolean(),
        Err(Error::InvalidType { .. })
    ));
}

#[test]
fn test_coerce_boolean_rejects_other_shapes() {
    assert!(matches!(
        MetricValue::Bytes(vec![1]).coerce_boolean(),
        Err(Error::InvalidType { .. })
    ));
    assert!(matches!(
        MetricValue::BooleanArray(vec![true]).coerce_boolean(),
        Err(Error::InvalidType { .. })
    ));
}

#[test]
fn test_property_set_insertion_order() {
    let mut set = PropertySet::new();
    set.insert(
        "z",
        PropertyValue::new(
            PropertyDataType::Int32,
            PropertyValueKind::Scalar(ScalarValue::Int32(1)),
        ),
    );
    set.insert(
        "a",
        PropertyValue::new(
            PropertyDataType::Int32,
            PropertyValueKind::Scalar(ScalarValue::Int32(2)),
        ),
    );
    set.insert(
        "m",
        PropertyValue::new(
            PropertyDataType::Int32,
            PropertyValueKind::Scalar(ScalarValue::Int32(3)),
        ),
    );

    let keys: Vec<&str> = set.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["z", "a", "m"], "insertion order is preserved");

    // Re-inserting replaces in place rather than moving to the back.
    set.insert(
        "a",
        PropertyValue::new(
            PropertyDataType::Int32,
            PropertyValueKind::Scalar(ScalarValue::Int32(9)),
        ),
    );
    let keys: Vec<&str> = set.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["z", "a", "m"]);
    assert_eq!(set.len(), 3);
}

#[test]
fn test_dataset_validation() {
    let good = DataSet::new(
        vec!["a".to_string(), "b".to_string()],
        vec![DataSetDataType::Int32, DataSetDataType::String],
        vec![Row::new(vec![
            Some(ScalarValue::Int32(1)),
            Some(ScalarValue::String("x".to_string())),
        ])],
    );
    assert!(good.validate().is_ok());

    // Row width disagrees with the column count.
    let ragged = DataSet::new(
        vec!["a".to_string()],
        vec![DataSetDataType::Int32],
        vec![Row::new(vec![
            Some(ScalarValue::Int32(1)),
            Some(ScalarValue::Int32(2)),
        ])],
    );
    assert!(ragged.validate().is_err());

    // Mismatched name/type lengths.
    let mut lopsided = DataSet::new(
        vec!["a".to_string(), "b".to_string()],
        vec![DataSetDataType::Int32],
        vec![],
    );
    lopsided.num_of_columns = 2;
    assert!(lopsided.validate().is_err());
}

#[test]
fn test_scalar_matches_dataset_type() {
    assert!(ScalarValue::Int32(5).matches_dataset_type(DataSetDataType::Int32));
    assert!(!ScalarValue::Int32(5).matches_dataset_type(DataSetDataType::Int64));
    assert!(ScalarValue::Text("t".to_string()).matches_dataset_type(DataSetDataType::Text));
}

#[test]
fn test_checked_ingress() {
    assert_eq!(
        MetricValue::uint32_checked(7).unwrap(),
        MetricValue::UInt32(7)
    );
    assert_eq!(
        MetricValue::uint64_checked(7).unwrap(),
        MetricValue::UInt64(7)
    );
    assert!(MetricValue::uint32_checked(1i64 << 40).is_err());
}
