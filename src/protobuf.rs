//! The Sparkplug B protobuf wire schema.
//!
//! Hand-annotated `prost` messages matching the Sparkplug B payload schema
//! field-for-field (proto2 semantics: optional scalars, unpacked repeated
//! fields). The codec in [`crate::payload`] bridges these to the typed model
//! in [`crate::types`]; nothing outside the codec should need to touch these
//! directly.

/// Top-level Sparkplug B payload message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Payload {
    /// Timestamp in milliseconds since the Unix epoch.
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    /// Ordered metrics.
    #[prost(message, repeated, tag = "2")]
    pub metrics: Vec<Metric>,
    /// Per-edge-node sequence number.
    #[prost(uint64, optional, tag = "3")]
    pub seq: Option<u64>,
    /// Payload UUID.
    #[prost(string, optional, tag = "4")]
    pub uuid: Option<String>,
    /// Opaque body bytes.
    #[prost(bytes = "vec", optional, tag = "5")]
    pub body: Option<Vec<u8>>,
}

/// A single metric.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metric {
    /// Metric name; cleared for alias-only references.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Metric alias.
    #[prost(uint64, optional, tag = "2")]
    pub alias: Option<u64>,
    /// Timestamp in milliseconds since the Unix epoch.
    #[prost(uint64, optional, tag = "3")]
    pub timestamp: Option<u64>,
    /// Data type code; see [`crate::types::MetricDataType`].
    #[prost(uint32, optional, tag = "4")]
    pub datatype: Option<u32>,
    /// Whether the value is historical.
    #[prost(bool, optional, tag = "5")]
    pub is_historical: Option<bool>,
    /// Whether the value is transient.
    #[prost(bool, optional, tag = "6")]
    pub is_transient: Option<bool>,
    /// Whether the value is null.
    #[prost(bool, optional, tag = "7")]
    pub is_null: Option<bool>,
    /// Optional metadata.
    #[prost(message, optional, tag = "8")]
    pub metadata: Option<MetaData>,
    /// Optional property set.
    #[prost(message, optional, tag = "9")]
    pub properties: Option<PropertySet>,
    /// The typed value.
    #[prost(oneof = "metric::Value", tags = "10, 11, 12, 13, 14, 15, 16, 17, 18")]
    pub value: Option<metric::Value>,
}

/// Nested types for [`Metric`].
pub mod metric {
    /// The metric value oneof.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        /// Narrow integers, zero-extended.
        #[prost(uint32, tag = "10")]
        IntValue(u32),
        /// Wide integers and millisecond timestamps.
        #[prost(uint64, tag = "11")]
        LongValue(u64),
        /// IEEE-754 single precision.
        #[prost(float, tag = "12")]
        FloatValue(f32),
        /// IEEE-754 double precision.
        #[prost(double, tag = "13")]
        DoubleValue(f64),
        /// Boolean.
        #[prost(bool, tag = "14")]
        BooleanValue(bool),
        /// UTF-8 string.
        #[prost(string, tag = "15")]
        StringValue(String),
        /// Raw bytes, including all packed array encodings.
        #[prost(bytes, tag = "16")]
        BytesValue(Vec<u8>),
        /// Data set value.
        #[prost(message, tag = "17")]
        DatasetValue(super::DataSet),
        /// Template value.
        #[prost(message, tag = "18")]
        TemplateValue(super::Template),
    }
}

/// Metric metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetaData {
    /// Whether the value is one chunk of a multi-part transfer.
    #[prost(bool, optional, tag = "1")]
    pub is_multi_part: Option<bool>,
    /// MIME content type.
    #[prost(string, optional, tag = "2")]
    pub content_type: Option<String>,
    /// Total size in bytes.
    #[prost(uint64, optional, tag = "3")]
    pub size: Option<u64>,
    /// Multi-part chunk sequence number.
    #[prost(uint64, optional, tag = "4")]
    pub seq: Option<u64>,
    /// File name.
    #[prost(string, optional, tag = "5")]
    pub file_name: Option<String>,
    /// File type.
    #[prost(string, optional, tag = "6")]
    pub file_type: Option<String>,
    /// MD5 digest.
    #[prost(string, optional, tag = "7")]
    pub md5: Option<String>,
    /// Free-form description.
    #[prost(string, optional, tag = "8")]
    pub description: Option<String>,
}

/// A property set: parallel key and value sequences.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PropertySet {
    /// Property keys, positionally paired with `values`.
    #[prost(string, repeated, tag = "1")]
    pub keys: Vec<String>,
    /// Property values, positionally paired with `keys`.
    #[prost(message, repeated, tag = "2")]
    pub values: Vec<PropertyValue>,
}

/// A single property value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PropertyValue {
    /// Data type code; see [`crate::types::PropertyDataType`].
    #[prost(uint32, optional, tag = "1")]
    pub r#type: Option<u32>,
    /// Whether the value is null.
    #[prost(bool, optional, tag = "2")]
    pub is_null: Option<bool>,
    /// The typed value.
    #[prost(oneof = "property_value::Value", tags = "3, 4, 5, 6, 7, 8, 9, 10")]
    pub value: Option<property_value::Value>,
}

/// Nested types for [`PropertyValue`].
pub mod property_value {
    /// The property value oneof.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        /// Narrow integers, zero-extended.
        #[prost(uint32, tag = "3")]
        IntValue(u32),
        /// Wide integers and millisecond timestamps.
        #[prost(uint64, tag = "4")]
        LongValue(u64),
        /// IEEE-754 single precision.
        #[prost(float, tag = "5")]
        FloatValue(f32),
        /// IEEE-754 double precision.
        #[prost(double, tag = "6")]
        DoubleValue(f64),
        /// Boolean.
        #[prost(bool, tag = "7")]
        BooleanValue(bool),
        /// UTF-8 string.
        #[prost(string, tag = "8")]
        StringValue(String),
        /// Nested property set.
        #[prost(message, tag = "9")]
        PropertysetValue(super::PropertySet),
        /// List of nested property sets.
        #[prost(message, tag = "10")]
        PropertysetsValue(super::PropertySetList),
    }
}

/// A list of property sets.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PropertySetList {
    /// Member property sets.
    #[prost(message, repeated, tag = "1")]
    pub propertyset: Vec<PropertySet>,
}

/// A tabular data set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataSet {
    /// Number of columns.
    #[prost(uint64, optional, tag = "1")]
    pub num_of_columns: Option<u64>,
    /// Column names.
    #[prost(string, repeated, tag = "2")]
    pub columns: Vec<String>,
    /// Column type codes; see [`crate::types::DataSetDataType`].
    #[prost(uint32, repeated, packed = "false", tag = "3")]
    pub types: Vec<u32>,
    /// Data rows.
    #[prost(message, repeated, tag = "4")]
    pub rows: Vec<Row>,
}

/// One data set row.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Row {
    /// Cell values, positionally matching the column types.
    #[prost(message, repeated, tag = "1")]
    pub elements: Vec<DataSetValue>,
}

/// One data set cell.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataSetValue {
    /// The typed cell value; unset means a null cell.
    #[prost(oneof = "data_set_value::Value", tags = "1, 2, 3, 4, 5, 6")]
    pub value: Option<data_set_value::Value>,
}

/// Nested types for [`DataSetValue`].
pub mod data_set_value {
    /// The cell value oneof.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        /// Narrow integers, zero-extended.
        #[prost(uint32, tag = "1")]
        IntValue(u32),
        /// Wide integers and millisecond timestamps.
        #[prost(uint64, tag = "2")]
        LongValue(u64),
        /// IEEE-754 single precision.
        #[prost(float, tag = "3")]
        FloatValue(f32),
        /// IEEE-754 double precision.
        #[prost(double, tag = "4")]
        DoubleValue(f64),
        /// Boolean.
        #[prost(bool, tag = "5")]
        BooleanValue(bool),
        /// UTF-8 string.
        #[prost(string, tag = "6")]
        StringValue(String),
    }
}

/// A template definition or instance.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Template {
    /// Schema version.
    #[prost(string, optional, tag = "1")]
    pub version: Option<String>,
    /// Member metrics.
    #[prost(message, repeated, tag = "2")]
    pub metrics: Vec<Metric>,
    /// Template parameters.
    #[prost(message, repeated, tag = "3")]
    pub parameters: Vec<Parameter>,
    /// Name of the referenced definition.
    #[prost(string, optional, tag = "4")]
    pub template_ref: Option<String>,
    /// Whether this is a definition.
    #[prost(bool, optional, tag = "5")]
    pub is_definition: Option<bool>,
}

/// A template parameter.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Parameter {
    /// Parameter name.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Data type code; see [`crate::types::ParameterDataType`].
    #[prost(uint32, optional, tag = "2")]
    pub r#type: Option<u32>,
    /// The typed value.
    #[prost(oneof = "parameter::Value", tags = "3, 4, 5, 6, 7, 8")]
    pub value: Option<parameter::Value>,
}

/// Nested types for [`Parameter`].
pub mod parameter {
    /// The parameter value oneof.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        /// Narrow integers, zero-extended.
        #[prost(uint32, tag = "3")]
        IntValue(u32),
        /// Wide integers and millisecond timestamps.
        #[prost(uint64, tag = "4")]
        LongValue(u64),
        /// IEEE-754 single precision.
        #[prost(float, tag = "5")]
        FloatValue(f32),
        /// IEEE-754 double precision.
        #[prost(double, tag = "6")]
        DoubleValue(f64),
        /// Boolean.
        #[prost(bool, tag = "7")]
        BooleanValue(bool),
        /// UTF-8 string.
        #[prost(string, tag = "8")]
        StringValue(String),
    }
}
