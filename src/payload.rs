//! Sparkplug payload building, encoding and decoding.
//!
//! [`SparkplugBPayloadEncoder`] and [`SparkplugBPayloadDecoder`] translate
//! losslessly between the typed model in [`crate::types`] and the protobuf
//! wire schema in [`crate::protobuf`]. [`PayloadBuilder`] offers a fluent way
//! to assemble payloads for the common scalar types.
//!
//! The per-type wire rules are strict: narrow signed integers travel as the
//! zero-extended bits of their two's-complement representation, unsigned
//! widths are widened without sign, arrays are packed little-endian into the
//! `bytes` field, and a value whose runtime shape disagrees with its declared
//! data type is rejected rather than coerced.

use prost::Message;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::protobuf as pb;
use crate::types::{
    DataSet, DataSetDataType, File, MetaData, Metric, MetricDataType, MetricValue, Parameter,
    ParameterDataType, PropertyDataType, PropertySet, PropertyValue, PropertyValueKind, Row,
    ScalarValue, SparkplugBPayload, Template,
};

/// Encodes [`SparkplugBPayload`] values to Sparkplug B wire bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SparkplugBPayloadEncoder;

impl SparkplugBPayloadEncoder {
    /// Creates an encoder.
    pub fn new() -> Self {
        Self
    }

    /// Encodes a payload, failing if any metric's value shape is inconsistent
    /// with its declared data type.
    pub fn encode(&self, payload: &SparkplugBPayload) -> Result<Vec<u8>> {
        let mut proto = pb::Payload {
            timestamp: payload.timestamp,
            seq: payload.seq,
            uuid: payload.uuid.clone(),
            body: payload.body.clone(),
            metrics: Vec::with_capacity(payload.metrics.len()),
        };

        for metric in &payload.metrics {
            match convert_metric(metric) {
                Ok(m) => proto.metrics.push(m),
                Err(e) => {
                    error!(name = ?metric.name, "failed to encode metric: {e}");
                    return Err(e);
                }
            }
        }

        Ok(proto.encode_to_vec())
    }
}

/// Decodes Sparkplug B wire bytes into [`SparkplugBPayload`] values.
#[derive(Debug, Default, Clone, Copy)]
pub struct SparkplugBPayloadDecoder;

impl SparkplugBPayloadDecoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self
    }

    /// Reads only the envelope `seq` field out of wire bytes.
    ///
    /// The reorder manager needs the sequence number before the payload is
    /// fully decoded on a shard worker.
    pub fn peek_seq(bytes: &[u8]) -> Option<u64> {
        pb::Payload::decode(bytes).ok().and_then(|p| p.seq)
    }

    /// Decodes a payload.
    ///
    /// Unknown protobuf fields are tolerated for forward compatibility, but a
    /// metric whose declared data type disagrees with the value field it
    /// carries is rejected.
    pub fn decode(&self, bytes: &[u8]) -> Result<SparkplugBPayload> {
        let proto = pb::Payload::decode(bytes)?;
        debug!(metrics = proto.metrics.len(), "decoded payload envelope");

        let mut metrics = Vec::with_capacity(proto.metrics.len());
        for metric in &proto.metrics {
            metrics.push(decode_metric(metric)?);
        }

        Ok(SparkplugBPayload {
            timestamp: proto.timestamp,
            seq: proto.seq,
            uuid: proto.uuid,
            metrics,
            body: proto.body,
        })
    }
}

fn convert_metric(metric: &Metric) -> Result<pb::Metric> {
    if metric.data_type == MetricDataType::Unknown {
        return Err(Error::UnknownType(metric.data_type.code()));
    }

    let mut out = pb::Metric {
        name: metric.name.clone(),
        alias: metric.alias,
        timestamp: metric.timestamp,
        datatype: Some(metric.data_type.code()),
        is_historical: metric.is_historical.then_some(true),
        is_transient: metric.is_transient.then_some(true),
        is_null: None,
        metadata: None,
        properties: None,
        value: None,
    };

    // File values synthesize a file_name which explicit metadata then overlays.
    let mut synthesized_file_name = None;

    match &metric.value {
        None => out.is_null = Some(true),
        Some(value) => {
            if let MetricValue::File(file) = value {
                synthesized_file_name = Some(file.file_name.clone());
            }
            out.value = Some(convert_metric_value(metric.data_type, value)?);
        }
    }

    out.metadata = merge_metadata(metric.metadata.as_ref(), synthesized_file_name);

    if let Some(properties) = &metric.properties {
        out.properties = Some(convert_property_set(properties)?);
    }

    Ok(out)
}

fn merge_metadata(
    explicit: Option<&MetaData>,
    synthesized_file_name: Option<String>,
) -> Option<pb::MetaData> {
    if explicit.is_none() && synthesized_file_name.is_none() {
        return None;
    }
    let mut md = pb::MetaData {
        file_name: synthesized_file_name,
        ..Default::default()
    };
    if let Some(meta) = explicit {
        if meta.content_type.is_some() {
            md.content_type = meta.content_type.clone();
        }
        if meta.size.is_some() {
            md.size = meta.size;
        }
        if meta.seq.is_some() {
            md.seq = meta.seq;
        }
        if meta.file_name.is_some() {
            md.file_name = meta.file_name.clone();
        }
        if meta.file_type.is_some() {
            md.file_type = meta.file_type.clone();
        }
        if meta.md5.is_some() {
            md.md5 = meta.md5.clone();
        }
        if meta.description.is_some() {
            md.description = meta.description.clone();
        }
        if meta.is_multi_part.is_some() {
            md.is_multi_part = meta.is_multi_part;
        }
    }
    Some(md)
}

fn type_error(expected: &'static str, value: &MetricValue) -> Error {
    Error::InvalidType {
        expected,
        got: format!("{:?}", value.data_type()),
    }
}

fn convert_metric_value(
    data_type: MetricDataType,
    value: &MetricValue,
) -> Result<pb::metric::Value> {
    use pb::metric::Value as W;
    use MetricDataType as T;

    Ok(match (data_type, value) {
        // Narrow signed widths: zero-extended two's complement.
        (T::Int8, MetricValue::Int8(v)) => W::IntValue(u32::from(*v as u8)),
        (T::Int16, MetricValue::Int16(v)) => W::IntValue(u32::from(*v as u16)),
        (T::Int32, MetricValue::Int32(v)) => W::IntValue(*v as u32),
        (T::Int64, MetricValue::Int64(v)) => W::LongValue(*v as u64),
        // Unsigned widths: always widening, zero-extended.
        (T::UInt8, MetricValue::UInt8(v)) => W::IntValue(u32::from(*v)),
        (T::UInt16, MetricValue::UInt16(v)) => W::IntValue(u32::from(*v)),
        (T::UInt32, MetricValue::UInt32(v)) => W::LongValue(u64::from(*v)),
        (T::UInt64, MetricValue::UInt64(v)) => W::LongValue(*v),
        (T::Float, MetricValue::Float(v)) => W::FloatValue(*v),
        (T::Double, MetricValue::Double(v)) => W::DoubleValue(*v),
        (T::Boolean, value) => W::BooleanValue(value.coerce_boolean()?),
        (T::DateTime, MetricValue::DateTime(v)) => W::LongValue(*v),
        (T::String, MetricValue::String(v)) => W::StringValue(v.clone()),
        (T::Text, MetricValue::Text(v)) | (T::Text, MetricValue::String(v)) => {
            W::StringValue(v.clone())
        }
        (T::Uuid, MetricValue::Uuid(v)) | (T::Uuid, MetricValue::String(v)) => {
            W::StringValue(v.clone())
        }
        (T::Bytes, MetricValue::Bytes(v)) => W::BytesValue(v.clone()),
        (T::File, MetricValue::File(File { bytes, .. })) => W::BytesValue(bytes.clone()),
        (T::DataSet, MetricValue::DataSet(ds)) => W::DatasetValue(convert_dataset(ds)?),
        (T::Template, MetricValue::Template(t)) => W::TemplateValue(convert_template(t)?),
        // Packed arrays, little-endian.
        (T::Int8Array, MetricValue::Int8Array(v)) => {
            W::BytesValue(v.iter().map(|x| *x as u8).collect())
        }
        (T::Int16Array, MetricValue::Int16Array(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::Int32Array, MetricValue::Int32Array(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::Int64Array, MetricValue::Int64Array(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::UInt8Array, MetricValue::UInt8Array(v)) => W::BytesValue(v.clone()),
        (T::UInt16Array, MetricValue::UInt16Array(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::UInt32Array, MetricValue::UInt32Array(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::UInt64Array, MetricValue::UInt64Array(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::FloatArray, MetricValue::FloatArray(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::DoubleArray, MetricValue::DoubleArray(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::BooleanArray, MetricValue::BooleanArray(v)) => W::BytesValue(pack_boolean_array(v)),
        (T::StringArray, MetricValue::StringArray(v)) => W::BytesValue(pack_string_array(v)),
        (T::DateTimeArray, MetricValue::DateTimeArray(v)) => {
            W::BytesValue(v.iter().flat_map(|x| x.to_le_bytes()).collect())
        }
        (T::Unknown, _) => return Err(Error::UnknownType(0)),
        (declared, value) => return Err(type_error(declared.name(), value)),
    })
}

fn pack_boolean_array(values: &[bool]) -> Vec<u8> {
    let num_bytes = values.len().div_ceil(8);
    let mut out = Vec::with_capacity(4 + num_bytes);
    // 4-byte little-endian element count, then big-endian bit order per byte.
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for i in 0..num_bytes {
        let mut byte = 0u8;
        for bit in 0..8 {
            let index = i * 8 + bit;
            if index < values.len() && values[index] {
                byte |= 128 >> bit;
            }
        }
        out.push(byte);
    }
    out
}

fn pack_string_array(values: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.iter().map(|s| s.len() + 1).sum());
    for value in values {
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    out
}

fn convert_dataset(dataset: &DataSet) -> Result<pb::DataSet> {
    dataset.validate()?;

    let mut rows = Vec::with_capacity(dataset.rows.len());
    for row in &dataset.rows {
        let mut elements = Vec::with_capacity(row.values.len());
        for cell in &row.values {
            elements.push(pb::DataSetValue {
                value: cell.as_ref().map(convert_scalar_cell).transpose()?,
            });
        }
        rows.push(pb::Row { elements });
    }

    Ok(pb::DataSet {
        num_of_columns: Some(dataset.num_of_columns),
        columns: dataset.column_names.clone(),
        types: dataset.column_types.iter().map(|t| t.code()).collect(),
        rows,
    })
}

fn convert_scalar_cell(value: &ScalarValue) -> Result<pb::data_set_value::Value> {
    use pb::data_set_value::Value as W;
    Ok(match value {
        ScalarValue::Int8(v) => W::IntValue(u32::from(*v as u8)),
        ScalarValue::Int16(v) => W::IntValue(u32::from(*v as u16)),
        ScalarValue::Int32(v) => W::IntValue(*v as u32),
        ScalarValue::Int64(v) => W::LongValue(*v as u64),
        ScalarValue::UInt8(v) => W::IntValue(u32::from(*v)),
        ScalarValue::UInt16(v) => W::IntValue(u32::from(*v)),
        ScalarValue::UInt32(v) => W::LongValue(u64::from(*v)),
        ScalarValue::UInt64(v) => W::LongValue(*v),
        ScalarValue::Float(v) => W::FloatValue(*v),
        ScalarValue::Double(v) => W::DoubleValue(*v),
        ScalarValue::Boolean(v) => W::BooleanValue(*v),
        ScalarValue::String(v) | ScalarValue::Text(v) => W::StringValue(v.clone()),
        ScalarValue::DateTime(v) => W::LongValue(*v),
    })
}

fn convert_template(template: &Template) -> Result<pb::Template> {
    // A definition declares the schema; only instances reference one by name.
    if template.is_definition && template.template_ref.is_some() {
        return Err(Error::InvalidArgument(
            "template definitions must not carry a template_ref".to_string(),
        ));
    }
    if !template.is_definition && template.template_ref.is_none() {
        return Err(Error::InvalidArgument(
            "template instances require a template_ref".to_string(),
        ));
    }

    let mut metrics = Vec::with_capacity(template.metrics.len());
    for metric in &template.metrics {
        metrics.push(convert_metric(metric)?);
    }

    let mut parameters = Vec::with_capacity(template.parameters.len());
    for parameter in &template.parameters {
        parameters.push(convert_parameter(parameter)?);
    }

    Ok(pb::Template {
        version: template.version.clone(),
        metrics,
        parameters,
        template_ref: template.template_ref.clone(),
        is_definition: Some(template.is_definition),
    })
}

fn convert_parameter(parameter: &Parameter) -> Result<pb::Parameter> {
    use pb::parameter::Value as W;
    use ParameterDataType as P;

    let mut out = pb::Parameter {
        name: Some(parameter.name.clone()),
        r#type: Some(parameter.data_type.code()),
        value: None,
    };

    // A null String parameter is encoded as the empty string.
    let value = match (&parameter.value, parameter.data_type) {
        (None, P::String) => Some(ScalarValue::String(String::new())),
        (v, _) => v.clone(),
    };

    let Some(value) = value else {
        return Ok(out);
    };

    out.value = Some(match (parameter.data_type, &value) {
        (P::Int8, ScalarValue::Int8(v)) => W::IntValue(u32::from(*v as u8)),
        (P::Int16, ScalarValue::Int16(v)) => W::IntValue(u32::from(*v as u16)),
        (P::Int32, ScalarValue::Int32(v)) => W::IntValue(*v as u32),
        (P::Int64, ScalarValue::Int64(v)) => W::LongValue(*v as u64),
        (P::UInt8, ScalarValue::UInt8(v)) => W::IntValue(u32::from(*v)),
        (P::UInt16, ScalarValue::UInt16(v)) => W::IntValue(u32::from(*v)),
        (P::UInt32, ScalarValue::UInt32(v)) => W::LongValue(u64::from(*v)),
        (P::UInt64, ScalarValue::UInt64(v)) => W::LongValue(*v),
        (P::Float, ScalarValue::Float(v)) => W::FloatValue(*v),
        (P::Double, ScalarValue::Double(v)) => W::DoubleValue(*v),
        (P::Boolean, value) => W::BooleanValue(scalar_to_boolean(value)?),
        (P::DateTime, ScalarValue::DateTime(v)) => W::LongValue(*v),
        (P::String, ScalarValue::String(v)) | (P::String, ScalarValue::Text(v)) => {
            W::StringValue(v.clone())
        }
        (P::Text, ScalarValue::Text(v)) | (P::Text, ScalarValue::String(v)) => {
            W::StringValue(v.clone())
        }
        (P::Unknown, _) => return Err(Error::UnknownType(0)),
        (declared, value) => {
            return Err(Error::InvalidType {
                expected: "parameter value matching declared type",
                got: format!("{:?} for {:?}", value, declared),
            })
        }
    });

    Ok(out)
}

fn scalar_to_boolean(value: &ScalarValue) -> Result<bool> {
    match value {
        ScalarValue::Boolean(b) => Ok(*b),
        ScalarValue::Int8(v) => Ok(*v != 0),
        ScalarValue::Int16(v) => Ok(*v != 0),
        ScalarValue::Int32(v) => Ok(*v != 0),
        ScalarValue::Int64(v) => Ok(*v != 0),
        ScalarValue::UInt8(v) => Ok(*v != 0),
        ScalarValue::UInt16(v) => Ok(*v != 0),
        ScalarValue::UInt32(v) => Ok(*v != 0),
        ScalarValue::UInt64(v) => Ok(*v != 0),
        ScalarValue::Float(v) => Ok(*v != 0.0),
        ScalarValue::Double(v) => Ok(*v != 0.0),
        ScalarValue::String(s) | ScalarValue::Text(s) => {
            if s.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if s.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err(Error::InvalidType {
                    expected: "Boolean",
                    got: format!("string {:?}", s),
                })
            }
        }
        other => Err(Error::InvalidType {
            expected: "Boolean",
            got: format!("{:?}", other),
        }),
    }
}

fn convert_property_set(set: &PropertySet) -> Result<pb::PropertySet> {
    let mut out = pb::PropertySet {
        keys: Vec::with_capacity(set.len()),
        values: Vec::with_capacity(set.len()),
    };
    for (key, value) in set.iter() {
        out.keys.push(key.to_string());
        out.values.push(convert_property_value(value)?);
    }
    Ok(out)
}

fn convert_property_value(property: &PropertyValue) -> Result<pb::PropertyValue> {
    use pb::property_value::Value as W;
    use PropertyDataType as P;

    let mut out = pb::PropertyValue {
        r#type: Some(property.data_type.code()),
        is_null: None,
        value: None,
    };

    let Some(kind) = &property.value else {
        out.is_null = Some(true);
        return Ok(out);
    };

    out.value = Some(match (property.data_type, kind) {
        (P::PropertySet, PropertyValueKind::PropertySet(set)) => {
            W::PropertysetValue(convert_property_set(set)?)
        }
        (P::PropertySetList, PropertyValueKind::PropertySetList(sets)) => {
            let mut list = pb::PropertySetList {
                propertyset: Vec::with_capacity(sets.len()),
            };
            for set in sets {
                list.propertyset.push(convert_property_set(set)?);
            }
            W::PropertysetsValue(list)
        }
        (data_type, PropertyValueKind::Scalar(value)) => match (data_type, value) {
            (P::Int8, ScalarValue::Int8(v)) => W::IntValue(u32::from(*v as u8)),
            (P::Int16, ScalarValue::Int16(v)) => W::IntValue(u32::from(*v as u16)),
            (P::Int32, ScalarValue::Int32(v)) => W::IntValue(*v as u32),
            (P::Int64, ScalarValue::Int64(v)) => W::LongValue(*v as u64),
            (P::UInt8, ScalarValue::UInt8(v)) => W::IntValue(u32::from(*v)),
            (P::UInt16, ScalarValue::UInt16(v)) => W::IntValue(u32::from(*v)),
            (P::UInt32, ScalarValue::UInt32(v)) => W::LongValue(u64::from(*v)),
            (P::UInt64, ScalarValue::UInt64(v)) => W::LongValue(*v),
            (P::Float, ScalarValue::Float(v)) => W::FloatValue(*v),
            (P::Double, ScalarValue::Double(v)) => W::DoubleValue(*v),
            (P::Boolean, value) => W::BooleanValue(scalar_to_boolean(value)?),
            (P::DateTime, ScalarValue::DateTime(v)) => W::LongValue(*v),
            (P::String, ScalarValue::String(v)) | (P::String, ScalarValue::Text(v)) => {
                W::StringValue(v.clone())
            }
            (P::Text, ScalarValue::Text(v)) | (P::Text, ScalarValue::String(v)) => {
                W::StringValue(v.clone())
            }
            (P::Unknown, _) => return Err(Error::UnknownType(0)),
            (declared, value) => {
                return Err(Error::InvalidType {
                    expected: "property value matching declared type",
                    got: format!("{:?} for {:?}", value, declared),
                })
            }
        },
        (declared, _) => {
            return Err(Error::InvalidType {
                expected: "property value matching declared type",
                got: format!("{:?}", declared),
            })
        }
    });

    Ok(out)
}

fn decode_metric(metric: &pb::Metric) -> Result<Metric> {
    let data_type = MetricDataType::from_code(metric.datatype.unwrap_or(0))?;

    let metadata = metric.metadata.as_ref().map(decode_metadata);

    let value = if metric.is_null.unwrap_or(false) {
        None
    } else {
        match &metric.value {
            None => None,
            Some(wire) => Some(decode_metric_value(data_type, wire, metadata.as_ref())?),
        }
    };

    let properties = metric
        .properties
        .as_ref()
        .map(decode_property_set)
        .transpose()?;

    Ok(Metric {
        name: metric.name.clone(),
        alias: metric.alias,
        timestamp: metric.timestamp,
        data_type,
        is_historical: metric.is_historical.unwrap_or(false),
        is_transient: metric.is_transient.unwrap_or(false),
        metadata,
        properties,
        value,
    })
}

fn decode_metadata(metadata: &pb::MetaData) -> MetaData {
    MetaData {
        content_type: metadata.content_type.clone(),
        size: metadata.size,
        seq: metadata.seq,
        file_name: metadata.file_name.clone(),
        file_type: metadata.file_type.clone(),
        md5: metadata.md5.clone(),
        description: metadata.description.clone(),
        is_multi_part: metadata.is_multi_part,
    }
}

fn wire_mismatch(datatype: &'static str) -> Error {
    Error::TypeMismatch {
        datatype,
        detail: "wire value field does not match declared data type".to_string(),
    }
}

fn decode_metric_value(
    data_type: MetricDataType,
    wire: &pb::metric::Value,
    metadata: Option<&MetaData>,
) -> Result<MetricValue> {
    use pb::metric::Value as W;
    use MetricDataType as T;

    Ok(match (data_type, wire) {
        (T::Int8, W::IntValue(v)) => MetricValue::Int8(*v as u8 as i8),
        (T::Int16, W::IntValue(v)) => MetricValue::Int16(*v as u16 as i16),
        (T::Int32, W::IntValue(v)) => MetricValue::Int32(*v as i32),
        (T::Int64, W::LongValue(v)) => MetricValue::Int64(*v as i64),
        (T::UInt8, W::IntValue(v)) => MetricValue::UInt8(*v as u8),
        (T::UInt16, W::IntValue(v)) => MetricValue::UInt16(*v as u16),
        (T::UInt32, W::LongValue(v)) => MetricValue::UInt32(*v as u32),
        (T::UInt64, W::LongValue(v)) => MetricValue::UInt64(*v),
        (T::Float, W::FloatValue(v)) => MetricValue::Float(*v),
        (T::Double, W::DoubleValue(v)) => MetricValue::Double(*v),
        (T::Boolean, W::BooleanValue(v)) => MetricValue::Boolean(*v),
        (T::DateTime, W::LongValue(v)) => MetricValue::DateTime(*v),
        (T::String, W::StringValue(v)) => MetricValue::String(v.clone()),
        (T::Text, W::StringValue(v)) => MetricValue::Text(v.clone()),
        (T::Uuid, W::StringValue(v)) => MetricValue::Uuid(v.clone()),
        (T::Bytes, W::BytesValue(v)) => MetricValue::Bytes(v.clone()),
        (T::File, W::BytesValue(v)) => MetricValue::File(File {
            file_name: metadata
                .and_then(|m| m.file_name.clone())
                .unwrap_or_default(),
            bytes: v.clone(),
        }),
        (T::DataSet, W::DatasetValue(ds)) => MetricValue::DataSet(decode_dataset(ds)?),
        (T::Template, W::TemplateValue(t)) => MetricValue::Template(decode_template(t)?),
        (T::Int8Array, W::BytesValue(bytes)) => {
            MetricValue::Int8Array(bytes.iter().map(|b| *b as i8).collect())
        }
        (T::Int16Array, W::BytesValue(bytes)) => {
            MetricValue::Int16Array(unpack_array("Int16Array", bytes, i16::from_le_bytes)?)
        }
        (T::Int32Array, W::BytesValue(bytes)) => {
            MetricValue::Int32Array(unpack_array("Int32Array", bytes, i32::from_le_bytes)?)
        }
        (T::Int64Array, W::BytesValue(bytes)) => {
            MetricValue::Int64Array(unpack_array("Int64Array", bytes, i64::from_le_bytes)?)
        }
        (T::UInt8Array, W::BytesValue(bytes)) => MetricValue::UInt8Array(bytes.clone()),
        (T::UInt16Array, W::BytesValue(bytes)) => {
            MetricValue::UInt16Array(unpack_array("UInt16Array", bytes, u16::from_le_bytes)?)
        }
        (T::UInt32Array, W::BytesValue(bytes)) => {
            MetricValue::UInt32Array(unpack_array("UInt32Array", bytes, u32::from_le_bytes)?)
        }
        (T::UInt64Array, W::BytesValue(bytes)) => {
            MetricValue::UInt64Array(unpack_array("UInt64Array", bytes, u64::from_le_bytes)?)
        }
        (T::FloatArray, W::BytesValue(bytes)) => {
            MetricValue::FloatArray(unpack_array("FloatArray", bytes, f32::from_le_bytes)?)
        }
        (T::DoubleArray, W::BytesValue(bytes)) => {
            MetricValue::DoubleArray(unpack_array("DoubleArray", bytes, f64::from_le_bytes)?)
        }
        (T::BooleanArray, W::BytesValue(bytes)) => {
            MetricValue::BooleanArray(unpack_boolean_array(bytes)?)
        }
        (T::StringArray, W::BytesValue(bytes)) => {
            MetricValue::StringArray(unpack_string_array(bytes)?)
        }
        (T::DateTimeArray, W::BytesValue(bytes)) => {
            MetricValue::DateTimeArray(unpack_array("DateTimeArray", bytes, u64::from_le_bytes)?)
        }
        (T::Unknown, _) => return Err(Error::UnknownType(0)),
        (declared, _) => return Err(wire_mismatch(declared.name())),
    })
}

fn unpack_array<const N: usize, T>(
    datatype: &'static str,
    bytes: &[u8],
    convert: impl Fn([u8; N]) -> T,
) -> Result<Vec<T>> {
    if bytes.len() % N != 0 {
        return Err(Error::TruncatedArray {
            datatype,
            detail: format!("{} bytes is not a multiple of {}", bytes.len(), N),
        });
    }
    Ok(bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            convert(buf)
        })
        .collect())
}

fn unpack_boolean_array(bytes: &[u8]) -> Result<Vec<bool>> {
    if bytes.len() < 4 {
        return Err(Error::TruncatedArray {
            datatype: "BooleanArray",
            detail: format!("{} bytes is too short for the element count", bytes.len()),
        });
    }
    let mut count_bytes = [0u8; 4];
    count_bytes.copy_from_slice(&bytes[..4]);
    let count = u32::from_le_bytes(count_bytes) as usize;

    let needed = 4 + count.div_ceil(8);
    if bytes.len() < needed {
        return Err(Error::TruncatedArray {
            datatype: "BooleanArray",
            detail: format!("{} elements need {} bytes, got {}", count, needed, bytes.len()),
        });
    }

    Ok((0..count)
        .map(|i| (bytes[4 + i / 8] >> (7 - i % 8)) & 1 == 1)
        .collect())
}

fn unpack_string_array(bytes: &[u8]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, byte) in bytes.iter().enumerate() {
        if *byte == 0 {
            let s = std::str::from_utf8(&bytes[start..i]).map_err(|e| Error::TypeMismatch {
                datatype: "StringArray",
                detail: format!("invalid UTF-8: {e}"),
            })?;
            out.push(s.to_string());
            start = i + 1;
        }
    }
    if start != bytes.len() {
        return Err(Error::TruncatedArray {
            datatype: "StringArray",
            detail: "missing NUL terminator on final element".to_string(),
        });
    }
    Ok(out)
}

fn decode_dataset(dataset: &pb::DataSet) -> Result<DataSet> {
    let mut column_types = Vec::with_capacity(dataset.types.len());
    for code in &dataset.types {
        column_types.push(DataSetDataType::from_code(*code)?);
    }

    let mut rows = Vec::with_capacity(dataset.rows.len());
    for row in &dataset.rows {
        if row.elements.len() != column_types.len() {
            return Err(Error::TypeMismatch {
                datatype: "DataSet",
                detail: format!(
                    "row has {} elements for {} columns",
                    row.elements.len(),
                    column_types.len()
                ),
            });
        }
        let mut values = Vec::with_capacity(row.elements.len());
        for (element, column_type) in row.elements.iter().zip(&column_types) {
            values.push(
                element
                    .value
                    .as_ref()
                    .map(|wire| decode_scalar_cell(*column_type, wire))
                    .transpose()?,
            );
        }
        rows.push(Row { values });
    }

    Ok(DataSet {
        num_of_columns: dataset.num_of_columns.unwrap_or(column_types.len() as u64),
        column_names: dataset.columns.clone(),
        column_types,
        rows,
    })
}

fn decode_scalar_cell(
    column_type: DataSetDataType,
    wire: &pb::data_set_value::Value,
) -> Result<ScalarValue> {
    use pb::data_set_value::Value as W;
    use DataSetDataType as D;

    Ok(match (column_type, wire) {
        (D::Int8, W::IntValue(v)) => ScalarValue::Int8(*v as u8 as i8),
        (D::Int16, W::IntValue(v)) => ScalarValue::Int16(*v as u16 as i16),
        (D::Int32, W::IntValue(v)) => ScalarValue::Int32(*v as i32),
        (D::Int64, W::LongValue(v)) => ScalarValue::Int64(*v as i64),
        (D::UInt8, W::IntValue(v)) => ScalarValue::UInt8(*v as u8),
        (D::UInt16, W::IntValue(v)) => ScalarValue::UInt16(*v as u16),
        (D::UInt32, W::LongValue(v)) => ScalarValue::UInt32(*v as u32),
        (D::UInt64, W::LongValue(v)) => ScalarValue::UInt64(*v),
        (D::Float, W::FloatValue(v)) => ScalarValue::Float(*v),
        (D::Double, W::DoubleValue(v)) => ScalarValue::Double(*v),
        (D::Boolean, W::BooleanValue(v)) => ScalarValue::Boolean(*v),
        (D::DateTime, W::LongValue(v)) => ScalarValue::DateTime(*v),
        (D::String, W::StringValue(v)) => ScalarValue::String(v.clone()),
        (D::Text, W::StringValue(v)) => ScalarValue::Text(v.clone()),
        (D::Unknown, _) => return Err(Error::UnknownType(0)),
        _ => return Err(wire_mismatch("DataSet cell")),
    })
}

fn decode_template(template: &pb::Template) -> Result<Template> {
    let mut metrics = Vec::with_capacity(template.metrics.len());
    for metric in &template.metrics {
        metrics.push(decode_metric(metric)?);
    }

    let mut parameters = Vec::with_capacity(template.parameters.len());
    for parameter in &template.parameters {
        parameters.push(decode_parameter(parameter)?);
    }

    Ok(Template {
        version: template.version.clone(),
        template_ref: template.template_ref.clone(),
        is_definition: template.is_definition.unwrap_or(false),
        metrics,
        parameters,
    })
}

fn decode_parameter(parameter: &pb::Parameter) -> Result<Parameter> {
    use pb::parameter::Value as W;
    use ParameterDataType as P;

    let data_type = ParameterDataType::from_code(parameter.r#type.unwrap_or(0))?;

    let value = match (&parameter.value, data_type) {
        (None, _) => None,
        (Some(wire), data_type) => Some(match (data_type, wire) {
            (P::Int8, W::IntValue(v)) => ScalarValue::Int8(*v as u8 as i8),
            (P::Int16, W::IntValue(v)) => ScalarValue::Int16(*v as u16 as i16),
            (P::Int32, W::IntValue(v)) => ScalarValue::Int32(*v as i32),
            (P::Int64, W::LongValue(v)) => ScalarValue::Int64(*v as i64),
            (P::UInt8, W::IntValue(v)) => ScalarValue::UInt8(*v as u8),
            (P::UInt16, W::IntValue(v)) => ScalarValue::UInt16(*v as u16),
            (P::UInt32, W::LongValue(v)) => ScalarValue::UInt32(*v as u32),
            (P::UInt64, W::LongValue(v)) => ScalarValue::UInt64(*v),
            (P::Float, W::FloatValue(v)) => ScalarValue::Float(*v),
            (P::Double, W::DoubleValue(v)) => ScalarValue::Double(*v),
            (P::Boolean, W::BooleanValue(v)) => ScalarValue::Boolean(*v),
            (P::DateTime, W::LongValue(v)) => ScalarValue::DateTime(*v),
            (P::String, W::StringValue(v)) => ScalarValue::String(v.clone()),
            (P::Text, W::StringValue(v)) => ScalarValue::Text(v.clone()),
            (P::Unknown, _) => return Err(Error::UnknownType(0)),
            _ => return Err(wire_mismatch("Parameter")),
        }),
    };

    Ok(Parameter {
        name: parameter.name.clone().unwrap_or_default(),
        data_type,
        value,
    })
}

fn decode_property_set(set: &pb::PropertySet) -> Result<PropertySet> {
    if set.keys.len() != set.values.len() {
        return Err(Error::TypeMismatch {
            datatype: "PropertySet",
            detail: format!("{} keys but {} values", set.keys.len(), set.values.len()),
        });
    }
    let mut out = PropertySet::new();
    for (key, value) in set.keys.iter().zip(&set.values) {
        out.insert(key.clone(), decode_property_value(value)?);
    }
    Ok(out)
}

fn decode_property_value(property: &pb::PropertyValue) -> Result<PropertyValue> {
    use pb::property_value::Value as W;
    use PropertyDataType as P;

    let data_type = PropertyDataType::from_code(property.r#type.unwrap_or(0))?;

    if property.is_null.unwrap_or(false) || property.value.is_none() {
        return Ok(PropertyValue::null(data_type));
    }

    let value = match (&property.value, data_type) {
        (Some(W::PropertysetValue(set)), P::PropertySet) => {
            PropertyValueKind::PropertySet(decode_property_set(set)?)
        }
        (Some(W::PropertysetsValue(list)), P::PropertySetList) => {
            let mut sets = Vec::with_capacity(list.propertyset.len());
            for set in &list.propertyset {
                sets.push(decode_property_set(set)?);
            }
            PropertyValueKind::PropertySetList(sets)
        }
        (Some(wire), data_type) => PropertyValueKind::Scalar(match (data_type, wire) {
            (P::Int8, W::IntValue(v)) => ScalarValue::Int8(*v as u8 as i8),
            (P::Int16, W::IntValue(v)) => ScalarValue::Int16(*v as u16 as i16),
            (P::Int32, W::IntValue(v)) => ScalarValue::Int32(*v as i32),
            (P::Int64, W::LongValue(v)) => ScalarValue::Int64(*v as i64),
            (P::UInt8, W::IntValue(v)) => ScalarValue::UInt8(*v as u8),
            (P::UInt16, W::IntValue(v)) => ScalarValue::UInt16(*v as u16),
            (P::UInt32, W::LongValue(v)) => ScalarValue::UInt32(*v as u32),
            (P::UInt64, W::LongValue(v)) => ScalarValue::UInt64(*v),
            (P::Float, W::FloatValue(v)) => ScalarValue::Float(*v),
            (P::Double, W::DoubleValue(v)) => ScalarValue::Double(*v),
            (P::Boolean, W::BooleanValue(v)) => ScalarValue::Boolean(*v),
            (P::DateTime, W::LongValue(v)) => ScalarValue::DateTime(*v),
            (P::String, W::StringValue(v)) => ScalarValue::String(v.clone()),
            (P::Text, W::StringValue(v)) => ScalarValue::Text(v.clone()),
            (P::Unknown, _) => return Err(Error::UnknownType(0)),
            _ => return Err(wire_mismatch("PropertyValue")),
        }),
        (None, _) => return Ok(PropertyValue::null(data_type)),
    };

    Ok(PropertyValue::new(data_type, value))
}

impl MetricDataType {
    /// Returns the data type name used in diagnostics.
    pub fn name(self) -> &'static str {
        use MetricDataType as T;
        match self {
            T::Unknown => "Unknown",
            T::Int8 => "Int8",
            T::Int16 => "Int16",
            T::Int32 => "Int32",
            T::Int64 => "Int64",
            T::UInt8 => "UInt8",
            T::UInt16 => "UInt16",
            T::UInt32 => "UInt32",
            T::UInt64 => "UInt64",
            T::Float => "Float",
            T::Double => "Double",
            T::Boolean => "Boolean",
            T::String => "String",
            T::DateTime => "DateTime",
            T::Text => "Text",
            T::Uuid => "UUID",
            T::DataSet => "DataSet",
            T::Bytes => "Bytes",
            T::File => "File",
            T::Template => "Template",
            T::Int8Array => "Int8Array",
            T::Int16Array => "Int16Array",
            T::Int32Array => "Int32Array",
            T::Int64Array => "Int64Array",
            T::UInt8Array => "UInt8Array",
            T::UInt16Array => "UInt16Array",
            T::UInt32Array => "UInt32Array",
            T::UInt64Array => "UInt64Array",
            T::FloatArray => "FloatArray",
            T::DoubleArray => "DoubleArray",
            T::BooleanArray => "BooleanArray",
            T::StringArray => "StringArray",
            T::DateTimeArray => "DateTimeArray",
        }
    }
}

/// A fluent builder for Sparkplug payloads.
///
/// # Example
///
/// ```
/// use sparkplug_mqtt::PayloadBuilder;
///
/// let mut builder = PayloadBuilder::new();
/// builder
///     .set_timestamp(1_700_000_000_000)
///     .add_double_with_alias("Temperature", 1, 20.5)
///     .add_bool_with_alias("Active", 2, true);
///
/// let bytes = builder.serialize()?;
/// # Ok::<(), sparkplug_mqtt::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct PayloadBuilder {
    payload: SparkplugBPayload,
}

impl PayloadBuilder {
    /// Creates a new payload builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload-level timestamp in milliseconds since the Unix epoch.
    pub fn set_timestamp(&mut self, timestamp: u64) -> &mut Self {
        self.payload.timestamp = Some(timestamp);
        self
    }

    /// Sets the sequence number.
    pub fn set_seq(&mut self, seq: u64) -> &mut Self {
        self.payload.seq = Some(seq);
        self
    }

    /// Sets the payload UUID.
    pub fn set_uuid(&mut self, uuid: impl Into<String>) -> &mut Self {
        self.payload.uuid = Some(uuid.into());
        self
    }

    /// Sets the opaque body bytes.
    pub fn set_body(&mut self, body: Vec<u8>) -> &mut Self {
        self.payload.body = Some(body);
        self
    }

    /// Adds an already-built metric.
    pub fn add_metric(&mut self, metric: Metric) -> &mut Self {
        self.payload.metrics.push(metric);
        self
    }

    // ===== Metric functions by name only =====

    /// Adds an int8 metric by name.
    pub fn add_int8(&mut self, name: &str, value: i8) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::Int8,
            MetricValue::Int8(value),
        ))
    }

    /// Adds an int16 metric by name.
    pub fn add_int16(&mut self, name: &str, value: i16) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::Int16,
            MetricValue::Int16(value),
        ))
    }

    /// Adds an int32 metric by name.
    pub fn add_int32(&mut self, name: &str, value: i32) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::Int32,
            MetricValue::Int32(value),
        ))
    }

    /// Adds an int64 metric by name.
    pub fn add_int64(&mut self, name: &str, value: i64) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::Int64,
            MetricValue::Int64(value),
        ))
    }

    /// Adds a uint8 metric by name.
    pub fn add_uint8(&mut self, name: &str, value: u8) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::UInt8,
            MetricValue::UInt8(value),
        ))
    }

    /// Adds a uint16 metric by name.
    pub fn add_uint16(&mut self, name: &str, value: u16) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::UInt16,
            MetricValue::UInt16(value),
        ))
    }

    /// Adds a uint32 metric by name.
    pub fn add_uint32(&mut self, name: &str, value: u32) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::UInt32,
            MetricValue::UInt32(value),
        ))
    }

    /// Adds a uint64 metric by name.
    pub fn add_uint64(&mut self, name: &str, value: u64) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::UInt64,
            MetricValue::UInt64(value),
        ))
    }

    /// Adds a uint32 metric from a possibly-signed ingress value.
    ///
    /// Fails with [`Error::OutOfRange`] for anything outside `[0, 2^32)`.
    pub fn add_uint32_checked(&mut self, name: &str, value: i64) -> Result<&mut Self> {
        let value = MetricValue::uint32_checked(value)?;
        Ok(self.add_metric(Metric::new(name, MetricDataType::UInt32, value)))
    }

    /// Adds a uint64 metric from a wide ingress value.
    ///
    /// Fails with [`Error::OutOfRange`] for anything outside `[0, 2^64)`.
    pub fn add_uint64_checked(&mut self, name: &str, value: i128) -> Result<&mut Self> {
        let value = MetricValue::uint64_checked(value)?;
        Ok(self.add_metric(Metric::new(name, MetricDataType::UInt64, value)))
    }

    /// Adds a float metric by name.
    pub fn add_float(&mut self, name: &str, value: f32) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::Float,
            MetricValue::Float(value),
        ))
    }

    /// Adds a double metric by name.
    pub fn add_double(&mut self, name: &str, value: f64) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::Double,
            MetricValue::Double(value),
        ))
    }

    /// Adds a boolean metric by name.
    pub fn add_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::Boolean,
            MetricValue::Boolean(value),
        ))
    }

    /// Adds a string metric by name.
    pub fn add_string(&mut self, name: &str, value: &str) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::String,
            MetricValue::String(value.to_string()),
        ))
    }

    /// Adds a datetime metric by name (milliseconds since the Unix epoch).
    pub fn add_datetime(&mut self, name: &str, value: u64) -> &mut Self {
        self.add_metric(Metric::new(
            name,
            MetricDataType::DateTime,
            MetricValue::DateTime(value),
        ))
    }

    // ===== Metric functions with alias (for BIRTH) =====

    /// Adds an int32 metric with both name and alias.
    pub fn add_int32_with_alias(&mut self, name: &str, alias: u64, value: i32) -> &mut Self {
        self.add_metric(
            Metric::new(name, MetricDataType::Int32, MetricValue::Int32(value)).with_alias(alias),
        )
    }

    /// Adds an int64 metric with both name and alias.
    pub fn add_int64_with_alias(&mut self, name: &str, alias: u64, value: i64) -> &mut Self {
        self.add_metric(
            Metric::new(name, MetricDataType::Int64, MetricValue::Int64(value)).with_alias(alias),
        )
    }

    /// Adds a uint32 metric with both name and alias.
    pub fn add_uint32_with_alias(&mut self, name: &str, alias: u64, value: u32) -> &mut Self {
        self.add_metric(
            Metric::new(name, MetricDataType::UInt32, MetricValue::UInt32(value)).with_alias(alias),
        )
    }

    /// Adds a uint64 metric with both name and alias.
    pub fn add_uint64_with_alias(&mut self, name: &str, alias: u64, value: u64) -> &mut Self {
        self.add_metric(
            Metric::new(name, MetricDataType::UInt64, MetricValue::UInt64(value)).with_alias(alias),
        )
    }

    /// Adds a float metric with both name and alias.
    pub fn add_float_with_alias(&mut self, name: &str, alias: u64, value: f32) -> &mut Self {
        self.add_metric(
            Metric::new(name, MetricDataType::Float, MetricValue::Float(value)).with_alias(alias),
        )
    }

    /// Adds a double metric with both name and alias.
    pub fn add_double_with_alias(&mut self, name: &str, alias: u64, value: f64) -> &mut Self {
        self.add_metric(
            Metric::new(name, MetricDataType::Double, MetricValue::Double(value)).with_alias(alias),
        )
    }

    /// Adds a boolean metric with both name and alias.
    pub fn add_bool_with_alias(&mut self, name: &str, alias: u64, value: bool) -> &mut Self {
        self.add_metric(
            Metric::new(name, MetricDataType::Boolean, MetricValue::Boolean(value))
                .with_alias(alias),
        )
    }

    // ===== Metric functions by alias only (for DATA) =====

    /// Adds an int32 metric by alias only.
    pub fn add_int32_by_alias(&mut self, alias: u64, value: i32) -> &mut Self {
        self.add_metric(Metric::by_alias(
            alias,
            MetricDataType::Int32,
            MetricValue::Int32(value),
        ))
    }

    /// Adds an int64 metric by alias only.
    pub fn add_int64_by_alias(&mut self, alias: u64, value: i64) -> &mut Self {
        self.add_metric(Metric::by_alias(
            alias,
            MetricDataType::Int64,
            MetricValue::Int64(value),
        ))
    }

    /// Adds a uint32 metric by alias only.
    pub fn add_uint32_by_alias(&mut self, alias: u64, value: u32) -> &mut Self {
        self.add_metric(Metric::by_alias(
            alias,
            MetricDataType::UInt32,
            MetricValue::UInt32(value),
        ))
    }

    /// Adds a uint64 metric by alias only.
    pub fn add_uint64_by_alias(&mut self, alias: u64, value: u64) -> &mut Self {
        self.add_metric(Metric::by_alias(
            alias,
            MetricDataType::UInt64,
            MetricValue::UInt64(value),
        ))
    }

    /// Adds a float metric by alias only.
    pub fn add_float_by_alias(&mut self, alias: u64, value: f32) -> &mut Self {
        self.add_metric(Metric::by_alias(
            alias,
            MetricDataType::Float,
            MetricValue::Float(value),
        ))
    }

    /// Adds a double metric by alias only.
    pub fn add_double_by_alias(&mut self, alias: u64, value: f64) -> &mut Self {
        self.add_metric(Metric::by_alias(
            alias,
            MetricDataType::Double,
            MetricValue::Double(value),
        ))
    }

    /// Adds a boolean metric by alias only.
    pub fn add_bool_by_alias(&mut self, alias: u64, value: bool) -> &mut Self {
        self.add_metric(Metric::by_alias(
            alias,
            MetricDataType::Boolean,
            MetricValue::Boolean(value),
        ))
    }

    /// Returns the assembled payload, consuming the builder.
    pub fn into_payload(self) -> SparkplugBPayload {
        self.payload
    }

    /// Returns a copy of the assembled payload.
    pub fn payload(&self) -> &SparkplugBPayload {
        &self.payload
    }

    /// Serializes the payload to Sparkplug B wire bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        SparkplugBPayloadEncoder::new().encode(&self.payload)
    }
}
