//! Common types for the Sparkplug API.
//!
//! The model mirrors the Sparkplug B payload definition: a payload holds an
//! ordered list of metrics, each metric declares a [`MetricDataType`] and
//! carries a value whose runtime shape must match the declared type. Property
//! sets, data sets and templates use their own (narrower) type universes.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Metric name carrying the birth/death sequence number in NBIRTH/NDEATH.
pub const BDSEQ_METRIC_NAME: &str = "bdSeq";

/// NCMD metric name a host publishes to request a node rebirth.
pub const NODE_CONTROL_REBIRTH: &str = "Node Control/Rebirth";

/// Sparkplug metric data types with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MetricDataType {
    /// Unknown or unsupported type
    Unknown = 0,
    /// Signed 8-bit integer
    Int8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Signed 32-bit integer
    Int32 = 3,
    /// Signed 64-bit integer
    Int64 = 4,
    /// Unsigned 8-bit integer
    UInt8 = 5,
    /// Unsigned 16-bit integer
    UInt16 = 6,
    /// Unsigned 32-bit integer
    UInt32 = 7,
    /// Unsigned 64-bit integer
    UInt64 = 8,
    /// 32-bit floating point
    Float = 9,
    /// 64-bit floating point
    Double = 10,
    /// Boolean value
    Boolean = 11,
    /// String value
    String = 12,
    /// Milliseconds since the Unix epoch
    DateTime = 13,
    /// Text value
    Text = 14,
    /// UUID rendered as a string
    Uuid = 15,
    /// Tabular data set
    DataSet = 16,
    /// Opaque byte array
    Bytes = 17,
    /// File contents plus file name metadata
    File = 18,
    /// Template definition or instance
    Template = 19,
    /// Packed array of signed 8-bit integers
    Int8Array = 22,
    /// Packed array of signed 16-bit integers
    Int16Array = 23,
    /// Packed array of signed 32-bit integers
    Int32Array = 24,
    /// Packed array of signed 64-bit integers
    Int64Array = 25,
    /// Packed array of unsigned 8-bit integers
    UInt8Array = 26,
    /// Packed array of unsigned 16-bit integers
    UInt16Array = 27,
    /// Packed array of unsigned 32-bit integers
    UInt32Array = 28,
    /// Packed array of unsigned 64-bit integers
    UInt64Array = 29,
    /// Packed array of 32-bit floats
    FloatArray = 30,
    /// Packed array of 64-bit floats
    DoubleArray = 31,
    /// Bit-packed array of booleans
    BooleanArray = 32,
    /// NUL-terminated string array
    StringArray = 33,
    /// Packed array of millisecond timestamps
    DateTimeArray = 34,
}

impl MetricDataType {
    /// Returns the wire `datatype` code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a data type from its wire code.
    pub fn from_code(code: u32) -> Result<Self> {
        use MetricDataType::*;
        Ok(match code {
            0 => Unknown,
            1 => Int8,
            2 => Int16,
            3 => Int32,
            4 => Int64,
            5 => UInt8,
            6 => UInt16,
            7 => UInt32,
            8 => UInt64,
            9 => Float,
            10 => Double,
            11 => Boolean,
            12 => String,
            13 => DateTime,
            14 => Text,
            15 => Uuid,
            16 => DataSet,
            17 => Bytes,
            18 => File,
            19 => Template,
            22 => Int8Array,
            23 => Int16Array,
            24 => Int32Array,
            25 => Int64Array,
            26 => UInt8Array,
            27 => UInt16Array,
            28 => UInt32Array,
            29 => UInt64Array,
            30 => FloatArray,
            31 => DoubleArray,
            32 => BooleanArray,
            33 => StringArray,
            34 => DateTimeArray,
            other => return Err(Error::UnknownType(other)),
        })
    }

    /// Returns true if this is one of the packed array types.
    pub fn is_array(self) -> bool {
        self.code() >= 22
    }
}

/// Data types legal for metric properties.
///
/// Property values cover the scalar universe plus nested property sets;
/// arrays, data sets and templates are not legal property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PropertyDataType {
    /// Unknown or unsupported type
    Unknown = 0,
    /// Signed 8-bit integer
    Int8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Signed 32-bit integer
    Int32 = 3,
    /// Signed 64-bit integer
    Int64 = 4,
    /// Unsigned 8-bit integer
    UInt8 = 5,
    /// Unsigned 16-bit integer
    UInt16 = 6,
    /// Unsigned 32-bit integer
    UInt32 = 7,
    /// Unsigned 64-bit integer
    UInt64 = 8,
    /// 32-bit floating point
    Float = 9,
    /// 64-bit floating point
    Double = 10,
    /// Boolean value
    Boolean = 11,
    /// String value
    String = 12,
    /// Milliseconds since the Unix epoch
    DateTime = 13,
    /// Text value
    Text = 14,
    /// Nested property set
    PropertySet = 20,
    /// List of nested property sets
    PropertySetList = 21,
}

impl PropertyDataType {
    /// Returns the wire `type` code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a property data type from its wire code.
    pub fn from_code(code: u32) -> Result<Self> {
        use PropertyDataType::*;
        Ok(match code {
            0 => Unknown,
            1 => Int8,
            2 => Int16,
            3 => Int32,
            4 => Int64,
            5 => UInt8,
            6 => UInt16,
            7 => UInt32,
            8 => UInt64,
            9 => Float,
            10 => Double,
            11 => Boolean,
            12 => String,
            13 => DateTime,
            14 => Text,
            20 => PropertySet,
            21 => PropertySetList,
            other => return Err(Error::UnknownType(other)),
        })
    }
}

/// Data types legal for template parameters (scalars only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ParameterDataType {
    /// Unknown or unsupported type
    Unknown = 0,
    /// Signed 8-bit integer
    Int8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Signed 32-bit integer
    Int32 = 3,
    /// Signed 64-bit integer
    Int64 = 4,
    /// Unsigned 8-bit integer
    UInt8 = 5,
    /// Unsigned 16-bit integer
    UInt16 = 6,
    /// Unsigned 32-bit integer
    UInt32 = 7,
    /// Unsigned 64-bit integer
    UInt64 = 8,
    /// 32-bit floating point
    Float = 9,
    /// 64-bit floating point
    Double = 10,
    /// Boolean value
    Boolean = 11,
    /// String value
    String = 12,
    /// Milliseconds since the Unix epoch
    DateTime = 13,
    /// Text value
    Text = 14,
}

impl ParameterDataType {
    /// Returns the wire `type` code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a parameter data type from its wire code.
    pub fn from_code(code: u32) -> Result<Self> {
        use ParameterDataType::*;
        Ok(match code {
            0 => Unknown,
            1 => Int8,
            2 => Int16,
            3 => Int32,
            4 => Int64,
            5 => UInt8,
            6 => UInt16,
            7 => UInt32,
            8 => UInt64,
            9 => Float,
            10 => Double,
            11 => Boolean,
            12 => String,
            13 => DateTime,
            14 => Text,
            other => return Err(Error::UnknownType(other)),
        })
    }
}

/// Data types legal for data set columns (scalars only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataSetDataType {
    /// Unknown or unsupported type
    Unknown = 0,
    /// Signed 8-bit integer
    Int8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Signed 32-bit integer
    Int32 = 3,
    /// Signed 64-bit integer
    Int64 = 4,
    /// Unsigned 8-bit integer
    UInt8 = 5,
    /// Unsigned 16-bit integer
    UInt16 = 6,
    /// Unsigned 32-bit integer
    UInt32 = 7,
    /// Unsigned 64-bit integer
    UInt64 = 8,
    /// 32-bit floating point
    Float = 9,
    /// 64-bit floating point
    Double = 10,
    /// Boolean value
    Boolean = 11,
    /// String value
    String = 12,
    /// Milliseconds since the Unix epoch
    DateTime = 13,
    /// Text value
    Text = 14,
}

impl DataSetDataType {
    /// Returns the wire `type` code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a data set data type from its wire code.
    pub fn from_code(code: u32) -> Result<Self> {
        use DataSetDataType::*;
        Ok(match code {
            0 => Unknown,
            1 => Int8,
            2 => Int16,
            3 => Int32,
            4 => Int64,
            5 => UInt8,
            6 => UInt16,
            7 => UInt32,
            8 => UInt64,
            9 => Float,
            10 => Double,
            11 => Boolean,
            12 => String,
            13 => DateTime,
            14 => Text,
            other => return Err(Error::UnknownType(other)),
        })
    }
}

/// A scalar value as it appears in data set cells and template parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// Signed 8-bit integer value
    Int8(i8),
    /// Signed 16-bit integer value
    Int16(i16),
    /// Signed 32-bit integer value
    Int32(i32),
    /// Signed 64-bit integer value
    Int64(i64),
    /// Unsigned 8-bit integer value
    UInt8(u8),
    /// Unsigned 16-bit integer value
    UInt16(u16),
    /// Unsigned 32-bit integer value
    UInt32(u32),
    /// Unsigned 64-bit integer value
    UInt64(u64),
    /// 32-bit floating point value
    Float(f32),
    /// 64-bit floating point value
    Double(f64),
    /// Boolean value
    Boolean(bool),
    /// String value
    String(String),
    /// Milliseconds since the Unix epoch
    DateTime(u64),
    /// Text value
    Text(String),
}

impl ScalarValue {
    /// Returns true if this shape is legal for the given data set column type.
    pub fn matches_dataset_type(&self, data_type: DataSetDataType) -> bool {
        use DataSetDataType as D;
        matches!(
            (self, data_type),
            (ScalarValue::Int8(_), D::Int8)
                | (ScalarValue::Int16(_), D::Int16)
                | (ScalarValue::Int32(_), D::Int32)
                | (ScalarValue::Int64(_), D::Int64)
                | (ScalarValue::UInt8(_), D::UInt8)
                | (ScalarValue::UInt16(_), D::UInt16)
                | (ScalarValue::UInt32(_), D::UInt32)
                | (ScalarValue::UInt64(_), D::UInt64)
                | (ScalarValue::Float(_), D::Float)
                | (ScalarValue::Double(_), D::Double)
                | (ScalarValue::Boolean(_), D::Boolean)
                | (ScalarValue::String(_), D::String)
                | (ScalarValue::DateTime(_), D::DateTime)
                | (ScalarValue::Text(_), D::Text)
        )
    }

    /// Returns true if this shape is legal for the given parameter type.
    pub fn matches_parameter_type(&self, data_type: ParameterDataType) -> bool {
        use ParameterDataType as P;
        matches!(
            (self, data_type),
            (ScalarValue::Int8(_), P::Int8)
                | (ScalarValue::Int16(_), P::Int16)
                | (ScalarValue::Int32(_), P::Int32)
                | (ScalarValue::Int64(_), P::Int64)
                | (ScalarValue::UInt8(_), P::UInt8)
                | (ScalarValue::UInt16(_), P::UInt16)
                | (ScalarValue::UInt32(_), P::UInt32)
                | (ScalarValue::UInt64(_), P::UInt64)
                | (ScalarValue::Float(_), P::Float)
                | (ScalarValue::Double(_), P::Double)
                | (ScalarValue::Boolean(_), P::Boolean)
                | (ScalarValue::String(_), P::String)
                | (ScalarValue::DateTime(_), P::DateTime)
                | (ScalarValue::Text(_), P::Text)
        )
    }
}

/// Metric value type, one variant per [`MetricDataType`].
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Signed 8-bit integer value
    Int8(i8),
    /// Signed 16-bit integer value
    Int16(i16),
    /// Signed 32-bit integer value
    Int32(i32),
    /// Signed 64-bit integer value
    Int64(i64),
    /// Unsigned 8-bit integer value
    UInt8(u8),
    /// Unsigned 16-bit integer value
    UInt16(u16),
    /// Unsigned 32-bit integer value
    UInt32(u32),
    /// Unsigned 64-bit integer value
    UInt64(u64),
    /// 32-bit floating point value
    Float(f32),
    /// 64-bit floating point value
    Double(f64),
    /// Boolean value
    Boolean(bool),
    /// String value
    String(String),
    /// Milliseconds since the Unix epoch
    DateTime(u64),
    /// Text value
    Text(String),
    /// UUID rendered as a string
    Uuid(String),
    /// Tabular data set value
    DataSet(DataSet),
    /// Opaque byte array
    Bytes(Vec<u8>),
    /// File value
    File(File),
    /// Template value
    Template(Template),
    /// Array of signed 8-bit integers
    Int8Array(Vec<i8>),
    /// Array of signed 16-bit integers
    Int16Array(Vec<i16>),
    /// Array of signed 32-bit integers
    Int32Array(Vec<i32>),
    /// Array of signed 64-bit integers
    Int64Array(Vec<i64>),
    /// Array of unsigned 8-bit integers
    UInt8Array(Vec<u8>),
    /// Array of unsigned 16-bit integers
    UInt16Array(Vec<u16>),
    /// Array of unsigned 32-bit integers
    UInt32Array(Vec<u32>),
    /// Array of unsigned 64-bit integers
    UInt64Array(Vec<u64>),
    /// Array of 32-bit floats
    FloatArray(Vec<f32>),
    /// Array of 64-bit floats
    DoubleArray(Vec<f64>),
    /// Array of booleans
    BooleanArray(Vec<bool>),
    /// Array of strings
    StringArray(Vec<String>),
    /// Array of millisecond timestamps
    DateTimeArray(Vec<u64>),
}

impl MetricValue {
    /// Returns the data type naturally declared by this value shape.
    pub fn data_type(&self) -> MetricDataType {
        use MetricDataType as T;
        match self {
            MetricValue::Int8(_) => T::Int8,
            MetricValue::Int16(_) => T::Int16,
            MetricValue::Int32(_) => T::Int32,
            MetricValue::Int64(_) => T::Int64,
            MetricValue::UInt8(_) => T::UInt8,
            MetricValue::UInt16(_) => T::UInt16,
            MetricValue::UInt32(_) => T::UInt32,
            MetricValue::UInt64(_) => T::UInt64,
            MetricValue::Float(_) => T::Float,
            MetricValue::Double(_) => T::Double,
            MetricValue::Boolean(_) => T::Boolean,
            MetricValue::String(_) => T::String,
            MetricValue::DateTime(_) => T::DateTime,
            MetricValue::Text(_) => T::Text,
            MetricValue::Uuid(_) => T::Uuid,
            MetricValue::DataSet(_) => T::DataSet,
            MetricValue::Bytes(_) => T::Bytes,
            MetricValue::File(_) => T::File,
            MetricValue::Template(_) => T::Template,
            MetricValue::Int8Array(_) => T::Int8Array,
            MetricValue::Int16Array(_) => T::Int16Array,
            MetricValue::Int32Array(_) => T::Int32Array,
            MetricValue::Int64Array(_) => T::Int64Array,
            MetricValue::UInt8Array(_) => T::UInt8Array,
            MetricValue::UInt16Array(_) => T::UInt16Array,
            MetricValue::UInt32Array(_) => T::UInt32Array,
            MetricValue::UInt64Array(_) => T::UInt64Array,
            MetricValue::FloatArray(_) => T::FloatArray,
            MetricValue::DoubleArray(_) => T::DoubleArray,
            MetricValue::BooleanArray(_) => T::BooleanArray,
            MetricValue::StringArray(_) => T::StringArray,
            MetricValue::DateTimeArray(_) => T::DateTimeArray,
        }
    }

    /// Checked ingress for unsigned 32-bit values.
    ///
    /// Rejects anything outside `[0, 2^32)` with [`Error::OutOfRange`].
    pub fn uint32_checked(value: i64) -> Result<Self> {
        u32::try_from(value)
            .map(MetricValue::UInt32)
            .map_err(|_| Error::OutOfRange {
                datatype: "UInt32",
                value: value.to_string(),
            })
    }

    /// Checked ingress for unsigned 64-bit values.
    ///
    /// Rejects anything outside `[0, 2^64)` with [`Error::OutOfRange`].
    pub fn uint64_checked(value: i128) -> Result<Self> {
        u64::try_from(value)
            .map(MetricValue::UInt64)
            .map_err(|_| Error::OutOfRange {
                datatype: "UInt64",
                value: value.to_string(),
            })
    }

    /// Coerces a loosely-typed value to a boolean.
    ///
    /// Numeric zero is false and any other numeric value is true. Strings are
    /// parsed case-insensitively as `true`/`false`. Every other shape fails
    /// with [`Error::InvalidType`].
    pub fn coerce_boolean(&self) -> Result<bool> {
        match self {
            MetricValue::Boolean(b) => Ok(*b),
            MetricValue::Int8(v) => Ok(*v != 0),
            MetricValue::Int16(v) => Ok(*v != 0),
            MetricValue::Int32(v) => Ok(*v != 0),
            MetricValue::Int64(v) => Ok(*v != 0),
            MetricValue::UInt8(v) => Ok(*v != 0),
            MetricValue::UInt16(v) => Ok(*v != 0),
            MetricValue::UInt32(v) => Ok(*v != 0),
            MetricValue::UInt64(v) => Ok(*v != 0),
            MetricValue::Float(v) => Ok(*v != 0.0),
            MetricValue::Double(v) => Ok(*v != 0.0),
            MetricValue::String(s) | MetricValue::Text(s) => {
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
                got: format!("{:?}", other.data_type()),
            }),
        }
    }
}

/// Descriptive metadata attached to a metric.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaData {
    /// MIME content type of the value
    pub content_type: Option<String>,
    /// Total size in bytes for multi-part transfers
    pub size: Option<u64>,
    /// Sequence number of a multi-part chunk
    pub seq: Option<u64>,
    /// File name for File metrics
    pub file_name: Option<String>,
    /// File type for File metrics
    pub file_type: Option<String>,
    /// MD5 digest of the complete value
    pub md5: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Whether the value is one chunk of a multi-part transfer
    pub is_multi_part: Option<bool>,
}

/// A file value: contents plus the name carried in metric metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// File name, synthesized into `MetaData.file_name` when encoded
    pub file_name: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

/// A typed property value, possibly null.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    /// Declared property data type
    pub data_type: PropertyDataType,
    /// The value, or `None` for a null property
    pub value: Option<PropertyValueKind>,
}

impl PropertyValue {
    /// Creates a non-null property value.
    pub fn new(data_type: PropertyDataType, value: PropertyValueKind) -> Self {
        Self {
            data_type,
            value: Some(value),
        }
    }

    /// Creates a null property value of the given type.
    pub fn null(data_type: PropertyDataType) -> Self {
        Self {
            data_type,
            value: None,
        }
    }

    /// Returns true when the property carries no value.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// The shape universe for property values.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValueKind {
    /// A scalar property value
    Scalar(ScalarValue),
    /// A nested property set
    PropertySet(PropertySet),
    /// A list of nested property sets
    PropertySetList(Vec<PropertySet>),
}

/// An insertion-ordered mapping from property keys to values.
///
/// Encoded on the wire as two parallel `keys[]`/`values[]` sequences, so the
/// order entries were inserted in is the order they travel in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertySet {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertySet {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a property, replacing any existing value for the key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Looks up a property by key.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of properties in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, PropertyValue)> for PropertySet {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        let mut set = PropertySet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// One row of a data set; values line up positionally with the column types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// Cell values; `None` is a null cell
    pub values: Vec<Option<ScalarValue>>,
}

impl Row {
    /// Creates a row from cell values.
    pub fn new(values: Vec<Option<ScalarValue>>) -> Self {
        Self { values }
    }
}

/// A tabular value: named, typed columns and rows of scalar cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    /// Number of columns
    pub num_of_columns: u64,
    /// Column names, one per column
    pub column_names: Vec<String>,
    /// Column types, one per column
    pub column_types: Vec<DataSetDataType>,
    /// Data rows
    pub rows: Vec<Row>,
}

impl DataSet {
    /// Creates a data set from columns and rows.
    pub fn new(
        column_names: Vec<String>,
        column_types: Vec<DataSetDataType>,
        rows: Vec<Row>,
    ) -> Self {
        Self {
            num_of_columns: column_names.len() as u64,
            column_names,
            column_types,
            rows,
        }
    }

    /// Checks the structural invariants: name/type lists of equal length
    /// matching `num_of_columns`, and every row cell matching its column type.
    pub fn validate(&self) -> Result<()> {
        if self.column_names.len() != self.column_types.len()
            || self.column_names.len() as u64 != self.num_of_columns
        {
            return Err(Error::InvalidArgument(format!(
                "data set declares {} columns but has {} names and {} types",
                self.num_of_columns,
                self.column_names.len(),
                self.column_types.len()
            )));
        }
        for (row_idx, row) in self.rows.iter().enumerate() {
            if row.values.len() != self.column_types.len() {
                return Err(Error::InvalidArgument(format!(
                    "row {} has {} values for {} columns",
                    row_idx,
                    row.values.len(),
                    self.column_types.len()
                )));
            }
            for (col_idx, cell) in row.values.iter().enumerate() {
                if let Some(value) = cell {
                    if !value.matches_dataset_type(self.column_types[col_idx]) {
                        return Err(Error::InvalidType {
                            expected: "data set column type",
                            got: format!("row {} column {}: {:?}", row_idx, col_idx, value),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// A typed template parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Declared parameter data type
    pub data_type: ParameterDataType,
    /// The value, or `None` when unset
    pub value: Option<ScalarValue>,
}

impl Parameter {
    /// Creates a parameter.
    pub fn new(
        name: impl Into<String>,
        data_type: ParameterDataType,
        value: Option<ScalarValue>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            value,
        }
    }
}

/// A reusable metric schema.
///
/// A *definition* (`is_definition = true`) declares the schema and must not
/// carry a `template_ref`; an *instance* references its definition by name
/// through `template_ref`. Instances refer to definitions by name only, never
/// by live pointer; resolve names through a [`TemplateRegistry`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    /// Schema version
    pub version: Option<String>,
    /// Name of the referenced definition; required on instances
    pub template_ref: Option<String>,
    /// Whether this is a definition (true) or an instance (false)
    pub is_definition: bool,
    /// Member metrics
    pub metrics: Vec<Metric>,
    /// Template parameters
    pub parameters: Vec<Parameter>,
}

/// A registry of template definitions keyed by name.
///
/// Instances carry only a `template_ref` string; this is where those names
/// resolve to definitions.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    definitions: HashMap<String, Template>,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under a name. Non-definitions are rejected.
    pub fn register(&mut self, name: impl Into<String>, template: Template) -> Result<()> {
        if !template.is_definition {
            return Err(Error::InvalidArgument(
                "only template definitions can be registered".to_string(),
            ));
        }
        self.definitions.insert(name.into(), template);
        Ok(())
    }

    /// Resolves a definition by name.
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.definitions.get(name)
    }

    /// Resolves the definition an instance refers to.
    pub fn resolve(&self, instance: &Template) -> Option<&Template> {
        instance
            .template_ref
            .as_deref()
            .and_then(|name| self.get(name))
    }
}

/// A single Sparkplug metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Metric name; absent for alias-only references
    pub name: Option<String>,
    /// Metric alias
    pub alias: Option<u64>,
    /// Metric timestamp in milliseconds since the Unix epoch
    pub timestamp: Option<u64>,
    /// Declared data type
    pub data_type: MetricDataType,
    /// Whether the value is historical
    pub is_historical: bool,
    /// Whether the value is transient
    pub is_transient: bool,
    /// Optional metadata
    pub metadata: Option<MetaData>,
    /// Optional property set
    pub properties: Option<PropertySet>,
    /// The value; `None` travels as the `is_null` flag
    pub value: Option<MetricValue>,
}

impl Metric {
    /// Creates a named metric with a value.
    pub fn new(name: impl Into<String>, data_type: MetricDataType, value: MetricValue) -> Self {
        Self {
            name: Some(name.into()),
            alias: None,
            timestamp: None,
            data_type,
            is_historical: false,
            is_transient: false,
            metadata: None,
            properties: None,
            value: Some(value),
        }
    }

    /// Creates a named null metric of the given type.
    pub fn null(name: impl Into<String>, data_type: MetricDataType) -> Self {
        Self {
            name: Some(name.into()),
            alias: None,
            timestamp: None,
            data_type,
            is_historical: false,
            is_transient: false,
            metadata: None,
            properties: None,
            value: None,
        }
    }

    /// Creates an alias-only metric, as used in NDATA after a birth.
    pub fn by_alias(alias: u64, data_type: MetricDataType, value: MetricValue) -> Self {
        Self {
            name: None,
            alias: Some(alias),
            timestamp: None,
            data_type,
            is_historical: false,
            is_transient: false,
            metadata: None,
            properties: None,
            value: Some(value),
        }
    }

    /// Attaches an alias.
    pub fn with_alias(mut self, alias: u64) -> Self {
        self.alias = Some(alias);
        self
    }

    /// Attaches a timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attaches a property set.
    pub fn with_properties(mut self, properties: PropertySet) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Returns true when the metric carries no value.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// A Sparkplug B payload: ordered metrics plus envelope fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparkplugBPayload {
    /// Payload timestamp in milliseconds since the Unix epoch
    pub timestamp: Option<u64>,
    /// Per-edge-node sequence number, 0..=255
    pub seq: Option<u64>,
    /// Payload UUID
    pub uuid: Option<String>,
    /// Ordered metrics
    pub metrics: Vec<Metric>,
    /// Opaque body bytes
    pub body: Option<Vec<u8>>,
}

impl SparkplugBPayload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the first metric with the given name.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics
            .iter()
            .find(|m| m.name.as_deref() == Some(name))
    }

    /// Extracts the `bdSeq` metric value from a BIRTH/DEATH payload.
    pub fn bd_seq(&self) -> Option<u64> {
        match self.metric(BDSEQ_METRIC_NAME)?.value.as_ref()? {
            MetricValue::UInt64(v) | MetricValue::DateTime(v) => Some(*v),
            MetricValue::Int64(v) => u64::try_from(*v).ok(),
            MetricValue::UInt32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }
}

/// Identifies an edge node: `(group_id, edge_node_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeNodeDescriptor {
    /// Sparkplug group ID
    pub group_id: String,
    /// Edge node ID
    pub edge_node_id: String,
}

impl EdgeNodeDescriptor {
    /// Creates a descriptor.
    pub fn new(group_id: impl Into<String>, edge_node_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            edge_node_id: edge_node_id.into(),
        }
    }
}

impl std::fmt::Display for EdgeNodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group_id, self.edge_node_id)
    }
}

/// Identifies a device attached to an edge node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// The owning edge node
    pub edge_node: EdgeNodeDescriptor,
    /// Device ID
    pub device_id: String,
}

impl DeviceDescriptor {
    /// Creates a descriptor.
    pub fn new(edge_node: EdgeNodeDescriptor, device_id: impl Into<String>) -> Self {
        Self {
            edge_node,
            device_id: device_id.into(),
        }
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.edge_node, self.device_id)
    }
}
