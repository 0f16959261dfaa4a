//! Error types for the Sparkplug Rust API.

use thiserror::Error;

/// Result type alias for Sparkplug operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur when using the Sparkplug API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required argument was missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value's runtime shape did not match its declared data type.
    #[error("Invalid type: expected {expected}, got {got}")]
    InvalidType {
        /// The declared data type.
        expected: &'static str,
        /// What was actually supplied.
        got: String,
    },

    /// A numeric value was outside the range of its declared data type.
    #[error("Out of range for {datatype}: {value}")]
    OutOfRange {
        /// The declared data type.
        datatype: &'static str,
        /// The offending value, rendered for diagnostics.
        value: String,
    },

    /// An unknown or unsupported data type code.
    #[error("Unknown data type code: {0}")]
    UnknownType(u32),

    /// The broker rejected a subscription or granted a different QoS than requested.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// An operation required a live broker connection.
    #[error("MQTT client {client_id} is not connected")]
    NotConnected {
        /// The client that was asked to perform the operation.
        client_id: String,
    },

    /// A Sparkplug sequence number did not match the expected value.
    #[error("Sequence gap: expected {}, got {got}", .expected.map_or_else(|| "none".to_string(), |e| e.to_string()))]
    SequenceGap {
        /// The next expected sequence number; `None` before any NBIRTH.
        expected: Option<u8>,
        /// The sequence number that actually arrived.
        got: u8,
    },

    /// An NDEATH carried a bdSeq that does not pair with the last NBIRTH.
    #[error("bdSeq mismatch: expected {expected}, got {got}")]
    BdSeqMismatch {
        /// The bdSeq registered by the last NBIRTH.
        expected: u64,
        /// The bdSeq carried by the NDEATH.
        got: u64,
    },

    /// A bounded wait expired.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The wire bytes were not a valid protobuf payload.
    #[error("Invalid wire payload: {0}")]
    InvalidWire(#[from] prost::DecodeError),

    /// A decoded payload declared one data type but carried another value field.
    #[error("Wire type mismatch for {datatype}: {detail}")]
    TypeMismatch {
        /// The declared data type.
        datatype: &'static str,
        /// What was wrong with the carried value.
        detail: String,
    },

    /// A packed array's byte length was inconsistent with its element type.
    #[error("Truncated {datatype} array: {detail}")]
    TruncatedArray {
        /// The array data type.
        datatype: &'static str,
        /// Length details.
        detail: String,
    },

    /// A topic string did not follow the Sparkplug B convention.
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// An error raised by the underlying MQTT client.
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Anything that should not happen in a correct deployment.
    #[error("Internal error: {0}")]
    Internal(String),
}
