//! Fault types reported by the node's collaborators

use thiserror_no_std::Error;

/// Sensor could not be brought up or measured.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    #[error("sensor not found")]
    NotFound,
    #[error("sensor read failed")]
    ReadFailed,
}

/// Wireless link could not be configured or asked to associate.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFault {
    #[error("radio unavailable")]
    Unavailable,
    #[error("station configuration rejected")]
    Config,
    #[error("radio start failed")]
    Start,
    #[error("association request failed")]
    Associate,
}

/// Broker session setup or traffic failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFault {
    #[error("broker address is not an IPv4 address")]
    BadAddress,
    #[error("topic or client id is empty")]
    MissingIdentity,
    #[error("network stack unavailable")]
    Unavailable,
    #[error("transport error")]
    Transport,
    #[error("broker did not answer in time")]
    Timeout,
    #[error("broker refused connection (code {0})")]
    Refused(u8),
    #[error("codec: {0}")]
    Codec(CodecError),
}

impl From<CodecError> for PublishFault {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// Serialized reading does not fit the payload buffer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload exceeds {0} bytes")]
    TooLong(usize),
}

/// MQTT packet encoding/decoding failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("packet incomplete")]
    Incomplete,
    #[error("malformed packet")]
    Malformed,
}
