//! # Player Errors
//!
//! Every fallible path in the crate reports one of three error families:
//!
//! - [`SchemaError`]: a channel's schema could not be turned into a decoder, or a
//!   payload could not be decoded with it.
//! - [`ProtocolError`]: a frame from the server did not match the wire format.
//! - [`PlayerError`]: errors surfaced to the consumer of the player handle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unsupported encoding {encoding}")]
    UnsupportedEncoding { encoding: String },

    #[error("Schema is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid descriptor set: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),

    #[error("Type {schema_name} was not found in the descriptor set")]
    UnknownType { schema_name: String },

    #[error("Failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to convert decoded message: {0}")]
    Convert(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed control message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary frame is empty")]
    EmptyFrame,

    #[error("Unknown binary opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("Binary frame too short: expected at least {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("Invalid connection request: {0}")]
    Request(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Error)]
pub enum PlayerError {
    /// Publishing and parameter editing are declared capabilities this player does not have.
    #[error("{0} is not supported by this player")]
    Unsupported(&'static str),

    #[error("Failed to decode message on topic {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: SchemaError,
    },
}
