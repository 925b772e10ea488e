//! WebSocket message codec for the Signal K stream.

use thiserror::Error;

use crate::messages::{ClientMessage, ServerMessage};

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to serialize message: {0}")]
    SerializeError(#[from] serde_json::Error),

    #[error("Expected text frame, received binary")]
    BinaryFrame,

    /// Valid JSON that is neither a hello nor a delta.
    #[error("Unknown message type")]
    UnknownMessage,
}

/// Encode a client message for transmission.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::from)
}

/// Decode a server message received over the stream.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    serde_json::from_value(value).map_err(|_| CodecError::UnknownMessage)
}
