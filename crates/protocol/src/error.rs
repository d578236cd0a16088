//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while reading frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid packet opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Unknown delta type: {0}")]
    UnknownDeltaType(u8),
}
