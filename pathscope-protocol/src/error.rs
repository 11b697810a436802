//! Codec and transport error types.

use thiserror::Error;

/// Errors produced while decoding wire values from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("incomplete value: need {needed} more bytes")]
    Incomplete { needed: usize },

    #[error("invalid string length: {0}")]
    InvalidLength(i32),

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    #[error("unknown mesh type: {0}")]
    UnknownMeshType(u16),
}

/// Errors raised by a transport on the active connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("value too large: {size} bytes buffered (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
