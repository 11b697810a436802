//! Client error types.

use pathscope_protocol::{CodecError, DecodeFailure, TransportError};
use std::net::SocketAddr;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decode error: {0}")]
    Codec(#[from] CodecError),

    #[error("timed out connecting to {0}")]
    ConnectTimeout(SocketAddr),

    #[error("handshake failed: expected HELLO, received {received:#06x}")]
    Handshake { received: u16 },

    #[error("unexpected message: expected {expected}, received {received:#06x}")]
    Unexpected { expected: &'static str, received: u16 },

    #[error("server closed the session")]
    Disconnected,

    #[error("server quit")]
    ServerQuit,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns whether the session with the server is over.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Transport(_)
                | ClientError::Disconnected
                | ClientError::ServerQuit
        )
    }
}

impl DecodeFailure for ClientError {
    fn is_incomplete(&self) -> bool {
        match self {
            ClientError::Codec(e) => e.is_incomplete(),
            ClientError::Transport(e) => e.is_incomplete(),
            _ => false,
        }
    }
}
