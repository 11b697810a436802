//! Server error types.

use pathscope_core::{CoreError, PluginError, RenderError};
use pathscope_protocol::TransportError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("handshake rejected: expected HELLO, received {received:#06x}")]
    Handshake { received: u16 },

    #[error("renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("configuration error: {0}")]
    Core(#[from] CoreError),

    #[error("server stopped")]
    Stopped,
}

impl ServerError {
    /// Returns whether the error came from the connection itself rather than
    /// from the work a request triggered.
    pub fn is_transport(&self) -> bool {
        matches!(self, ServerError::Io(_) | ServerError::Transport(_))
    }
}
