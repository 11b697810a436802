//! Core error types.

use pathscope_protocol::{CodecError, DecodeFailure, TransportError};
use thiserror::Error;

/// Configuration errors raised while assembling a session.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("duplicate plugin id {id:#06x} ('{name}' conflicts with '{existing}')")]
    DuplicatePluginId {
        id: u16,
        name: String,
        existing: String,
    },

    #[error("plugin id {id:#06x} ('{name}') collides with a builtin opcode")]
    ReservedPluginId { id: u16, name: String },
}

/// Failures inside a plugin's request handling.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("malformed plugin payload: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("plugin failed: {0}")]
    Failed(String),

    #[error("plugin panicked: {0}")]
    Panicked(String),
}

impl PluginError {
    pub fn failed(reason: impl Into<String>) -> Self {
        PluginError::Failed(reason.into())
    }

    /// Returns whether the connection itself is unusable after this error.
    pub fn is_transport(&self) -> bool {
        matches!(self, PluginError::Transport(_))
    }
}

impl DecodeFailure for PluginError {
    fn is_incomplete(&self) -> bool {
        match self {
            PluginError::Codec(e) => e.is_incomplete(),
            PluginError::Transport(e) => e.is_incomplete(),
            _ => false,
        }
    }
}

/// Failures reported by a renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Failed(String),

    #[error("renderer panicked: {0}")]
    Panicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn failed(reason: impl Into<String>) -> Self {
        RenderError::Failed(reason.into())
    }
}

/// Extracts a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::DuplicatePluginId {
            id: 0x0100,
            name: "b".to_string(),
            existing: "a".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x0100"));
        assert!(msg.contains("'a'"));

        let err = CoreError::ReservedPluginId {
            id: 0x000E,
            name: "pixel".to_string(),
        };
        assert!(err.to_string().contains("builtin"));
    }

    #[test]
    fn test_plugin_error_incomplete() {
        let err: PluginError = CodecError::Incomplete { needed: 2 }.into();
        assert!(err.is_incomplete());
        assert!(!err.is_transport());
        assert!(!PluginError::failed("boom").is_incomplete());
        assert!(PluginError::from(TransportError::Closed).is_transport());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
