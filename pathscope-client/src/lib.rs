//! # pathscope-client
//!
//! Client library for pathscope.
//!
//! This crate provides:
//! - Async TCP client performing the HELLO handshake
//! - Request helpers for every built-in opcode and for plugin requests
//! - Typed decoding of server messages, including render-pixel traces

pub mod client;
pub mod connection;
pub mod error;
pub mod trace;

pub use client::{Client, SceneData, ServerMessage, Welcome};
pub use connection::ConnectionConfig;
pub use error::ClientError;
pub use trace::PixelTrace;
