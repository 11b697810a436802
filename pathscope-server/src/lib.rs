//! # pathscope-server
//!
//! TCP server for pathscope.
//!
//! This crate provides:
//! - The single-client connection manager (accept, handshake, dispatch loop)
//! - The session controller binding a renderer, trace session and plugins
//! - Per-connection bookkeeping and server statistics
//! - Layered configuration (defaults, YAML file, environment)

pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod server;

pub use config::{Config, ConfigError, DemoConfig, LoggingConfig, NetworkConfig, SessionConfig};
pub use connection::Connection;
pub use controller::{PluginOutcome, SessionController};
pub use error::ServerError;
pub use server::{Server, ServerConfig, ServerState, ServerStats};
