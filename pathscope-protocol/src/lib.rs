//! # pathscope-protocol
//!
//! Wire protocol implementation for pathscope, the renderer debugging channel.
//!
//! This crate provides:
//! - Little-endian binary codec for primitives, strings and geometric values
//! - The fixed opcode table shared by server, client and plugins
//! - Scene and render-info records streamed by renderers
//! - A buffered transport with full-read/full-write semantics over any async stream

pub mod codec;
pub mod error;
pub mod message;
pub mod scene;
pub mod transport;
pub mod types;

pub use codec::{DecodeFailure, WireRead, WireValue, WireWrite};
pub use error::{CodecError, TransportError};
pub use message::{MeshType, Opcode};
pub use scene::{Camera, Mesh, RenderInfo, SceneObject, Sphere};
pub use transport::Transport;
pub use types::{Color4f, Point2f, Point2i, Point3f, Point3i, Vec3f};

/// Default TCP port for the pathscope server.
pub const DEFAULT_PORT: u16 = 50013;

/// Maximum number of bytes buffered while waiting for a single value (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
