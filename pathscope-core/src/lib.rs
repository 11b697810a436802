//! # pathscope-core
//!
//! Trace model and extension points for pathscope.
//!
//! This crate provides:
//! - Typed field bags for arbitrary named per-path and per-bounce data
//! - Path and intersection records with their wire layout
//! - The trace session a renderer records into during a render-pixel request
//! - Plugin and renderer traits plus the plugin registry

pub mod error;
pub mod fields;
pub mod intersection;
pub mod path;
pub mod plugin;
pub mod renderer;
pub mod trace;

pub use error::{CoreError, PluginError, RenderError};
pub use fields::{FieldBag, FieldType, FieldValue};
pub use intersection::IntersectionRecord;
pub use path::PathRecord;
pub use plugin::{Plugin, PluginRegistry};
pub use renderer::{RenderSystem, Renderer};
pub use trace::TraceSession;
