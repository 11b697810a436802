//! Bundled renderer and plugin served by the `pathscope` binary.
//!
//! The demo renderer is a small diffuse path tracer over a fixed sphere
//! scene. It exists so a client has something real to inspect without a
//! production renderer wired in.

mod plugin;
mod renderer;

pub use plugin::EchoPlugin;
pub use renderer::DemoRenderer;
