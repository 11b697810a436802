//! Session controller.
//!
//! Binds a [`Renderer`], the [`TraceSession`] and the [`PluginRegistry`] to
//! protocol semantics. Each `respond_*` method reads whatever request payload
//! follows its opcode, runs the work, and writes and flushes the reply.
//!
//! Renderer and plugin calls run behind a panic guard, so a crashing
//! collaborator surfaces as an ordinary error.

use crate::error::ServerError;
use bytes::{BufMut, BytesMut};
use pathscope_core::error::panic_message;
use pathscope_core::{
    CoreError, Plugin, PluginError, PluginRegistry, RenderError, RenderSystem, Renderer,
    TraceSession,
};
use pathscope_protocol::{Opcode, Transport, WireWrite};
use std::panic::{self, AssertUnwindSafe};
use tokio::io::{AsyncRead, AsyncWrite};

/// Result of offering an opcode to the plugin registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOutcome {
    /// A plugin handled the request and its response was sent.
    Handled,
    /// No plugin is registered under the opcode.
    Unclaimed,
    /// The plugin failed; nothing was sent and the connection stays up.
    Failed,
}

pub struct SessionController {
    renderer: Box<dyn Renderer>,
    trace: TraceSession,
    plugins: PluginRegistry,
    render_system: RenderSystem,
}

impl SessionController {
    pub fn new(renderer: Box<dyn Renderer>, render_system: RenderSystem) -> Self {
        Self {
            renderer,
            trace: TraceSession::new(),
            plugins: PluginRegistry::new(),
            render_system,
        }
    }

    /// Registers a plugin. Duplicate or reserved ids are rejected.
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<(), CoreError> {
        self.plugins.register(plugin)
    }

    pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Result<Self, CoreError> {
        self.register_plugin(plugin)?;
        Ok(self)
    }

    pub fn render_system(&self) -> RenderSystem {
        self.render_system
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn trace(&self) -> &TraceSession {
        &self.trace
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Writes the render-system id.
    pub async fn respond_render_system<S>(
        &mut self,
        transport: &mut Transport<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        transport.out().put_u16_le(self.render_system.id());
        transport.flush().await?;
        Ok(())
    }

    /// Writes SUPPORTED_PLUGINS, the plugin count and every plugin id.
    pub async fn respond_supported_plugins<S>(
        &mut self,
        transport: &mut Transport<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ids = self.plugins.ids();
        let out = transport.out();
        out.put_opcode(Opcode::SupportedPlugins);
        out.put_u32_le(ids.len() as u32);
        out.put_array(&ids);
        transport.flush().await?;
        Ok(())
    }

    /// Reads the set form of the render info and applies the sample count.
    pub async fn read_render_info<S>(
        &mut self,
        transport: &mut Transport<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let sample_count: i32 = transport.read_value().await?;
        tracing::debug!("updating sample count to {}", sample_count);
        let renderer = &mut self.renderer;
        guard_render(|| {
            renderer.update_sample_count(sample_count);
            Ok(())
        })?;
        Ok(())
    }

    pub async fn respond_render_info<S>(
        &mut self,
        transport: &mut Transport<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        {
            let renderer = &mut self.renderer;
            let out = transport.out();
            guard_render(|| renderer.send_render_information(out))?;
        }
        transport.flush().await?;
        Ok(())
    }

    /// Renders the full image, then acknowledges with RENDER_IMAGE.
    pub async fn respond_render_image<S>(
        &mut self,
        transport: &mut Transport<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let renderer = &mut self.renderer;
        guard_render(|| renderer.render_image())?;
        transport.out().put_opcode(Opcode::RenderImage);
        transport.flush().await?;
        Ok(())
    }

    /// Streams the camera record followed by the mesh records.
    pub async fn respond_scene_data<S>(
        &mut self,
        transport: &mut Transport<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        {
            let renderer = &mut self.renderer;
            let out = transport.out();
            guard_render(|| {
                renderer.send_camera_data(out)?;
                renderer.send_mesh_data(out)
            })?;
        }
        transport.flush().await?;
        Ok(())
    }

    /// Captures and returns the trace of one pixel.
    ///
    /// Capture is disabled and the trace cleared on every exit path.
    pub async fn respond_render_pixel<S>(
        &mut self,
        transport: &mut Transport<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.trace.enable();
        let result = self.capture_pixel(transport).await;
        self.trace.disable();
        self.trace.clear();
        result
    }

    async fn capture_pixel<S>(&mut self, transport: &mut Transport<S>) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let x: i32 = transport.read_value().await?;
        let y: i32 = transport.read_value().await?;
        let sample_count: i32 = transport.read_value().await?;
        tracing::debug!("render pixel ({}, {}) with {} samples", x, y, sample_count);

        let renderer = &mut self.renderer;
        let trace = &mut self.trace;
        guard_render(|| renderer.render_pixel(x, y, sample_count, trace))?;

        tracing::debug!("captured {} paths", self.trace.len());
        self.trace.serialize(transport.out());
        transport.flush().await?;
        Ok(())
    }

    /// Offers `id` to the plugin registry.
    ///
    /// Transport failures are returned as errors; any other plugin failure
    /// is logged and reported as [`PluginOutcome::Failed`].
    pub async fn respond_plugin_request<S>(
        &mut self,
        id: u16,
        transport: &mut Transport<S>,
    ) -> Result<PluginOutcome, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(plugin) = self.plugins.get_mut(id) else {
            return Ok(PluginOutcome::Unclaimed);
        };
        let name = plugin.name().to_string();
        tracing::debug!("running plugin '{}' ({:#06x})", name, id);

        match execute_plugin(plugin, transport).await {
            Ok(payload) => {
                let out = transport.out();
                out.put_u16_le(id);
                out.extend_from_slice(&payload);
                transport.flush().await?;
                Ok(PluginOutcome::Handled)
            }
            Err(PluginError::Transport(e)) => Err(e.into()),
            Err(e) => {
                tracing::warn!("plugin '{}' ({:#06x}) failed: {}", name, id, e);
                Ok(PluginOutcome::Failed)
            }
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("render_system", &self.render_system)
            .field("plugins", &self.plugins)
            .field("trace_paths", &self.trace.len())
            .finish()
    }
}

/// Deserializes, runs and serializes one plugin request. The response
/// payload is returned so nothing is written unless every step succeeds.
///
/// Request bytes the plugin read before failing are dropped, so the next
/// read starts after them.
async fn execute_plugin<S>(
    plugin: &mut dyn Plugin,
    transport: &mut Transport<S>,
) -> Result<BytesMut, PluginError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport
        .read_with_discard(|buf| guard_plugin(|| plugin.deserialize(buf)))
        .await?;
    guard_plugin(|| plugin.run())?;

    let mut payload = BytesMut::new();
    guard_plugin(|| plugin.serialize(&mut payload))?;
    Ok(payload)
}

fn guard_render<T>(f: impl FnOnce() -> Result<T, RenderError>) -> Result<T, RenderError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(RenderError::Panicked(panic_message(payload.as_ref()))))
}

fn guard_plugin<T>(f: impl FnOnce() -> Result<T, PluginError>) -> Result<T, PluginError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PluginError::Panicked(panic_message(payload.as_ref()))))
}
