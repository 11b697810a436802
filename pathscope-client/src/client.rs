//! High-level client API.

use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use crate::trace::PixelTrace;
use bytes::BufMut;
use pathscope_core::RenderSystem;
use pathscope_protocol::{
    Camera, Opcode, RenderInfo, SceneObject, Transport, WireRead, WireValue, WireWrite,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// What the server announced during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    pub render_system: RenderSystem,
    /// Registered plugin ids, ascending.
    pub plugins: Vec<u16>,
}

impl Welcome {
    pub fn supports(&self, plugin_id: u16) -> bool {
        self.plugins.contains(&plugin_id)
    }
}

/// A message read from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    RenderInfo(RenderInfo),
    Camera(Camera),
    SceneObject(SceneObject),
    /// Acknowledges a finished full-image render.
    RenderImage,
    RenderPixel(PixelTrace),
    /// A plugin response header. The plugin-defined payload follows and is
    /// read by the caller.
    Plugin(u16),
    Disconnect,
    Quit,
}

impl ServerMessage {
    pub fn opcode(&self) -> u16 {
        match self {
            ServerMessage::RenderInfo(_) => Opcode::RenderInfoQuery.code(),
            ServerMessage::Camera(_) => Opcode::Camera.code(),
            ServerMessage::SceneObject(_) => Opcode::SceneData.code(),
            ServerMessage::RenderImage => Opcode::RenderImage.code(),
            ServerMessage::RenderPixel(_) => Opcode::RenderPixel.code(),
            ServerMessage::Plugin(id) => *id,
            ServerMessage::Disconnect => Opcode::Disconnect.code(),
            ServerMessage::Quit => Opcode::Quit.code(),
        }
    }
}

/// Scene records streamed in reply to a scene-data request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneData {
    pub camera: Option<Camera>,
    pub objects: Vec<SceneObject>,
}

/// Client for a pathscope server.
pub struct Client<S = TcpStream> {
    transport: Transport<S>,
    welcome: Welcome,
}

impl Client<TcpStream> {
    /// Connects to `addr` with default settings and performs the handshake.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_with(ConnectionConfig::new(addr)).await
    }

    pub async fn connect_with(config: ConnectionConfig) -> Result<Self, ClientError> {
        let stream = config.dial().await?;
        tracing::debug!("connected to {}", config.addr);
        Self::handshake(stream).await
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the client side of the handshake over an open stream: wait for
    /// HELLO, echo it, then read the render system and plugin list.
    pub async fn handshake(stream: S) -> Result<Self, ClientError> {
        let mut transport = Transport::new(stream);

        let hello = transport.read_opcode().await?;
        if hello != Opcode::Hello.code() {
            return Err(ClientError::Handshake { received: hello });
        }
        transport.send_opcode(Opcode::Hello).await?;

        let welcome = transport
            .read_with(|buf| {
                let render_system = RenderSystem::from_id(buf.get_wire()?);
                let opcode: u16 = buf.get_wire()?;
                if opcode != Opcode::SupportedPlugins.code() {
                    return Err(ClientError::Unexpected {
                        expected: "SUPPORTED_PLUGINS",
                        received: opcode,
                    });
                }
                let count: u32 = buf.get_wire()?;
                let plugins = buf.get_array::<u16>(count as usize)?;
                Ok(Welcome {
                    render_system,
                    plugins,
                })
            })
            .await?;

        tracing::debug!(
            "handshake complete: render system {}, plugins {:?}",
            welcome.render_system,
            welcome.plugins
        );
        Ok(Self { transport, welcome })
    }

    pub fn welcome(&self) -> &Welcome {
        &self.welcome
    }

    /// Reads and decodes the next server message.
    ///
    /// Cancel-safe: a message is consumed only once it has been decoded in
    /// full, so `recv` can be raced against a timer.
    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        let plugins = &self.welcome.plugins;
        self.transport
            .read_with(|buf| {
                let opcode: u16 = buf.get_wire()?;
                if plugins.contains(&opcode) {
                    return Ok(ServerMessage::Plugin(opcode));
                }
                let message = match Opcode::from_code(opcode) {
                    Some(Opcode::RenderInfoQuery) => {
                        ServerMessage::RenderInfo(RenderInfo::decode_body(buf)?)
                    }
                    Some(Opcode::Camera) => ServerMessage::Camera(Camera::decode_body(buf)?),
                    Some(Opcode::SceneData) => {
                        ServerMessage::SceneObject(SceneObject::decode_body(buf)?)
                    }
                    Some(Opcode::RenderImage) => ServerMessage::RenderImage,
                    Some(Opcode::RenderPixel) => {
                        ServerMessage::RenderPixel(PixelTrace::decode(buf)?)
                    }
                    Some(Opcode::Disconnect) => ServerMessage::Disconnect,
                    Some(Opcode::Quit) => ServerMessage::Quit,
                    _ => {
                        return Err(ClientError::Unexpected {
                            expected: "a server message",
                            received: opcode,
                        })
                    }
                };
                Ok(message)
            })
            .await
    }

    /// Reads one value of a plugin response payload.
    pub async fn read_value<T: WireValue>(&mut self) -> Result<T, ClientError> {
        Ok(self.transport.read_value().await?)
    }

    /// Reads the next message, mapping DISCONNECT and QUIT to errors.
    async fn recv_reply(&mut self) -> Result<ServerMessage, ClientError> {
        match self.recv().await? {
            ServerMessage::Disconnect => {
                tracing::debug!("server ended the session");
                Err(ClientError::Disconnected)
            }
            ServerMessage::Quit => Err(ClientError::ServerQuit),
            message => Ok(message),
        }
    }

    fn unexpected(expected: &'static str, message: &ServerMessage) -> ClientError {
        ClientError::Unexpected {
            expected,
            received: message.opcode(),
        }
    }

    pub async fn request_render_info(&mut self) -> Result<RenderInfo, ClientError> {
        self.transport.send_opcode(Opcode::RenderInfoQuery).await?;
        match self.recv_reply().await? {
            ServerMessage::RenderInfo(info) => Ok(info),
            other => Err(Self::unexpected("RENDER_INFO_QUERY", &other)),
        }
    }

    /// Sets the renderer's sample count. The server does not reply.
    pub async fn set_sample_count(&mut self, sample_count: i32) -> Result<(), ClientError> {
        RenderInfo::encode_sample_count(self.transport.out(), sample_count);
        self.transport.flush().await?;
        Ok(())
    }

    /// Renders the full image and waits for the acknowledgement.
    pub async fn render_image(&mut self) -> Result<(), ClientError> {
        self.transport.send_opcode(Opcode::RenderImage).await?;
        match self.recv_reply().await? {
            ServerMessage::RenderImage => Ok(()),
            other => Err(Self::unexpected("RENDER_IMAGE", &other)),
        }
    }

    /// Requests the scene and collects records until none arrives for `idle`.
    ///
    /// The scene stream carries no terminator, so the idle gap marks its end.
    pub async fn request_scene_data(&mut self, idle: Duration) -> Result<SceneData, ClientError> {
        self.transport.send_opcode(Opcode::SceneData).await?;

        let mut scene = SceneData::default();
        loop {
            let message = match tokio::time::timeout(idle, self.recv_reply()).await {
                Ok(message) => message?,
                Err(_) => break,
            };
            match message {
                ServerMessage::Camera(camera) => scene.camera = Some(camera),
                ServerMessage::SceneObject(object) => scene.objects.push(object),
                other => return Err(Self::unexpected("scene data", &other)),
            }
        }
        tracing::debug!("received {} scene objects", scene.objects.len());
        Ok(scene)
    }

    /// Traces one pixel and returns every recorded path.
    pub async fn render_pixel(
        &mut self,
        x: i32,
        y: i32,
        sample_count: i32,
    ) -> Result<PixelTrace, ClientError> {
        let out = self.transport.out();
        out.put_opcode(Opcode::RenderPixel);
        out.put_i32_le(x);
        out.put_i32_le(y);
        out.put_i32_le(sample_count);
        self.transport.flush().await?;

        match self.recv_reply().await? {
            ServerMessage::RenderPixel(trace) => Ok(trace),
            other => Err(Self::unexpected("RENDER_PIXEL", &other)),
        }
    }

    /// Sends a plugin request: the plugin id followed by `payload`.
    ///
    /// The response header arrives as [`ServerMessage::Plugin`]; a plugin
    /// that fails on the server sends nothing back.
    pub async fn plugin_request(&mut self, plugin_id: u16, payload: &[u8]) -> Result<(), ClientError> {
        let out = self.transport.out();
        out.put_u16_le(plugin_id);
        out.extend_from_slice(payload);
        self.transport.flush().await?;
        Ok(())
    }

    /// Ends the session. The server goes back to listening.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.transport.send_opcode(Opcode::Disconnect).await?;
        self.wait_for(Opcode::Disconnect).await?;
        self.transport.close().await?;
        Ok(())
    }

    /// Asks the server to quit.
    pub async fn quit(mut self) -> Result<(), ClientError> {
        self.transport.send_opcode(Opcode::Quit).await?;
        self.wait_for(Opcode::Quit).await?;
        self.transport.close().await?;
        Ok(())
    }

    /// Skips messages until `opcode` arrives.
    async fn wait_for(&mut self, opcode: Opcode) -> Result<(), ClientError> {
        loop {
            let message = self.recv().await?;
            if message.opcode() == opcode.code() {
                return Ok(());
            }
            tracing::debug!("skipping {:#06x} while waiting for {}", message.opcode(), opcode);
        }
    }
}
