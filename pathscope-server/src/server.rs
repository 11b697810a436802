//! TCP server implementation.
//!
//! The server owns the listening socket and serves one client at a time:
//! accept, handshake, then a dispatch loop until the client disconnects,
//! quits, or the connection fails. A quit (or [`Server::shutdown`]) stops
//! the server for good.

use crate::connection::Connection;
use crate::controller::{PluginOutcome, SessionController};
use crate::error::ServerError;
use parking_lot::{Mutex, RwLock};
use pathscope_protocol::{Opcode, TransportError, DEFAULT_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, MutexGuard};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Whether to disable Nagle's algorithm on accepted connections.
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            nodelay: true,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// Lifecycle of the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
    Handshaking,
    Serving,
    Stopped,
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub handshakes_rejected: AtomicU64,
    pub requests_total: AtomicU64,
    pub plugin_requests: AtomicU64,
    pub errors_total: AtomicU64,
}

/// How a served connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// The client is gone; go back to listening.
    Disconnected,
    /// The client asked the server to quit.
    Quit,
    /// [`Server::shutdown`] was called.
    Shutdown,
}

/// Single-client TCP server for pathscope.
pub struct Server {
    config: ServerConfig,
    controller: tokio::sync::Mutex<SessionController>,
    state: RwLock<ServerState>,
    stats: Arc<ServerStats>,
    shutdown: watch::Sender<bool>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, controller: SessionController) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            controller: tokio::sync::Mutex::new(controller),
            state: RwLock::new(ServerState::Idle),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Binds the listening socket without accepting yet, and returns the
    /// bound address. Calling it again after a successful bind is a no-op.
    pub async fn bind(&self) -> Result<SocketAddr, ServerError> {
        let bound = *self.local_addr.lock();
        if let Some(addr) = bound {
            return Ok(addr);
        }
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        *self.listener.lock() = Some(listener);
        *self.local_addr.lock() = Some(addr);
        self.set_state(ServerState::Listening);
        Ok(addr)
    }

    /// Runs the accept loop until a client quits or [`Server::shutdown`] is
    /// called. Binds first if [`Server::bind`] has not been called.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.state() == ServerState::Stopped {
            return Err(ServerError::Stopped);
        }
        self.bind().await?;
        let taken = self.listener.lock().take();
        let Some(listener) = taken else {
            return Err(ServerError::Stopped);
        };

        tracing::info!("Server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut controller = self.controller.lock().await;

        loop {
            self.set_state(ServerState::Listening);

            let (stream, addr) = tokio::select! {
                result = listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    tracing::info!("Server shutting down");
                    break;
                }
            };

            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
            tracing::info!("Client connected: {}", addr);
            if self.config.nodelay {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("[{}] failed to set TCP_NODELAY: {}", addr, e);
                }
            }

            let mut conn = Connection::new(stream, addr);
            let result = self
                .serve_connection(&mut conn, &mut controller, &mut shutdown_rx)
                .await;
            let stop = self.finish_connection(&conn, result);

            if let Err(e) = conn.close().await {
                tracing::debug!("[{}] close failed: {}", addr, e);
            }
            tracing::info!(
                "Client disconnected: {} ({} requests in {:?})",
                addr,
                conn.request_count(),
                conn.age()
            );

            if stop {
                break;
            }
        }

        drop(listener);
        self.set_state(ServerState::Stopped);
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Logs how a connection ended and returns whether the server stops.
    fn finish_connection(
        &self,
        conn: &Connection<TcpStream>,
        result: Result<ConnectionEnd, ServerError>,
    ) -> bool {
        let addr = conn.remote_addr;
        match result {
            Ok(ConnectionEnd::Disconnected) => false,
            Ok(ConnectionEnd::Quit) => {
                tracing::info!("[{}] quit requested", addr);
                true
            }
            Ok(ConnectionEnd::Shutdown) => true,
            Err(ServerError::Handshake { received }) => {
                tracing::warn!(
                    "[{}] handshake rejected: expected HELLO, got {:#06x}",
                    addr,
                    received
                );
                self.stats.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(ServerError::Transport(TransportError::Closed)) => {
                tracing::debug!("[{}] connection closed by peer", addr);
                false
            }
            Err(e) => {
                tracing::error!("[{}] connection error: {}", addr, e);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    async fn serve_connection(
        &self,
        conn: &mut Connection<TcpStream>,
        controller: &mut SessionController,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<ConnectionEnd, ServerError> {
        let addr = conn.remote_addr;
        self.set_state(ServerState::Handshaking);

        conn.send_opcode(Opcode::Hello).await?;
        let reply = tokio::select! {
            result = conn.read_opcode() => result?,
            _ = wait_for_shutdown(shutdown_rx) => return Ok(ConnectionEnd::Shutdown),
        };
        if reply != Opcode::Hello.code() {
            return Err(ServerError::Handshake { received: reply });
        }

        self.set_state(ServerState::Serving);
        controller.respond_render_system(conn.transport()).await?;
        controller.respond_supported_plugins(conn.transport()).await?;
        conn.record_sent(Opcode::SupportedPlugins.code());

        tracing::info!(
            "[{}] handshake complete (connection {}, render system {}, {} plugins)",
            addr,
            conn.id,
            controller.render_system(),
            controller.plugins().len()
        );

        loop {
            let opcode = tokio::select! {
                result = conn.read_opcode() => result?,
                _ = wait_for_shutdown(shutdown_rx) => {
                    tracing::info!("[{}] server shutting down, sending QUIT", addr);
                    if let Err(e) = conn.send_opcode(Opcode::Quit).await {
                        tracing::debug!("[{}] failed to send QUIT: {}", addr, e);
                    }
                    return Ok(ConnectionEnd::Shutdown);
                }
            };
            conn.record_request();
            self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("[{}] received {:#06x}", addr, opcode);

            match self.dispatch(opcode, conn, controller).await {
                Ok(Some(end)) => return Ok(end),
                Ok(None) => {}
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    tracing::error!("[{}] request {:#06x} failed: {}", addr, opcode, e);
                    self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                    conn.abort_with(Opcode::Disconnect).await?;
                    return Ok(ConnectionEnd::Disconnected);
                }
            }
        }
    }

    /// Handles one request. Plugins get the first look at every opcode.
    async fn dispatch(
        &self,
        opcode: u16,
        conn: &mut Connection<TcpStream>,
        controller: &mut SessionController,
    ) -> Result<Option<ConnectionEnd>, ServerError> {
        match controller
            .respond_plugin_request(opcode, conn.transport())
            .await?
        {
            PluginOutcome::Handled => {
                self.stats.plugin_requests.fetch_add(1, Ordering::Relaxed);
                conn.record_sent(opcode);
                return Ok(None);
            }
            PluginOutcome::Failed => return Ok(None),
            PluginOutcome::Unclaimed => {}
        }

        match Opcode::from_code(opcode) {
            Some(Opcode::RenderInfoQuery) => {
                controller.respond_render_info(conn.transport()).await?;
                conn.record_sent(Opcode::RenderInfoQuery.code());
            }
            Some(Opcode::RenderInfoSet) => {
                controller.read_render_info(conn.transport()).await?;
            }
            Some(Opcode::SceneData) => {
                controller.respond_scene_data(conn.transport()).await?;
                conn.record_sent(Opcode::SceneData.code());
            }
            Some(Opcode::RenderImage) => {
                controller.respond_render_image(conn.transport()).await?;
                conn.record_sent(Opcode::RenderImage.code());
            }
            Some(Opcode::RenderPixel) => {
                controller.respond_render_pixel(conn.transport()).await?;
                conn.record_sent(Opcode::RenderPixel.code());
            }
            Some(Opcode::Disconnect) => {
                conn.send_opcode(Opcode::Disconnect).await?;
                tracing::info!("[{}] client requested disconnect", conn.remote_addr);
                return Ok(Some(ConnectionEnd::Disconnected));
            }
            Some(Opcode::Quit) => {
                conn.send_opcode(Opcode::Quit).await?;
                return Ok(Some(ConnectionEnd::Quit));
            }
            _ => {
                tracing::warn!("[{}] unknown opcode {:#06x}", conn.remote_addr, opcode);
            }
        }
        Ok(None)
    }

    /// Signals the server to stop. A connected client is sent QUIT first.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.write() = state;
    }

    /// Returns whether the server has been bound and has not stopped.
    pub fn is_running(&self) -> bool {
        !matches!(self.state(), ServerState::Idle | ServerState::Stopped)
    }

    /// Returns the bound address, once [`Server::bind`] or [`Server::run`]
    /// has bound the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Locks the session controller. Held by [`Server::run`] while serving.
    pub async fn controller(&self) -> MutexGuard<'_, SessionController> {
        self.controller.lock().await
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stopped| *stopped).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
