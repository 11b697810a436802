//! Per-connection state.

use pathscope_protocol::{Opcode, Transport, TransportError};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use uuid::Uuid;

/// The active client connection.
pub struct Connection<S = TcpStream> {
    /// Unique connection ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    transport: Transport<S>,

    /// Last opcode written to the client.
    last_sent: Option<u16>,

    /// Last opcode read from the client.
    last_received: Option<u16>,

    running: bool,

    request_count: u64,

    connected_at: Instant,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            transport: Transport::new(stream),
            last_sent: None,
            last_received: None,
            running: true,
            request_count: 0,
            connected_at: Instant::now(),
        }
    }

    pub fn transport(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    /// Reads the next opcode and records it.
    pub async fn read_opcode(&mut self) -> Result<u16, TransportError> {
        let opcode = self.transport.read_opcode().await?;
        self.last_received = Some(opcode);
        Ok(opcode)
    }

    /// Writes a bare opcode, flushing anything staged before it.
    pub async fn send_opcode(&mut self, opcode: Opcode) -> Result<(), TransportError> {
        self.transport.send_opcode(opcode).await?;
        self.last_sent = Some(opcode.code());
        Ok(())
    }

    /// Records an opcode written by a callback.
    pub fn record_sent(&mut self, opcode: u16) {
        self.last_sent = Some(opcode);
    }

    pub fn record_request(&mut self) {
        self.request_count += 1;
    }

    pub fn last_sent(&self) -> Option<u16> {
        self.last_sent
    }

    pub fn last_received(&self) -> Option<u16> {
        self.last_received
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns the connection age.
    pub fn age(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Drops staged output and writes `opcode` on its own. Used to end a
    /// connection after a failed callback, so a half-built reply never
    /// reaches the client.
    pub async fn abort_with(&mut self, opcode: Opcode) -> Result<(), TransportError> {
        self.transport.discard_pending();
        self.send_opcode(opcode).await
    }

    /// Closes the underlying stream. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.running = false;
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use pathscope_protocol::WireWrite;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::duplex;

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345)
    }

    #[tokio::test]
    async fn test_connection_tracks_opcodes() {
        let (client, server) = duplex(256);
        let mut conn = Connection::new(server, test_addr());
        let mut peer = Transport::new(client);
        assert!(conn.is_running());
        assert_eq!(conn.last_sent(), None);

        conn.send_opcode(Opcode::Hello).await.unwrap();
        assert_eq!(conn.last_sent(), Some(0x0001));
        assert_eq!(peer.read_opcode().await.unwrap(), 0x0001);

        peer.send(&0x0100u16);
        peer.flush().await.unwrap();
        assert_eq!(conn.read_opcode().await.unwrap(), 0x0100);
        assert_eq!(conn.last_received(), Some(0x0100));

        conn.record_request();
        conn.record_sent(0x0100);
        assert_eq!(conn.request_count(), 1);
        assert_eq!(conn.last_sent(), Some(0x0100));
    }

    #[tokio::test]
    async fn test_abort_discards_staged_reply() {
        let (client, server) = duplex(256);
        let mut conn = Connection::new(server, test_addr());
        let mut peer = Transport::new(client);

        conn.transport().out().put_opcode(Opcode::RenderPixel);
        conn.transport().out().put_u32_le(9);
        conn.abort_with(Opcode::Disconnect).await.unwrap();
        conn.close().await.unwrap();

        assert_eq!(peer.read_opcode().await.unwrap(), Opcode::Disconnect.code());
        assert!(matches!(
            peer.read_opcode().await,
            Err(TransportError::Closed)
        ));
        assert!(!conn.is_running());
    }

    #[test]
    fn test_connection_ids_unique() {
        let (a, _) = duplex(8);
        let (b, _) = duplex(8);
        let first = Connection::new(a, test_addr());
        let second = Connection::new(b, test_addr());
        assert_ne!(first.id, second.id);
        assert_eq!(first.remote_addr, test_addr());
    }
}
