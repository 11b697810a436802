//! Connection settings and dialing.

use crate::error::ClientError;
use pathscope_protocol::DEFAULT_PORT;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT))
    }
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            nodelay: true,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Opens the TCP connection.
    pub(crate) async fn dial(&self) -> Result<TcpStream, ClientError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout(self.addr))??;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.addr.port(), 50013);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.nodelay);
    }

    #[test]
    fn test_config_builders() {
        let config = ConnectionConfig::new("10.0.0.1:6000".parse().unwrap())
            .with_connect_timeout(Duration::from_millis(250))
            .with_nodelay(false);
        assert_eq!(config.addr.port(), 6000);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(!config.nodelay);
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ConnectionConfig::new(addr).dial().await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
