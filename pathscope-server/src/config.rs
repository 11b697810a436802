//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PATHSCOPE_CONFIG or --config)
//! 3. Environment variables

use crate::server::ServerConfig;
use pathscope_core::RenderSystem;
use pathscope_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Session configuration.
    pub session: SessionConfig,
    /// Bundled demo renderer configuration.
    pub demo: DemoConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PATHSCOPE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Like [`Config::load`], with the file path given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.session.apply_env_overrides();
        self.demo.apply_env_overrides();
        self.logging.apply_env_overrides();
    }

    /// Checks values that parse but cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.demo.width == 0 || self.demo.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "demo image size must be non-zero, got {}x{}",
                self.demo.width, self.demo.height
            )));
        }
        if self.demo.sample_count <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "demo.sample_count must be positive, got {}",
                self.demo.sample_count
            )));
        }
        if self.demo.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "demo.max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Builds the listener configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.network.bind_addr).with_nodelay(self.network.nodelay)
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Disable Nagle's algorithm on the client socket.
    pub nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            nodelay: true,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("PATHSCOPE_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(port) = std::env::var("PATHSCOPE_PORT") {
            if let Ok(port) = port.parse() {
                self.bind_addr.set_port(port);
            }
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Render system reported to clients during the handshake.
    pub render_system: RenderSystem,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            render_system: RenderSystem::default(),
        }
    }
}

impl SessionConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(system) = std::env::var("PATHSCOPE_RENDER_SYSTEM") {
            if let Ok(parsed) = system.parse() {
                self.render_system = parsed;
            }
        }
    }
}

/// Demo renderer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub scene_name: String,
    pub width: u32,
    pub height: u32,
    /// Samples per pixel for full-image renders.
    pub sample_count: i32,
    /// Maximum number of bounces per path.
    pub max_depth: u32,
    /// Where full-image renders are written (binary PPM).
    pub output_path: PathBuf,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scene_name: "spheres".to_string(),
            width: 160,
            height: 120,
            sample_count: 16,
            max_depth: 5,
            output_path: PathBuf::from("./pathscope.ppm"),
        }
    }
}

impl DemoConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(samples) = std::env::var("PATHSCOPE_DEMO_SAMPLES") {
            if let Ok(n) = samples.parse() {
                self.sample_count = n;
            }
        }

        if let Ok(path) = std::env::var("PATHSCOPE_DEMO_OUTPUT") {
            self.output_path = PathBuf::from(path);
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("PATHSCOPE_LOG") {
            if !level.is_empty() {
                self.level = level;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
