//! Centralized configuration for Remora.
//!
//! Defaults live in a constants struct; [`ServerConfig`] is the immutable
//! value handed to the listener at startup.

use crate::{RemotingError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Exporter defaults.
pub struct ExporterDefaults;

impl ExporterDefaults {
    pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    /// Historical RMI registry port.
    pub const PORT: u16 = 1099;
    pub const SERVICE_NAME: &'static str = "userService";
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MAX_CONNECTIONS: usize = 64;
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Listener configuration, fixed once the listener is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// Port to listen on (0 = auto-assign)
    pub port: u16,
    /// Upper bound for a single dispatched call.
    pub call_timeout: Duration,
    /// Live connections allowed at once; further peers wait in the backlog.
    pub max_connections: usize,
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ExporterDefaults::HOST,
            port: ExporterDefaults::PORT,
            call_timeout: ExporterDefaults::CALL_TIMEOUT,
            max_connections: ExporterDefaults::MAX_CONNECTIONS,
            max_frame_size: ExporterDefaults::MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Loopback config on an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Reject values the listener cannot run with.
    ///
    /// Fields are public, so a config built by hand may bypass the clamping
    /// setters.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 || self.max_connections > Semaphore::MAX_PERMITS {
            return Err(RemotingError::InvalidConfig {
                message: format!(
                    "max_connections must be between 1 and {}, got {}",
                    Semaphore::MAX_PERMITS,
                    self.max_connections
                ),
            });
        }
        if self.max_frame_size == 0 {
            return Err(RemotingError::InvalidConfig {
                message: "max_frame_size must not be zero".to_string(),
            });
        }
        Ok(())
    }
}
