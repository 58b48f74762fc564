//! Runtime configuration for the relay server

use shared::{DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_PORT, MAX_DATAGRAM_SIZE};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("broadcast interval must be greater than zero")]
    ZeroBroadcastInterval,
    #[error("receive timeout must be greater than zero")]
    ZeroRecvTimeout,
    #[error("datagram buffer must hold at least one byte")]
    ZeroDatagramSize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind the datagram socket to
    pub host: String,
    /// Port to listen on; 0 lets the OS pick one
    pub port: u16,
    /// Period of the snapshot broadcast
    pub broadcast_interval: Duration,
    /// Upper bound on a single receive wait, so the loop notices shutdown
    pub recv_timeout: Duration,
    /// Size of the inbound buffer; longer datagrams are truncated
    pub max_datagram_size: usize,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rejects values the server loops cannot run with
    ///
    /// A zero interval panics the ticker and a zero receive timeout spins the
    /// receive loop without ever waiting on the socket.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_interval.is_zero() {
            return Err(ConfigError::ZeroBroadcastInterval);
        }
        if self.recv_timeout.is_zero() {
            return Err(ConfigError::ZeroRecvTimeout);
        }
        if self.max_datagram_size == 0 {
            return Err(ConfigError::ZeroDatagramSize);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            broadcast_interval: Duration::from_millis(DEFAULT_BROADCAST_INTERVAL_MS),
            recv_timeout: Duration::from_secs(1),
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}
