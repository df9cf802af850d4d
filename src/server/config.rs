//! Server Configuration

use std::path::PathBuf;

use crate::storage::DEFAULT_MAX_SIZE;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for both listeners
    pub bind: String,

    /// Address advertised to cluster peers
    pub host: String,

    /// TCP port for the Redis line protocol
    pub port: u16,

    /// HTTP port for WebSocket and REST access
    pub http_port: u16,

    /// Maximum number of keys held before LRU eviction
    pub max_keys: usize,

    /// Write-ahead log path
    pub wal_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            http_port: 8080,
            max_keys: DEFAULT_MAX_SIZE,
            wal_path: PathBuf::from("crimson.wal"),
        }
    }
}

impl Config {
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_http_port(mut self, http_port: u16) -> Self {
        self.http_port = http_port;
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn with_wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = path.into();
        self
    }
}
