//! Plain, programmatically constructed server configuration. Loading this
//! from a YAML file is left to callers: build a `ServerConfig` directly or
//! wire up your own loader.

use std::time::Duration;

/// Configuration for a single STREST server instance, covering all three
/// transports. Mirrors the builder-with-`Default` shape of
/// `turbomcp-server::config::ServerConfig`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub json_bind_addr: String,
    pub binary_bind_addr: String,
    pub http_bind_addr: String,
    pub max_message_size: usize,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            json_bind_addr: "0.0.0.0:8009".to_string(),
            binary_bind_addr: "0.0.0.0:8010".to_string(),
            http_bind_addr: "0.0.0.0:8011".to_string(),
            max_message_size: 16 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn json_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.json_bind_addr = addr.into();
        self
    }

    pub fn binary_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.binary_bind_addr = addr.into();
        self
    }

    pub fn http_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_bind_addr = addr.into();
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }
}
