//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Event loop settings.
    pub event_loop: EventLoopConfig,

    /// Listeners created at startup.
    pub listeners: Vec<ListenerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            event_loop: EventLoopConfig::default(),
            listeners: vec![ListenerConfig::default()],
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Event loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Name of the loop thread, as shown by debuggers and `top -H`.
    pub thread_name: String,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            thread_name: "listenloop-io".to_string(),
        }
    }
}

/// One listener to create at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    /// Identifier for logging.
    pub name: String,

    /// Transport and bind target.
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            transport: TransportConfig::Tcp {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
        }
    }
}

/// Bind target, by transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportConfig {
    /// TCP on an IP literal; port 0 picks an ephemeral port.
    Tcp { host: String, port: u16 },

    /// Unix domain socket at `path`.
    Pipe {
        path: PathBuf,

        /// Umask applied while binding, e.g. `0o077` for an owner-only socket.
        #[serde(default)]
        umask: Option<u32>,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
