//! Connector configuration.
//!
//! Every field has a default, so an empty TOML document (or
//! `ConnectorConfig::default()`) yields a working permissive gateway:
//! plain-text codec, 90s heartbeat, 10s handshake window, timeouts enforced.

use std::time::Duration;

use muxgate_core::CompressionConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Behavior switches for the connector, fixed at start.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Bind to the configured host only instead of all interfaces.
    #[serde(default)]
    pub distinct_host: bool,

    /// Heartbeat window in seconds. Also bounds how long an accepted socket
    /// may stay silent before classification.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Set TCP_NODELAY on raw-TCP sockets.
    #[serde(default = "default_true")]
    pub set_no_delay: bool,

    /// When false, expired heartbeat and handshake deadlines only log.
    #[serde(default = "default_true")]
    pub disconnect_on_timeout: bool,

    /// Seconds a connection may stay in its initial state before the
    /// handshake deadline fires.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Handshake attempts allowed per connection; one more forces a close.
    #[serde(default = "default_handshake_max_times")]
    pub handshake_max_times: u32,

    /// Serialized bodies strictly larger than this many bytes are gzipped.
    #[serde(default = "default_gzip_compress_size")]
    pub gzip_compress_size: usize,

    #[serde(default)]
    pub use_gzip_compress: bool,

    #[serde(default)]
    pub use_route_compress: bool,

    #[serde(default)]
    pub use_schema_compress: bool,

    /// Fixed logical route for plain publishes when the client does not
    /// carry routes in its payloads.
    #[serde(default)]
    pub publish_route: Option<String>,

    /// Fixed logical route for subscribe packets.
    #[serde(default)]
    pub subscribe_route: Option<String>,

    /// Clients embed `{id, route, body}` in publish payloads themselves.
    #[serde(default)]
    pub self_defined_route: bool,

    /// Disconnect clients that publish before completing the handshake.
    /// Off by default: early publishes are forwarded.
    #[serde(default)]
    pub strict_ready: bool,
}

fn default_timeout() -> u64 {
    90
}

fn default_true() -> bool {
    true
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_handshake_max_times() -> u32 {
    10
}

fn default_gzip_compress_size() -> usize {
    300
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            distinct_host: false,
            timeout: default_timeout(),
            set_no_delay: default_true(),
            disconnect_on_timeout: default_true(),
            handshake_timeout: default_handshake_timeout(),
            handshake_max_times: default_handshake_max_times(),
            gzip_compress_size: default_gzip_compress_size(),
            use_gzip_compress: false,
            use_route_compress: false,
            use_schema_compress: false,
            publish_route: None,
            subscribe_route: None,
            self_defined_route: false,
            strict_ready: false,
        }
    }
}

impl ConnectorConfig {
    /// Parses a TOML document, filling absent fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown fields.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn handshake_window(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    /// Whether any compression layer is on, which selects the envelope
    /// strategy over the plain-text one.
    pub fn compression_enabled(&self) -> bool {
        self.use_gzip_compress || self.use_route_compress || self.use_schema_compress
    }

    pub fn compression(&self) -> CompressionConfig {
        CompressionConfig {
            use_gzip: self.use_gzip_compress,
            use_route: self.use_route_compress,
            use_schema: self.use_schema_compress,
            gzip_threshold: self.gzip_compress_size,
        }
    }
}
