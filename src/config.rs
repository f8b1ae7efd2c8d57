//! Configuration for kvlink
//!
//! Transport selection ([`Address`]) and timeouts/limits ([`Config`]),
//! shared by the client channel and the server.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{LinkError, Result};

/// Host used when an address names a port only
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when an address names a host only
pub const DEFAULT_PORT: u16 = 9000;

// =============================================================================
// Address
// =============================================================================

/// Where a channel connects to, or where a server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// TCP socket
    Tcp { host: String, port: u16 },

    /// Unix-domain socket at a filesystem path
    Unix(PathBuf),
}

impl Address {
    /// TCP address
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Address::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix-domain socket address
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Address::Unix(path.into())
    }

    /// Build an address from optional parts, filling in defaults.
    ///
    /// A socket file takes precedence over host/port.
    pub fn from_parts(file: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Self {
        match file {
            Some(path) => Address::Unix(path),
            None => Address::Tcp {
                host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: port.unwrap_or(DEFAULT_PORT),
            },
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::tcp(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Address::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Parses `unix:<path>`, any string containing `/` (a path), `host:port`,
/// `[v6]:port`, `host` or `:port`.
impl FromStr for Address {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LinkError::Config("empty address".to_string()));
        }

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(LinkError::Config("unix address without a path".to_string()));
            }
            return Ok(Address::unix(path));
        }
        if s.contains('/') {
            return Ok(Address::unix(s));
        }

        // Bracketed IPv6 literal, optionally followed by a port
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| LinkError::Config(format!("unterminated '[' in address '{}'", s)))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(|| {
                        LinkError::Config(format!("expected ':' after ']' in address '{}'", s))
                    })?;
                    parse_port(port, s)?
                }
            };
            return Ok(Address::tcp(host, port));
        }

        match s.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => Err(LinkError::Config(format!(
                "IPv6 address '{}' must be written as [host]:port",
                s
            ))),
            Some((host, port)) => {
                let host = if host.is_empty() { DEFAULT_HOST } else { host };
                Ok(Address::tcp(host, parse_port(port, s)?))
            }
            None => Ok(Address::tcp(s, DEFAULT_PORT)),
        }
    }
}

fn parse_port(port: &str, whole: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| LinkError::Config(format!("invalid port '{}' in address '{}'", port, whole)))
}

// =============================================================================
// Config
// =============================================================================

/// Main configuration for a channel or a server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------
    /// Address to connect to (client) or listen on (server)
    pub address: Address,

    // -------------------------------------------------------------------------
    // Client Timeouts
    // -------------------------------------------------------------------------
    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// How long a call waits for its reply (milliseconds, 0 = no limit)
    pub read_timeout_ms: u64,

    /// How long a write may block on a full send buffer (milliseconds, 0 = no limit)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Server Configuration
    // -------------------------------------------------------------------------
    /// Max concurrent client connections
    pub max_connections: usize,

    /// Close a connection after this long without a command (milliseconds, 0 = never)
    pub idle_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: Address::default(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            max_connections: 1024,
            idle_timeout_ms: 0,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the address
    pub fn address(mut self, address: Address) -> Self {
        self.config.address = address;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the reply timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the server-side idle timeout (in milliseconds)
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
