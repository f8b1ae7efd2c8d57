//! Socket abstraction
//!
//! One byte-stream type and one listener type covering TCP and Unix-domain
//! sockets, so the channel and the server loop are transport-agnostic.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::PathBuf;

use crate::config::Address;
use crate::error::{LinkError, Result};

// =============================================================================
// Stream
// =============================================================================

/// A connected, bidirectional byte stream
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Connect to an address
    ///
    /// For TCP, every resolved address is tried in turn until one accepts.
    pub fn connect(address: &Address, timeout: Option<Duration>) -> Result<Self> {
        match address {
            Address::Tcp { host, port } => {
                let socket_addrs = (host.as_str(), *port).to_socket_addrs().map_err(|e| {
                    LinkError::Connection(format!("Invalid address '{}': {}", address, e))
                })?;

                let mut last_err = None;
                for socket_addr in socket_addrs {
                    let attempt = match timeout {
                        Some(t) => TcpStream::connect_timeout(&socket_addr, t),
                        None => TcpStream::connect(socket_addr),
                    };
                    match attempt {
                        Ok(stream) => {
                            // Disable Nagle's algorithm: frames are small and latency-bound
                            stream.set_nodelay(true).map_err(|e| {
                                LinkError::Connection(format!("Failed to set TCP_NODELAY: {}", e))
                            })?;
                            return Ok(Stream::Tcp(stream));
                        }
                        Err(e) => last_err = Some(e),
                    }
                }

                Err(LinkError::Connection(format!(
                    "Failed to connect to {}: {}",
                    address,
                    last_err
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no addresses resolved".to_string())
                )))
            }
            #[cfg(unix)]
            Address::Unix(path) => UnixStream::connect(path).map(Stream::Unix).map_err(|e| {
                LinkError::Connection(format!("Failed to connect to {}: {}", address, e))
            }),
            #[cfg(not(unix))]
            Address::Unix(_) => Err(LinkError::Config(format!(
                "Unix-domain sockets are not supported on this platform: {}",
                address
            ))),
        }
    }

    /// Another handle to the same socket
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Stream::Tcp(s) => s.try_clone().map(Stream::Tcp),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_clone().map(Stream::Unix),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_write_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_write_timeout(timeout),
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_nonblocking(nonblocking),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_nonblocking(nonblocking),
        }
    }

    /// Shut down both directions; every handle to the socket sees it
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }

    /// Human-readable peer address for logging
    pub fn peer_description(&self) -> String {
        match self {
            Stream::Tcp(s) => s
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            #[cfg(unix)]
            Stream::Unix(s) => match s.peer_addr() {
                Ok(addr) => match addr.as_pathname() {
                    Some(path) => format!("unix:{}", path.display()),
                    None => "unix:(unnamed)".to_string(),
                },
                Err(_) => "unknown".to_string(),
            },
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

// =============================================================================
// Listener
// =============================================================================

/// A bound listening socket
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    /// Owns its socket file and removes it on drop
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Bind to an address
    ///
    /// A stale Unix socket file at the path is replaced; any other kind of
    /// file there is left alone and binding fails.
    pub fn bind(address: &Address) -> Result<Self> {
        match address {
            Address::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Address::Unix(path) => {
                use std::os::unix::fs::FileTypeExt;

                if let Ok(meta) = std::fs::symlink_metadata(path) {
                    if !meta.file_type().is_socket() {
                        return Err(LinkError::Config(format!(
                            "Refusing to replace non-socket file at {}",
                            path.display()
                        )));
                    }
                    tracing::debug!("Removing stale socket file {}", path.display());
                    std::fs::remove_file(path)?;
                }

                let listener = UnixListener::bind(path)?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            Address::Unix(_) => Err(LinkError::Config(format!(
                "Unix-domain sockets are not supported on this platform: {}",
                address
            ))),
        }
    }

    /// Accept one connection
    pub fn accept(&self) -> io::Result<Stream> {
        match self {
            Listener::Tcp(l) => {
                let (stream, _) = l.accept()?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            Listener::Unix { listener, .. } => {
                let (stream, _) = listener.accept()?;
                Ok(Stream::Unix(stream))
            }
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Listener::Tcp(l) => l.set_nonblocking(nonblocking),
            #[cfg(unix)]
            Listener::Unix { listener, .. } => listener.set_nonblocking(nonblocking),
        }
    }

    /// The address actually bound (resolves port 0 to the assigned port)
    pub fn local_address(&self) -> Result<Address> {
        match self {
            Listener::Tcp(l) => {
                let addr = l.local_addr()?;
                Ok(Address::tcp(addr.ip().to_string(), addr.port()))
            }
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(Address::Unix(path.clone())),
        }
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            if let Err(e) = std::fs::remove_file(&*path) {
                tracing::debug!("Could not remove socket file {}: {}", path.display(), e);
            }
        }
    }
}
