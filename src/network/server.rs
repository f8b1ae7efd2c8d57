//! Server
//!
//! Accepts connections and serves each one on its own thread.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{Connection, Listener, Stream};
use crate::config::{Address, Config};
use crate::error::Result;
use crate::store::Store;

/// How often the acceptor checks for shutdown while no client is connecting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Server exposing a [`Store`] over TCP or a Unix-domain socket
pub struct Server {
    config: Config,
    store: Arc<dyn Store>,
    listener: Listener,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

/// Requests shutdown of a running server from another thread
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Signal the server to stop accepting connections.
    ///
    /// Connections already being served run until their client disconnects.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Decrements the active connection count when a connection thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Bind the listening socket described by `config.address`
    pub fn bind(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let listener = Listener::bind(&config.address)?;
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", listener.local_address()?);

        Ok(Self {
            config,
            store,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The address the server is listening on
    pub fn local_address(&self) -> Result<Address> {
        self.listener.local_address()
    }

    /// Handle used to stop [`run`](Self::run) from another thread
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Start the server (blocking until shutdown is requested)
    pub fn run(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok(stream) => self.dispatch(stream),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    // Per-connection failures (e.g. ECONNABORTED) must not stop the acceptor
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Server shutting down");
        Ok(())
    }

    /// Hand an accepted stream to a connection thread, or refuse it
    fn dispatch(&self, stream: Stream) {
        let peer = stream.peer_description();

        let active = self.active_connections.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active_connections));
        if active >= self.config.max_connections {
            tracing::warn!(
                "Refusing connection from {}: {} connections active (max {})",
                peer,
                active,
                self.config.max_connections
            );
            let _ = stream.shutdown();
            return;
        }

        let store = Arc::clone(&self.store);
        let idle_ms = self.config.idle_timeout_ms;
        let write_ms = self.config.write_timeout_ms;

        let spawned = thread::Builder::new()
            .name(format!("kvlink-conn-{}", peer))
            .spawn(move || {
                let _guard = guard;
                let result = Connection::new(stream, store).and_then(|mut conn| {
                    conn.set_timeouts(idle_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::debug!("Connection from {} ended with error: {}", peer, e);
                }
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn connection thread: {}", e);
        }
    }
}
