//! Connection Handler
//!
//! Serves the command sequence of one client connection.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use super::Stream;
use crate::error::{LinkError, Result};
use crate::protocol::{read_command, write_reply, Command, Reply};
use crate::store::Store;

/// Handles a single client connection
pub struct Connection {
    /// Stream reader (buffered for efficiency)
    reader: BufReader<Stream>,

    /// Stream writer (buffered for efficiency)
    writer: BufWriter<Stream>,

    /// Reference to the storage engine
    store: Arc<dyn Store>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: Stream, store: Arc<dyn Store>) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream.peer_description();

        // Accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            store,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 leaves the socket blocking forever)
    pub fn set_timeouts(&mut self, idle_ms: u64, write_ms: u64) -> Result<()> {
        if idle_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(idle_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and answers every command that expects a
    /// reply before reading the next one. Returns when the client
    /// disconnects or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            // Read next command
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(LinkError::Io(ref e)) => match e.kind() {
                    ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted => {
                        tracing::debug!("Client {} disconnected", self.peer_addr);
                        return Ok(());
                    }
                    // Idle timeout (Windows reports TimedOut instead of WouldBlock)
                    ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                        tracing::debug!("Idle timeout for client {}", self.peer_addr);
                        return Ok(());
                    }
                    _ => {
                        tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                        return Err(LinkError::Connection(e.to_string()));
                    }
                },
                Err(e) => {
                    // The stream can't be resynchronized after a bad frame
                    tracing::warn!("Malformed frame from {}: {}", self.peer_addr, e);
                    let _ = self.send_reply(Reply::error(e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!(
                "Received {} from {}: {:?}",
                command.command_type().name(),
                self.peer_addr,
                command
            );

            let reply = match execute_command(self.store.as_ref(), command) {
                Some(reply) => reply,
                None => continue,
            };

            if let Err(e) = self.send_reply(reply) {
                // If the client disconnected before we could send the reply
                // (e.g. connection abort/reset/broken pipe), log and exit gracefully
                // rather than treating it as a server error.
                if let LinkError::Io(ref io_err) = e {
                    match io_err.kind() {
                        ErrorKind::ConnectionAborted
                        | ErrorKind::ConnectionReset
                        | ErrorKind::BrokenPipe => {
                            tracing::debug!(
                                "Client {} disconnected before reply could be sent: {}",
                                self.peer_addr,
                                e
                            );
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Send a reply to the client
    fn send_reply(&mut self, reply: Reply) -> Result<()> {
        write_reply(&mut self.writer, &reply)
    }
}

/// Run one command against the store
///
/// Returns the reply to send, or `None` for fire-and-forget commands. Store
/// failures become `Error` replies; a failed `store` is only logged since
/// nobody is waiting for its outcome.
pub fn execute_command(store: &dyn Store, command: Command) -> Option<Reply> {
    let reply = match command {
        Command::KeyExists { key, options } => store
            .key_exists(&key, &options)
            .map(|found| Reply::Value(found.into())),
        Command::Load { key, options } => store.load(&key, &options).map(Reply::from_option),
        Command::Store {
            key,
            value,
            options,
        } => {
            if let Err(e) = store.store(&key, value, &options) {
                tracing::warn!(
                    "store of key {:?} failed: {}",
                    String::from_utf8_lossy(&key),
                    e
                );
            }
            return None;
        }
        Command::Delete { key, options } => store
            .delete(&key, &options)
            .map(|found| Reply::Value(found.into())),
        Command::Clear { options } => store.clear(&options).map(|()| Reply::Ack),
    };

    Some(reply.unwrap_or_else(|e| Reply::error(e.to_string())))
}
