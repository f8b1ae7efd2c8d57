//! Client Channel
//!
//! A [`Channel`] owns one connected socket and turns it into a synchronous
//! RPC channel: every call writes one command frame and, unless the command
//! is fire-and-forget, blocks until exactly one reply frame has arrived.
//!
//! ## States
//! - **open**: usable
//! - **broken**: an I/O or decoding failure happened mid-call; the frame
//!   sequence can no longer be trusted, so every call fails fast until the
//!   channel is closed
//! - **closed**: the socket is released; every call fails with
//!   [`LinkError::ClosedChannel`]
//!
//! Calls take `&mut self`: one channel serves one caller at a time. Open one
//! channel per thread for parallelism.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::time::Duration;

use crate::config::{Address, Config};
use crate::error::{LinkError, Result};
use crate::network::Stream;
use crate::protocol::{read_reply, write_command, Command, Options, Reply, Value};

/// Reader/writer halves of an open socket
struct Io {
    reader: BufReader<Stream>,
    writer: BufWriter<Stream>,
}

/// Synchronous command channel to a remote store
pub struct Channel {
    /// `None` once closed
    io: Option<Io>,

    /// Set when a call failed in a way that may have desynchronized the stream
    broken: bool,

    /// Remote address for logging
    address: Address,
}

/// Aborts a channel's socket from another thread
///
/// A call blocked waiting for its reply fails with
/// [`LinkError::Connection`] once [`abort`](Self::abort) runs.
pub struct AbortHandle {
    stream: Stream,
}

impl AbortHandle {
    /// Shut the socket down in both directions
    pub fn abort(&self) -> Result<()> {
        match self.stream.shutdown() {
            Ok(()) => Ok(()),
            // Already shut down by the peer or by an earlier abort
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Channel {
    /// Connect to `address` with default timeouts
    pub fn connect(address: &Address) -> Result<Self> {
        let config = Config::builder().address(address.clone()).build();
        Self::open(&config)
    }

    /// Connect to `config.address`, applying the configured timeouts
    pub fn open(config: &Config) -> Result<Self> {
        let connect_timeout = millis(config.connect_timeout_ms);
        let stream = Stream::connect(&config.address, connect_timeout)?;

        let setup = |stream: &Stream| -> std::io::Result<Stream> {
            stream.set_read_timeout(millis(config.read_timeout_ms))?;
            stream.set_write_timeout(millis(config.write_timeout_ms))?;
            stream.try_clone()
        };
        let read_stream = setup(&stream).map_err(|e| {
            LinkError::Connection(format!("Failed to configure socket: {}", e))
        })?;

        tracing::debug!("Channel connected to {}", config.address);

        Ok(Self {
            io: Some(Io {
                reader: BufReader::new(read_stream),
                writer: BufWriter::new(stream),
            }),
            broken: false,
            address: config.address.clone(),
        })
    }

    /// The address this channel is connected to
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    /// Handle that can abort this channel's socket from another thread
    pub fn abort_handle(&self) -> Result<AbortHandle> {
        let io = self.io.as_ref().ok_or(LinkError::ClosedChannel)?;
        let stream = io.writer.get_ref().try_clone()?;
        Ok(AbortHandle { stream })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Check whether `key` exists on the remote store
    pub fn key_exists(&mut self, key: impl AsRef<[u8]>, options: &Options) -> Result<bool> {
        let reply = self.call(Command::KeyExists {
            key: key.as_ref().to_vec(),
            options: options.clone(),
        })?;
        self.expect_bool(reply, "key?")
    }

    /// Load the value under `key`; `None` if the remote store has none
    pub fn load(&mut self, key: impl AsRef<[u8]>, options: &Options) -> Result<Option<Value>> {
        let reply = self.call(Command::Load {
            key: key.as_ref().to_vec(),
            options: options.clone(),
        })?;
        match reply {
            Reply::Value(value) => Ok(Some(value)),
            Reply::Absent => Ok(None),
            other => Err(self.unexpected(other, "load")),
        }
    }

    /// Store `value` under `key` without waiting for the server.
    ///
    /// Returns `value` as given. Success only means the command was written
    /// to the socket ahead of any later command on this channel; it says
    /// nothing about whether the remote store accepted it.
    pub fn store(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl Into<Value>,
        options: &Options,
    ) -> Result<Value> {
        let value = value.into();
        self.send(&Command::Store {
            key: key.as_ref().to_vec(),
            value: value.clone(),
            options: options.clone(),
        })?;
        Ok(value)
    }

    /// Delete `key`; returns whether it was present
    pub fn delete(&mut self, key: impl AsRef<[u8]>, options: &Options) -> Result<bool> {
        let reply = self.call(Command::Delete {
            key: key.as_ref().to_vec(),
            options: options.clone(),
        })?;
        self.expect_bool(reply, "delete")
    }

    /// Remove every key; returns the channel for chaining
    pub fn clear(&mut self, options: &Options) -> Result<&mut Self> {
        let reply = self.call(Command::Clear {
            options: options.clone(),
        })?;
        if let Reply::Error(message) = reply {
            return Err(LinkError::Remote(message));
        }
        Ok(self)
    }

    /// Release the socket
    ///
    /// Closing twice fails with [`LinkError::ClosedChannel`].
    pub fn close(&mut self) -> Result<()> {
        let io = self.io.take().ok_or(LinkError::ClosedChannel)?;
        let Io { reader, mut writer } = io;

        // Everything written is already flushed; ignore a peer that hung up first
        let _ = std::io::Write::flush(&mut writer);
        if let Err(e) = writer.get_ref().shutdown() {
            tracing::trace!("Shutdown of channel to {} failed: {}", self.address, e);
        }
        drop(reader);

        tracing::debug!("Channel to {} closed", self.address);
        Ok(())
    }

    // =========================================================================
    // Call discipline
    // =========================================================================

    /// Write one command without reading a reply
    fn send(&mut self, command: &Command) -> Result<()> {
        tracing::trace!("Sending {} to {}", command.command_type().name(), self.address);

        let io = self.usable()?;
        let result = write_command(&mut io.writer, command);
        self.check(result)
    }

    /// Write one command and read its reply
    fn call(&mut self, command: Command) -> Result<Reply> {
        self.send(&command)?;

        let io = self.usable()?;
        let result = read_reply(&mut io.reader);
        let reply = self.check(result)?;

        tracing::trace!(
            "Reply to {} from {}: {:?}",
            command.command_type().name(),
            self.address,
            reply
        );
        Ok(reply)
    }

    /// The open socket halves, unless the channel is closed or broken
    fn usable(&mut self) -> Result<&mut Io> {
        if self.broken && self.io.is_some() {
            return Err(LinkError::Connection(format!(
                "channel to {} is broken by an earlier failure; close it and reconnect",
                self.address
            )));
        }
        self.io.as_mut().ok_or(LinkError::ClosedChannel)
    }

    /// Map a codec result to the channel's error taxonomy
    ///
    /// Encoding failures happen before any byte is written and leave the
    /// channel usable. I/O and decoding failures break it.
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(LinkError::Encoding(message)) => Err(LinkError::Encoding(message)),
            Err(LinkError::Io(e)) => {
                self.broken = true;
                let message = match e.kind() {
                    ErrorKind::WouldBlock | ErrorKind::TimedOut => "operation timed out".to_string(),
                    ErrorKind::UnexpectedEof => "connection closed by peer".to_string(),
                    _ => e.to_string(),
                };
                tracing::debug!("Channel to {} broke: {}", self.address, message);
                Err(LinkError::Connection(message))
            }
            Err(e) => {
                self.broken = true;
                tracing::debug!("Channel to {} broke: {}", self.address, e);
                Err(e)
            }
        }
    }

    fn expect_bool(&mut self, reply: Reply, op: &str) -> Result<bool> {
        match reply {
            Reply::Value(Value::Bool(b)) => Ok(b),
            other => Err(self.unexpected(other, op)),
        }
    }

    /// Error for a reply whose shape does not match the command
    ///
    /// An `Error` reply is a well-formed frame, so the channel stays usable.
    fn unexpected(&mut self, reply: Reply, op: &str) -> LinkError {
        match reply {
            Reply::Error(message) => LinkError::Remote(message),
            other => {
                self.broken = true;
                let got = match &other {
                    Reply::Value(v) => v.kind(),
                    Reply::Absent => "absent",
                    Reply::Ack => "acknowledgment",
                    Reply::Error(_) => "error",
                };
                LinkError::Decoding(format!("unexpected {} reply to {}", got, op))
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.io.is_some() {
            let _ = self.close();
        }
    }
}

/// Milliseconds to an optional timeout (0 = none)
fn millis(ms: u64) -> Option<Duration> {
    if ms > 0 {
        Some(Duration::from_millis(ms))
    } else {
        None
    }
}
