//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol, shared by the
//! client channel and the server loop.
//!
//! ## Wire Format
//!
//! Every frame, in both directions:
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Command Payload by Kind
//! - KEY?:   bincode (key, options)
//! - LOAD:   bincode (key, options)
//! - STORE:  bincode (key, value, options)
//! - DELETE: bincode (key, options)
//! - CLEAR:  bincode (options,)
//!
//! ### Reply Payload by Status
//! - OK:     empty (acknowledgment) or bincode value
//! - ABSENT: empty
//! - ERROR:  UTF-8 message
//!
//! Values nested deeper than [`MAX_VALUE_DEPTH`] are refused in both
//! directions.

use std::io::{Read, Write};

use bincode::Options as BincodeOptions;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Command, CommandType, Options, Reply, Status, Value, MAX_VALUE_DEPTH};
use crate::error::{LinkError, Result};

/// Header size: 1 byte kind + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Payload serialization settings. Both ends must agree on these.
fn payload_options() -> impl BincodeOptions {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .with_limit(MAX_PAYLOAD_SIZE as u64)
        .reject_trailing_bytes()
}

fn serialize_payload<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    payload_options()
        .serialize(value)
        .map_err(|e| LinkError::Encoding(e.to_string()))
}

fn deserialize_payload<T: DeserializeOwned>(payload: &[u8], what: &str) -> Result<T> {
    payload_options()
        .deserialize(payload)
        .map_err(|e| LinkError::Decoding(format!("{}: malformed payload: {}", what, e)))
}

/// Refuse values the other end would reject as too deeply nested
fn check_depth<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<()> {
    for value in values {
        let depth = value.depth();
        if depth > MAX_VALUE_DEPTH {
            return Err(LinkError::Encoding(format!(
                "Value nested {} levels deep (max {})",
                depth, MAX_VALUE_DEPTH
            )));
        }
    }
    Ok(())
}

/// Prepend the frame header to a payload
fn frame(kind: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(LinkError::Encoding(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(kind);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    Ok(message)
}

/// Parse a payload length out of a header, enforcing the size limit
fn payload_len(header: &[u8], what: &str) -> Result<usize> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(LinkError::Decoding(format!(
            "{} payload too large: {} bytes (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

/// Validate a complete frame and split it into kind byte and payload
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(LinkError::Decoding(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let len = payload_len(bytes, what)?;
    let total_len = HEADER_SIZE + len;

    if bytes.len() < total_len {
        return Err(LinkError::Decoding(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }
    if bytes.len() > total_len {
        return Err(LinkError::Decoding(format!(
            "{} frame has {} trailing bytes",
            what,
            bytes.len() - total_len
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..]))
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: kind (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    if let Command::Store { value, .. } = command {
        check_depth([value])?;
    }
    check_depth(command.options().values())?;

    let payload = match command {
        Command::KeyExists { key, options }
        | Command::Load { key, options }
        | Command::Delete { key, options } => serialize_payload(&(key, options))?,
        Command::Store {
            key,
            value,
            options,
        } => serialize_payload(&(key, value, options))?,
        Command::Clear { options } => serialize_payload(&(options,))?,
    };

    frame(command.command_type() as u8, &payload)
}

/// Decode a command from exactly one complete frame
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (kind, payload) = split_frame(bytes, "command")?;

    let cmd_type = CommandType::from_u8(kind).ok_or_else(|| {
        LinkError::Decoding(format!("Unknown command type: 0x{:02x}", kind))
    })?;
    let what = cmd_type.name();

    let command = match cmd_type {
        CommandType::KeyExists => {
            let (key, options): (Vec<u8>, Options) = deserialize_payload(payload, what)?;
            Command::KeyExists { key, options }
        }
        CommandType::Load => {
            let (key, options): (Vec<u8>, Options) = deserialize_payload(payload, what)?;
            Command::Load { key, options }
        }
        CommandType::Store => {
            let (key, value, options): (Vec<u8>, Value, Options) =
                deserialize_payload(payload, what)?;
            Command::Store {
                key,
                value,
                options,
            }
        }
        CommandType::Delete => {
            let (key, options): (Vec<u8>, Options) = deserialize_payload(payload, what)?;
            Command::Delete { key, options }
        }
        CommandType::Clear => {
            let (options,): (Options,) = deserialize_payload(payload, what)?;
            Command::Clear { options }
        }
    };

    Ok(command)
}

// =============================================================================
// Reply Encoding/Decoding
// =============================================================================

/// Encode a reply to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>> {
    let payload = match reply {
        Reply::Value(value) => {
            check_depth([value])?;
            serialize_payload(value)?
        }
        Reply::Absent | Reply::Ack => Vec::new(),
        Reply::Error(message) => message.as_bytes().to_vec(),
    };

    frame(reply.status() as u8, &payload)
}

/// Decode a reply from exactly one complete frame
pub fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    let (status_byte, payload) = split_frame(bytes, "reply")?;

    let status = Status::from_u8(status_byte).ok_or_else(|| {
        LinkError::Decoding(format!("Unknown reply status: 0x{:02x}", status_byte))
    })?;

    match status {
        Status::Ok if payload.is_empty() => Ok(Reply::Ack),
        Status::Ok => Ok(Reply::Value(deserialize_payload(payload, "reply")?)),
        Status::Absent if payload.is_empty() => Ok(Reply::Absent),
        Status::Absent => Err(LinkError::Decoding(format!(
            "ABSENT reply: unexpected payload of {} bytes",
            payload.len()
        ))),
        Status::Error => String::from_utf8(payload.to_vec())
            .map(Reply::Error)
            .map_err(|e| LinkError::Decoding(format!("ERROR reply: invalid UTF-8: {}", e))),
    }
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read the bytes of one complete frame
///
/// Blocks until the whole frame has arrived. End of stream surfaces as an
/// `Io` error of kind `UnexpectedEof`.
fn read_frame<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    // Read header first
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let len = payload_len(&header, what)?;

    let mut message = vec![0u8; HEADER_SIZE + len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }

    Ok(message)
}

/// Read a complete command from a stream
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let bytes = read_frame(reader, "command")?;
    decode_command(&bytes)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete reply from a stream
pub fn read_reply<R: Read>(reader: &mut R) -> Result<Reply> {
    let bytes = read_frame(reader, "reply")?;
    decode_reply(&bytes)
}

/// Write a reply to a stream
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    let bytes = encode_reply(reply)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
