//! Command definitions
//!
//! Represents commands sent by a channel.

use super::value::{Options, Value};

/// Command types (the kind byte of a command frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    KeyExists = 0x01,
    Load = 0x02,
    Store = 0x03,
    Delete = 0x04,
    Clear = 0x05,
}

impl CommandType {
    /// Parse a kind byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandType::KeyExists),
            0x02 => Some(CommandType::Load),
            0x03 => Some(CommandType::Store),
            0x04 => Some(CommandType::Delete),
            0x05 => Some(CommandType::Clear),
            _ => None,
        }
    }

    /// Operation name as it appears in logs
    pub fn name(self) -> &'static str {
        match self {
            CommandType::KeyExists => "key?",
            CommandType::Load => "load",
            CommandType::Store => "store",
            CommandType::Delete => "delete",
            CommandType::Clear => "clear",
        }
    }

    /// Whether the server answers this command with a reply frame.
    ///
    /// `store` is fire-and-forget.
    pub fn expects_reply(self) -> bool {
        !matches!(self, CommandType::Store)
    }
}

/// A command: operation plus ordered arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Check whether a key exists
    KeyExists { key: Vec<u8>, options: Options },

    /// Load the value stored under a key
    Load { key: Vec<u8>, options: Options },

    /// Store a value under a key (no reply)
    Store {
        key: Vec<u8>,
        value: Value,
        options: Options,
    },

    /// Delete a key
    Delete { key: Vec<u8>, options: Options },

    /// Remove every key
    Clear { options: Options },
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::KeyExists { .. } => CommandType::KeyExists,
            Command::Load { .. } => CommandType::Load,
            Command::Store { .. } => CommandType::Store,
            Command::Delete { .. } => CommandType::Delete,
            Command::Clear { .. } => CommandType::Clear,
        }
    }

    /// Options attached to the command
    pub fn options(&self) -> &Options {
        match self {
            Command::KeyExists { options, .. }
            | Command::Load { options, .. }
            | Command::Store { options, .. }
            | Command::Delete { options, .. }
            | Command::Clear { options } => options,
        }
    }
}
