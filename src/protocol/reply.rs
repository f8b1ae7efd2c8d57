//! Reply definitions
//!
//! Represents the server's answer to one command.

use super::value::Value;

/// Reply status codes (the kind byte of a reply frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Absent = 0x01,
    Error = 0x02,
}

impl Status {
    /// Parse a kind byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::Absent),
            0x02 => Some(Status::Error),
            _ => None,
        }
    }
}

/// A decoded reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A result value (boolean for `key?` and `delete`, any value for `load`)
    Value(Value),

    /// `load` found nothing under the key
    Absent,

    /// Acknowledgment without a value (`clear`)
    Ack,

    /// The store failed the command
    Error(String),
}

impl Reply {
    /// Create an ERROR reply
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    /// Reply carrying an optional loaded value
    pub fn from_option(value: Option<Value>) -> Self {
        match value {
            Some(v) => Reply::Value(v),
            None => Reply::Absent,
        }
    }

    /// Get the status code this reply is sent with
    pub fn status(&self) -> Status {
        match self {
            Reply::Value(_) | Reply::Ack => Status::Ok,
            Reply::Absent => Status::Absent,
            Reply::Error(_) => Status::Error,
        }
    }
}
