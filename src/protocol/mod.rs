//! Protocol Module
//!
//! Defines the wire protocol between a channel and the server.
//!
//! ## Protocol Format (V1 - Length-Prefixed Binary)
//!
//! ### Command Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │  bincode argument tuple     │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: KEY?   - Payload: (key, options)
//! - 0x02: LOAD   - Payload: (key, options)
//! - 0x03: STORE  - Payload: (key, value, options), never answered
//! - 0x04: DELETE - Payload: (key, options)
//! - 0x05: CLEAR  - Payload: (options,)
//!
//! ### Reply Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK (empty payload acknowledges, otherwise a bincode value)
//! - 0x01: ABSENT
//! - 0x02: ERROR
//!
//! There are no request IDs: replies come back in the order the commands
//! were written.

mod codec;
mod command;
mod reply;
mod value;

pub use codec::{
    decode_command, decode_reply, encode_command, encode_reply, read_command, read_reply,
    write_command, write_reply, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{Command, CommandType};
pub use reply::{Reply, Status};
pub use value::{Options, Value, MAX_VALUE_DEPTH};
