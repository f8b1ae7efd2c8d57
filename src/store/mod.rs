//! Store Module
//!
//! The storage engine behind the server, reached only through the same
//! command set the protocol carries.
//!
//! ## Responsibilities
//! - Answer `key?`, `load`, `store`, `delete` and `clear`
//! - Receive each command's options untouched (engines may interpret them)
//! - Be shareable across connection threads (`Send + Sync`, `&self` methods)

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::protocol::{Options, Value};

/// A key-value storage engine served over a channel
pub trait Store: Send + Sync {
    /// Whether a value is stored under `key`
    fn key_exists(&self, key: &[u8], options: &Options) -> Result<bool>;

    /// The value stored under `key`, or `None` if there is none
    fn load(&self, key: &[u8], options: &Options) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value
    fn store(&self, key: &[u8], value: Value, options: &Options) -> Result<()>;

    /// Remove `key`; returns whether it was present
    fn delete(&self, key: &[u8], options: &Options) -> Result<bool>;

    /// Remove every key
    fn clear(&self, options: &Options) -> Result<()>;
}
