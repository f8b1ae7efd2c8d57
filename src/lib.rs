//! # kvlink
//!
//! Remote access to a key-value store over a single persistent socket:
//! - Length-prefixed binary frames (bincode payloads)
//! - Strictly ordered request/reply discipline, no request IDs
//! - Fire-and-forget `store`
//! - TCP or Unix-domain sockets
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐                     ┌──────────────────┐
//! │     Channel      │   command frames    │      Server      │
//! │  (one caller,    │ ──────────────────▶ │  (one thread per │
//! │   blocking)      │ ◀────────────────── │   connection)    │
//! └────────┬─────────┘    reply frames     └────────┬─────────┘
//!          │                                        │
//!          ▼                                        ▼
//!   ┌─────────────┐                          ┌─────────────┐
//!   │    Codec    │    shared by both ends   │    Store    │
//!   │ (protocol)  │                          │   (trait)   │
//!   └─────────────┘                          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use kvlink::{Address, Channel, Options};
//!
//! let mut channel = Channel::connect(&Address::default())?;
//! let options = Options::new();
//!
//! channel.store("a", "1", &options)?;
//! assert!(channel.key_exists("a", &options)?);
//! channel.close()?;
//! # Ok::<(), kvlink::LinkError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod client;
pub mod network;
pub mod protocol;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::{AbortHandle, Channel};
pub use config::{Address, Config};
pub use error::{LinkError, Result};
pub use network::{Server, ServerHandle};
pub use protocol::{Options, Value};
pub use store::{MemoryStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvlink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
