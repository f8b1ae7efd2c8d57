//! Network Module
//!
//! Sockets and the server side of the protocol.
//!
//! ## Architecture
//! - Single acceptor loop polling a non-blocking listener
//! - One thread per connection, each reading commands strictly in order
//! - Commands dispatched to a shared [`Store`](crate::store::Store)

mod connection;
mod server;
mod stream;

pub use connection::{execute_command, Connection};
pub use server::{Server, ServerHandle};
pub use stream::{Listener, Stream};
