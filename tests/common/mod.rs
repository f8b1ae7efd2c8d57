//! Shared helpers for tests that need a running server

#![allow(dead_code)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use kvlink::{Address, Config, MemoryStore, Server, ServerHandle, Store};

/// A server running on a background thread
pub struct TestServer {
    pub address: Address,
    pub handle: ServerHandle,
    thread: Option<JoinHandle<kvlink::Result<()>>>,
}

impl TestServer {
    /// Stop accepting and wait for the acceptor thread
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// Start a server with the given config and store
pub fn spawn_server_with(config: Config, store: Arc<dyn Store>) -> TestServer {
    let mut server = Server::bind(config, store).unwrap();
    let address = server.local_address().unwrap();
    let handle = server.handle();
    let thread = thread::spawn(move || server.run());

    TestServer {
        address,
        handle,
        thread: Some(thread),
    }
}

/// Start a server on an ephemeral localhost port
pub fn spawn_tcp_server(store: Arc<dyn Store>) -> TestServer {
    let config = Config::builder()
        .address(Address::tcp("127.0.0.1", 0))
        .build();
    spawn_server_with(config, store)
}

/// Start a server backed by a fresh in-memory store
pub fn spawn_memory_server() -> (TestServer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let server = spawn_tcp_server(store.clone());
    (server, store)
}
