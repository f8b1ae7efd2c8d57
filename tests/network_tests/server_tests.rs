//! Server Tests
//!
//! Tests of the dispatch loop at the frame level, using raw sockets.

#[path = "../common/mod.rs"]
mod common;

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kvlink::network::execute_command;
use kvlink::protocol::{
    read_reply, write_command, Command, CommandType, Reply, Value, MAX_VALUE_DEPTH,
};
use kvlink::{Address, Channel, Config, LinkError, MemoryStore, Options, Store};

use common::{spawn_memory_server, spawn_server_with};

// =============================================================================
// Helper Functions
// =============================================================================

fn raw_connect(address: &Address) -> TcpStream {
    let stream = match address {
        Address::Tcp { host, port } => TcpStream::connect((host.as_str(), *port)).unwrap(),
        Address::Unix(_) => panic!("raw_connect expects a TCP address"),
    };
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

fn key(k: &str) -> Vec<u8> {
    k.as_bytes().to_vec()
}

/// A STORE frame for key "k" holding a list nested `depth` levels
fn nested_store_frame(depth: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(depth * 12 + 24);
    payload.extend_from_slice(&1u64.to_be_bytes());
    payload.push(b'k');
    for _ in 1..depth {
        payload.extend_from_slice(&6u32.to_be_bytes()); // List
        payload.extend_from_slice(&1u64.to_be_bytes());
    }
    payload.extend_from_slice(&0u32.to_be_bytes()); // Nil
    payload.extend_from_slice(&0u64.to_be_bytes()); // empty options

    let mut frame = vec![CommandType::Store as u8];
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

// =============================================================================
// Dispatch Tests
// =============================================================================

#[test]
fn test_execute_command_replies() {
    let store = MemoryStore::new();
    let options = Options::new();

    let reply = execute_command(
        &store,
        Command::Store {
            key: key("a"),
            value: Value::from("1"),
            options: options.clone(),
        },
    );
    assert_eq!(reply, None);

    let reply = execute_command(
        &store,
        Command::KeyExists {
            key: key("a"),
            options: options.clone(),
        },
    );
    assert_eq!(reply, Some(Reply::Value(Value::Bool(true))));

    let reply = execute_command(
        &store,
        Command::Load {
            key: key("a"),
            options: options.clone(),
        },
    );
    assert_eq!(reply, Some(Reply::Value(Value::from("1"))));

    let reply = execute_command(
        &store,
        Command::Delete {
            key: key("a"),
            options: options.clone(),
        },
    );
    assert_eq!(reply, Some(Reply::Value(Value::Bool(true))));

    let reply = execute_command(
        &store,
        Command::Load {
            key: key("a"),
            options: options.clone(),
        },
    );
    assert_eq!(reply, Some(Reply::Absent));

    let reply = execute_command(&store, Command::Clear { options });
    assert_eq!(reply, Some(Reply::Ack));
}

#[test]
fn test_store_gets_no_reply_frame() {
    let (server, _store) = spawn_memory_server();
    let mut stream = raw_connect(&server.address);

    write_command(
        &mut stream,
        &Command::Store {
            key: key("a"),
            value: Value::from("1"),
            options: Options::new(),
        },
    )
    .unwrap();
    write_command(
        &mut stream,
        &Command::KeyExists {
            key: key("a"),
            options: Options::new(),
        },
    )
    .unwrap();

    // The first frame back answers key?, not store
    assert_eq!(
        read_reply(&mut stream).unwrap(),
        Reply::Value(Value::Bool(true))
    );
}

#[test]
fn test_pipelined_commands_answered_in_order() {
    let (server, _store) = spawn_memory_server();
    let mut stream = raw_connect(&server.address);

    let commands = vec![
        Command::Load {
            key: key("x"),
            options: Options::new(),
        },
        Command::Store {
            key: key("x"),
            value: Value::Int(1),
            options: Options::new(),
        },
        Command::Load {
            key: key("x"),
            options: Options::new(),
        },
        Command::Delete {
            key: key("x"),
            options: Options::new(),
        },
        Command::Delete {
            key: key("x"),
            options: Options::new(),
        },
        Command::Clear {
            options: Options::new(),
        },
    ];

    // Write everything before reading anything
    for cmd in &commands {
        write_command(&mut stream, cmd).unwrap();
    }

    let expected = vec![
        Reply::Absent,
        Reply::Value(Value::Int(1)),
        Reply::Value(Value::Bool(true)),
        Reply::Value(Value::Bool(false)),
        Reply::Ack,
    ];
    for reply in expected {
        assert_eq!(read_reply(&mut stream).unwrap(), reply);
    }
}

// =============================================================================
// Robustness Tests
// =============================================================================

#[test]
fn test_malformed_frame_closes_only_that_connection() {
    let (server, _store) = spawn_memory_server();

    let mut healthy = Channel::connect(&server.address).unwrap();
    healthy.store("k", "v", &Options::new()).unwrap();

    // Unknown kind byte, empty payload
    let mut bad = raw_connect(&server.address);
    bad.write_all(&[0x7F, 0x00, 0x00, 0x00, 0x00]).unwrap();
    bad.flush().unwrap();

    // Best-effort error reply, then the server hangs up
    match read_reply(&mut bad) {
        Ok(Reply::Error(message)) => assert!(message.contains("Unknown command type")),
        other => panic!("Expected error reply, got {:?}", other),
    }
    assert!(read_reply(&mut bad).is_err());

    // Existing and new connections are unaffected
    assert_eq!(
        healthy.load("k", &Options::new()).unwrap(),
        Some(Value::from("v"))
    );
    let mut fresh = Channel::connect(&server.address).unwrap();
    assert!(fresh.key_exists("k", &Options::new()).unwrap());
}

#[test]
fn test_garbage_payload_does_not_crash_server() {
    let (server, _store) = spawn_memory_server();

    let mut bad = raw_connect(&server.address);
    // Valid load kind, payload that is not a (key, options) tuple
    bad.write_all(&[0x02, 0x00, 0x00, 0x00, 0x03, 0xDE, 0xAD, 0xBE])
        .unwrap();
    drop(bad);

    thread::sleep(Duration::from_millis(50));

    let mut channel = Channel::connect(&server.address).unwrap();
    assert_eq!(channel.load("nothing", &Options::new()).unwrap(), None);
}

#[test]
fn test_deeply_nested_value_does_not_crash_server() {
    let (server, store) = spawn_memory_server();

    let mut healthy = Channel::connect(&server.address).unwrap();
    healthy.store("k", "v", &Options::new()).unwrap();

    let mut bad = raw_connect(&server.address);
    bad.write_all(&nested_store_frame(1_000_000)).unwrap();
    bad.flush().unwrap();

    match read_reply(&mut bad) {
        Ok(Reply::Error(message)) => assert!(message.contains("nesting")),
        other => panic!("Expected error reply, got {:?}", other),
    }
    assert!(read_reply(&mut bad).is_err());

    // The rejected store never reached the store
    assert_eq!(
        healthy.load("k", &Options::new()).unwrap(),
        Some(Value::from("v"))
    );
    let mut fresh = Channel::connect(&server.address).unwrap();
    assert!(fresh.key_exists("k", &Options::new()).unwrap());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_value_at_max_depth_is_stored() {
    let (server, _store) = spawn_memory_server();

    let mut stream = raw_connect(&server.address);
    stream.write_all(&nested_store_frame(MAX_VALUE_DEPTH)).unwrap();
    write_command(
        &mut stream,
        &Command::Load {
            key: key("k"),
            options: Options::new(),
        },
    )
    .unwrap();

    match read_reply(&mut stream).unwrap() {
        Reply::Value(value) => assert_eq!(value.depth(), MAX_VALUE_DEPTH),
        other => panic!("Expected value, got {:?}", other),
    }
}

#[test]
fn test_client_disconnect_mid_frame() {
    let (server, _store) = spawn_memory_server();

    let mut partial = raw_connect(&server.address);
    // Header promises 100 bytes, only 2 arrive
    partial
        .write_all(&[0x02, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00])
        .unwrap();
    drop(partial);

    let mut channel = Channel::connect(&server.address).unwrap();
    channel.clear(&Options::new()).unwrap();
}

#[test]
fn test_max_connections_refuses_extra_clients() {
    let config = Config::builder()
        .address(Address::tcp("127.0.0.1", 0))
        .max_connections(1)
        .build();
    let server = spawn_server_with(config, Arc::new(MemoryStore::new()));

    let mut first = Channel::connect(&server.address).unwrap();
    assert!(!first.key_exists("k", &Options::new()).unwrap());

    // Accepted at the TCP level, then closed without being served
    let mut second = Channel::connect(&server.address).unwrap();
    assert!(matches!(
        second.key_exists("k", &Options::new()),
        Err(LinkError::Connection(_))
    ));

    // The first connection keeps working
    assert!(!first.key_exists("k", &Options::new()).unwrap());
}

#[test]
fn test_idle_timeout_closes_connection() {
    let config = Config::builder()
        .address(Address::tcp("127.0.0.1", 0))
        .idle_timeout_ms(100)
        .build();
    let server = spawn_server_with(config, Arc::new(MemoryStore::new()));

    let mut channel = Channel::connect(&server.address).unwrap();
    assert!(!channel.key_exists("k", &Options::new()).unwrap());

    thread::sleep(Duration::from_millis(400));

    assert!(matches!(
        channel.key_exists("k", &Options::new()),
        Err(LinkError::Connection(_))
    ));
}

#[test]
fn test_store_errors_are_not_replied() {
    struct FailingWrites(MemoryStore);

    impl Store for FailingWrites {
        fn key_exists(&self, key: &[u8], options: &Options) -> kvlink::Result<bool> {
            self.0.key_exists(key, options)
        }

        fn load(&self, key: &[u8], options: &Options) -> kvlink::Result<Option<Value>> {
            self.0.load(key, options)
        }

        fn store(&self, _key: &[u8], _value: Value, _options: &Options) -> kvlink::Result<()> {
            Err(LinkError::Storage("quota exceeded".to_string()))
        }

        fn delete(&self, key: &[u8], options: &Options) -> kvlink::Result<bool> {
            self.0.delete(key, options)
        }

        fn clear(&self, options: &Options) -> kvlink::Result<()> {
            self.0.clear(options)
        }
    }

    let store = FailingWrites(MemoryStore::new());
    let reply = execute_command(
        &store,
        Command::Store {
            key: key("a"),
            value: Value::Nil,
            options: Options::new(),
        },
    );
    assert_eq!(reply, None);

    let reply = execute_command(
        &store,
        Command::Load {
            key: key("a"),
            options: Options::new(),
        },
    );
    assert_eq!(reply, Some(Reply::Absent));
}

#[test]
fn test_shutdown_stops_accepting() {
    let (server, _store) = spawn_memory_server();
    let address = server.address.clone();

    server.stop();

    assert!(Channel::connect(&address).is_err());
}
