// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! End-to-end tests: a dispatcher serving the built-in methods over real
//! TCP, exercised through the RPC client facade and through raw sockets
//! for exact wire-format assertions.

use wireline::buffers::ThroughputSettings;
use wireline::dispatcher::{Dispatcher, DispatcherConfig, DispatcherControl};
use wireline::fail::Fail;
use wireline::handlers::{AddHandler, EchoHandler, SubtractHandler};
use wireline::net::{resolve_ip, Endpoint};
use wireline::rpc::{ClientCache, MethodMap, NbClient, RpcClient, SimpleClientCache};
use wireline::scheduler::SelectorFactory;
use wireline::wire::Identifier;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

//==============================================================================
// Test Infrastructure
//==============================================================================

fn method_map() -> Arc<MethodMap> {
    wireline::init_logging();
    let mut map = MethodMap::new();
    map.add_method("add", || Box::new(AddHandler::new()));
    map.add_method("subtract", || Box::new(SubtractHandler::new()));
    map.add_method("echo", || Box::new(EchoHandler::new()));
    map.add_method("echo_censored", || {
        Box::new(EchoHandler::with_censor(Some("secret".to_string())))
    });
    Arc::new(map)
}

struct Server {
    endpoint: Endpoint,
    control: DispatcherControl,
    runner: Option<thread::JoinHandle<()>>,
}

impl Server {
    fn start(config: DispatcherConfig) -> Server {
        let dispatcher = Dispatcher::new(config).unwrap();
        let endpoint = dispatcher
            .add_listener(&resolve_ip("127.0.0.1", 0).unwrap(), method_map())
            .unwrap();
        let control = dispatcher.control();
        let runner = thread::spawn(move || {
            dispatcher.run().unwrap();
        });
        Server {
            endpoint,
            control,
            runner: Some(runner),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.control.stop(15);
        if let Some(runner) = self.runner.take() {
            runner.join().unwrap();
        }
    }
}

fn settings() -> ThroughputSettings {
    ThroughputSettings::default()
}

fn method(name: &str) -> Identifier {
    Identifier::new(name).unwrap()
}

/// A raw blocking client speaking the wire protocol byte for byte.
struct RawClient {
    stream: TcpStream,
}

impl RawClient {
    fn connect(endpoint: &Endpoint) -> RawClient {
        let stream = TcpStream::connect(endpoint.socket_addr()).unwrap();
        RawClient { stream }
    }

    fn send(&mut self, request: &str) {
        self.stream.write_all(request.as_bytes()).unwrap();
    }

    /// Reads the reply up to and including its newline.
    fn read_reply(&mut self) -> String {
        let mut reply = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.stream.read(&mut byte).unwrap();
            assert_ne!(n, 0, "connection closed mid-reply");
            reply.push(byte[0]);
            if byte[0] == b'\n' {
                return String::from_utf8(reply).unwrap();
            }
        }
    }

    /// Returns true if the server closed the connection.
    fn closed(&mut self) -> bool {
        self.stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Ok(0) => true,
            _ => false,
        }
    }
}

//==============================================================================
// Wire-Level Scenarios
//==============================================================================

#[test]
fn add_success_over_the_wire() {
    let server = Server::start(DispatcherConfig::default());

    let mut client = RawClient::connect(&server.endpoint);
    client.send("add 2 3 \n");
    assert_eq!(client.read_reply(), "5 \n");
}

#[test]
fn subtract_underflow_reports_method_failed() {
    let server = Server::start(DispatcherConfig::default());

    let mut client = RawClient::connect(&server.endpoint);
    client.send("subtract -2147483648 1 \n");
    assert_eq!(
        client.read_reply(),
        "! { method_failed \"subtract: subtraction underflow\" } \n"
    );
}

#[test]
fn unknown_method_reports_bad_request() {
    let server = Server::start(DispatcherConfig::default());

    let mut client = RawClient::connect(&server.endpoint);
    client.send("divide 6 2 \n");
    let reply = client.read_reply();
    assert!(reply.starts_with("! { bad_request "), "reply: {}", reply);
    assert!(reply.contains("method not found"), "reply: {}", reply);
}

#[test]
fn streaming_echo_over_the_wire() {
    let server = Server::start(DispatcherConfig::default());

    let mut client = RawClient::connect(&server.endpoint);
    client.send("echo [ \"hello\" \"world\" ] \n");
    assert_eq!(client.read_reply(), "[ \"hello\" \"world\" ] \n");
}

#[test]
fn connection_stays_usable_after_bad_request() {
    let server = Server::start(DispatcherConfig::default());

    let mut client = RawClient::connect(&server.endpoint);
    client.send("divide 6 2 \n");
    let reply = client.read_reply();
    assert!(reply.starts_with("! { bad_request "), "reply: {}", reply);

    // Same TCP stream, next request.
    client.send("add 2 3 \n");
    assert_eq!(client.read_reply(), "5 \n");
}

#[test]
fn two_requests_in_order_on_one_connection() {
    let server = Server::start(DispatcherConfig::default());

    let mut client = RawClient::connect(&server.endpoint);
    client.send("add 2 3 \n");
    assert_eq!(client.read_reply(), "5 \n");
    client.send("echo [ \"hello\" \"world\" ] \n");
    assert_eq!(client.read_reply(), "[ \"hello\" \"world\" ] \n");
}

#[test]
fn whitespace_variants_are_tolerated() {
    let server = Server::start(DispatcherConfig::default());

    let mut client = RawClient::connect(&server.endpoint);
    client.send("add \t 40 \r 2 \r\n");
    assert_eq!(client.read_reply(), "42 \n");
}

//==============================================================================
// Client Facade
//==============================================================================

#[test]
fn client_facade_round_trip() {
    let server = Server::start(DispatcherConfig::default());
    let cache = SimpleClientCache::default();
    let mut client = RpcClient::new(
        &cache,
        server.endpoint.clone(),
        settings(),
        SelectorFactory::Poll,
    );

    let (sum,): (i32,) = client.call(method("add"), (2i32, 3i32)).unwrap();
    assert_eq!(sum, 5);

    let (diff,): (i32,) = client.call(method("subtract"), (10i32, 4i32)).unwrap();
    assert_eq!(diff, 6);

    let words = vec!["hello".to_string(), "world".to_string()];
    let (echoed,): (Vec<String>,) = client.call(method("echo"), (words.clone(),)).unwrap();
    assert_eq!(echoed, words);
}

#[test]
fn client_facade_surfaces_remote_errors() {
    let server = Server::start(DispatcherConfig::default());
    let cache = SimpleClientCache::default();
    let mut client = RpcClient::new(
        &cache,
        server.endpoint.clone(),
        settings(),
        SelectorFactory::Poll,
    );

    let result: Result<(i32,), Fail> =
        client.call(method("subtract"), (i32::min_value(), 1i32));
    match result {
        Err(Fail::Remote { error }) => {
            assert_eq!(error.kind().as_str(), "method_failed");
            assert_eq!(error.description(), "subtract: subtraction underflow");
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    // The same client keeps working after the failed call.
    let (sum,): (i32,) = client.call(method("add"), (1i32, 1i32)).unwrap();
    assert_eq!(sum, 2);
}

#[test]
fn censored_echo_fails_mid_stream() {
    let server = Server::start(DispatcherConfig::default());
    let cache = SimpleClientCache::default();
    let mut client = RpcClient::new(
        &cache,
        server.endpoint.clone(),
        settings(),
        SelectorFactory::Poll,
    );

    let words = vec!["open".to_string(), "secret".to_string(), "tail".to_string()];
    let result: Result<(Vec<String>,), Fail> = client.call(method("echo_censored"), (words,));
    match result {
        Err(Fail::Remote { error }) => {
            assert_eq!(error.kind().as_str(), "method_failed");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn concurrent_clients_are_served_in_parallel() {
    let server = Server::start(DispatcherConfig::default());

    let mut threads = Vec::new();
    for t in 0..4 {
        let endpoint = server.endpoint.clone();
        threads.push(thread::spawn(move || {
            let cache = SimpleClientCache::default();
            let mut client =
                RpcClient::new(&cache, endpoint, settings(), SelectorFactory::Poll);
            for i in 0..25i32 {
                let (sum,): (i32,) = client.call(method("add"), (t, i)).unwrap();
                assert_eq!(sum, t + i);
            }
        }));
    }
    for t in threads {
        t.join().unwrap();
    }
}

#[cfg(target_os = "linux")]
#[test]
fn epoll_selector_serves_requests() {
    let mut config = DispatcherConfig::default();
    config.selector = SelectorFactory::Epoll;
    let server = Server::start(config);

    let cache = SimpleClientCache::default();
    let mut client = RpcClient::new(
        &cache,
        server.endpoint.clone(),
        settings(),
        SelectorFactory::Epoll,
    );
    let (sum,): (i32,) = client.call(method("add"), (20i32, 22i32)).unwrap();
    assert_eq!(sum, 42);
}

//==============================================================================
// Dispatcher Lifecycle
//==============================================================================

#[test]
fn eviction_drops_the_least_recently_active_connection() {
    let mut config = DispatcherConfig::default();
    config.max_connections = 2;
    let server = Server::start(config);

    let mut first = RawClient::connect(&server.endpoint);
    // Prove the first connection is established and monitored.
    first.send("add 1 1 \n");
    assert_eq!(first.read_reply(), "2 \n");

    let mut second = RawClient::connect(&server.endpoint);
    second.send("add 2 2 \n");
    assert_eq!(second.read_reply(), "4 \n");

    // Admitting a third monitored connection exceeds the bound; the least
    // recently active one (the first) is evicted.
    let mut third = RawClient::connect(&server.endpoint);
    third.send("add 3 3 \n");
    assert_eq!(third.read_reply(), "6 \n");

    assert!(first.closed(), "expected the first connection to be evicted");

    // The survivors keep working.
    second.send("add 4 4 \n");
    assert_eq!(second.read_reply(), "8 \n");
    third.send("add 5 5 \n");
    assert_eq!(third.read_reply(), "10 \n");
}

#[test]
fn graceful_stop_joins_under_load() {
    let server = Server::start(DispatcherConfig::default());

    let endpoint = server.endpoint.clone();
    let load = thread::spawn(move || {
        let cache = SimpleClientCache::default();
        let mut client = RpcClient::new(&cache, endpoint, settings(), SelectorFactory::Poll);
        for i in 0..50i32 {
            if client.call::<(i32,), _>(method("add"), (i, i)).is_err() {
                // The server is allowed to go away under us.
                break;
            }
        }
    });

    thread::sleep(Duration::from_millis(20));
    drop(server); // stops and joins the dispatcher
    load.join().unwrap();
}

#[test]
fn client_cache_invalidation_forces_a_new_connection() {
    // A short-lived listener: accept one connection, then vanish.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = Endpoint::from_socket_addr(listener.local_addr().unwrap());

    let cache = SimpleClientCache::default();
    let client = NbClient::connect(&endpoint, 1024).unwrap();
    let (_accepted, _) = listener.accept().unwrap();
    cache.store(Box::new(client));

    drop(listener);

    // The cached entry is reused without reconnecting.
    let reused = cache.obtain(&endpoint).unwrap();
    cache.store(reused);

    // After invalidation, obtain must build a fresh connection, which can
    // only fail now that the listener is gone.
    cache.invalidate_entries(&endpoint);
    assert!(cache.obtain(&endpoint).is_err());
}
