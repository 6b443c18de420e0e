// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::items_after_statements)] // Helpers declared next to use

//! Name server and name client talking over real sockets.

use portlink::name::{
    InMemoryNameStore, NameClient, NameConfig, NameServer, NameServerConfig, NameStore,
};
use portlink::{
    Bottle, CarrierRegistry, Contact, ContactStyle, Network, NetworkConfig, Port, SizedWriter,
    Value,
};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Fixture {
    server: NameServer,
    registry: Arc<CarrierRegistry>,
    // Keeps the conf dir alive; nothing must leak into the user's config.
    conf: tempfile::TempDir,
}

impl Fixture {
    fn start() -> Self {
        let registry = Arc::new(CarrierRegistry::with_defaults());
        let store: Arc<dyn NameStore> = Arc::new(InMemoryNameStore::new(31000, 50));
        let server = NameServer::start(NameServerConfig::local(), Arc::clone(&registry), store)
            .expect("name server");
        Self {
            server,
            registry,
            conf: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn name_config(&self) -> NameConfig {
        NameConfig::default()
            .with_conf_dir(self.conf.path())
            .with_namespace("/root")
            .with_server(self.server.contact())
    }

    fn client(&self) -> NameClient {
        NameClient::new(self.name_config(), Arc::clone(&self.registry))
            .with_timeout(Some(Duration::from_secs(5)))
    }

    fn network(&self) -> Network {
        let config = NetworkConfig {
            fake: false,
            ..NetworkConfig::local()
        }
        .with_name(self.name_config());
        Network::init(config).expect("network")
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}

#[test]
fn test_text_commands_over_name_ser() {
    let fx = Fixture::start();
    let client = fx.client();

    let registered = client.register_contact(&Contact::new("/ns/foo", "tcp", "127.0.0.1", 9100));
    assert_eq!(registered, Contact::new("/ns/foo", "tcp", "127.0.0.1", 9100));
    assert_eq!(client.query_name("/ns/foo"), registered);

    // The server answers for itself too.
    assert_eq!(client.query_name("/root"), fx.server.contact());

    let names: Vec<String> = client
        .list()
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert!(names.contains(&"/ns/foo".to_string()));
    assert!(names.contains(&"/root".to_string()));

    client.unregister_name("/ns/foo");
    assert!(!client.query_name("/ns/foo").is_valid());
}

#[test]
fn test_server_allocates_ports() {
    let fx = Fixture::start();
    let client = fx.client();

    let first = client.register_name("/alloc/a");
    let second = client.register_name("/alloc/b");
    assert!(first.is_valid() && second.is_valid());
    assert_eq!(first.port(), Some(31000));
    assert_eq!(second.port(), Some(31001));
    // The client connected from loopback, so that is the host it gets.
    assert_eq!(first.host(), "127.0.0.1");
}

#[test]
fn test_properties_over_the_wire() {
    let fx = Fixture::start();
    let client = fx.client();
    client.register_name("/props");

    client
        .set_property("/props", "offers", &Value::from("tcp"))
        .unwrap();
    let got = client.get_property("/props", "offers").expect("property");
    assert_eq!(got.to_plain_string(), "tcp");
    assert!(client.get_property("/props", "missing").is_none());
}

#[test]
fn test_bottle_commands_over_tcp() {
    let fx = Fixture::start();
    let client = fx.client();
    client.register_contact(&Contact::new("/bot/a", "udp", "127.0.0.1", 9200));

    let reply = client
        .send_bottle(&Bottle::new().with("bot").with("query").with("/bot/a"))
        .unwrap();
    assert_eq!(reply.get_str(0), Some("port"));
    assert_eq!(reply.find("carrier").and_then(Value::as_str), Some("udp"));
    assert_eq!(reply.find("port_number").and_then(Value::as_int), Some(9200));
}

#[test]
fn test_unknown_command_is_reported() {
    let fx = Fixture::start();
    let reply = fx.client().send_text("frobnicate now").unwrap();
    assert!(reply.starts_with("unknown command"), "got {:?}", reply);
}

#[test]
fn test_typed_text_session() {
    let fx = Fixture::start();
    let addr = fx.server.contact().socket_address().unwrap();

    let mut stream = TcpStream::connect(&addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(b"CONNECT /typist\r\n").unwrap();
    let mut greeting = String::new();
    BufReader::new(stream.try_clone().unwrap())
        .read_line(&mut greeting)
        .unwrap();
    assert!(greeting.starts_with("Welcome /typist"));

    stream
        .write_all(b"NAME_SERVER register /typed tcp 127.0.0.1 9300\r\n")
        .unwrap();

    let client = fx.client();
    assert!(wait_until(Duration::from_secs(5), || client
        .query_name("/typed")
        .is_valid()));
    assert_eq!(client.query_name("/typed").port(), Some(9300));
}

#[test]
fn test_network_write_reaches_server() {
    let fx = Fixture::start();
    let network = fx.network();
    network.register_contact(&Contact::new("/net/w", "tcp", "127.0.0.1", 9400));

    let reply = network
        .write(
            &fx.server.contact(),
            &Bottle::new().with("query").with("/net/w"),
            &ContactStyle::default(),
        )
        .unwrap();
    assert_eq!(reply.get_str(0), Some("registration"));
}

#[test]
fn test_fake_client_knows_nothing() {
    let network = Network::init(NetworkConfig::local()).unwrap();
    assert!(!network.query_name("/nope").is_valid());
}

#[test]
fn test_unreachable_server_gives_invalid_contacts() {
    let conf = tempfile::tempdir().unwrap();
    // Bound then dropped: nothing listens there any more.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = NameConfig::default()
        .with_conf_dir(conf.path())
        .with_server(Contact::by_socket("tcp", "127.0.0.1", port));
    let client = NameClient::new(config, Arc::new(CarrierRegistry::with_defaults()))
        .with_timeout(Some(Duration::from_millis(500)));

    assert!(!client.query_name("/anything").is_valid());
    assert!(!client.register_name("/anything").is_valid());
    assert!(client.send_text("list").is_err());
}

#[test]
fn test_ports_resolve_through_the_server() {
    let fx = Fixture::start();
    let network = fx.network();

    let input = Port::open(&network, "/served/in").unwrap();
    let output = Port::open(&network, "/served/out").unwrap();
    assert_eq!(fx.server.store().query("/served/in"), *input.contact());

    output.add_output("/served/in", "tcp").unwrap();
    output
        .write(SizedWriter::from_bytes(b"via the name server".to_vec()))
        .unwrap();
    let msg = input.read_timeout(Duration::from_secs(5)).expect("message");
    assert_eq!(msg.payload(), b"via the name server");

    output.close();
    input.close();
    assert!(!fx.server.store().query("/served/in").is_valid());
}

#[test]
fn test_deeply_nested_message_leaves_server_running() {
    let fx = Fixture::start();
    let network = fx.network();

    let output = Port::open(&network, "/deep/out").unwrap();
    output.add_output("/root", "tcp").unwrap();
    output
        .write(SizedWriter::from_bytes("(".repeat(100_000).into_bytes()))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || output.pending_writes() == 0));

    let client = fx.client();
    client.register_contact(&Contact::new("/deep/after", "tcp", "127.0.0.1", 9500));
    assert_eq!(client.query_name("/deep/after").port(), Some(9500));
    output.close();
}
