//! Real UDP loopback tests: start a `DnsServer` on 127.0.0.1 and query it.

mod common;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use replica_dns::{DnsServer, RttTable};

use common::*;

// =========================================================================
// Infrastructure
// =========================================================================

/// A responder running on a random port; stops when dropped.
struct TestServer {
    addr: SocketAddr,
    table: RttTable,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start(locator: StaticLocator, probe: ScriptedProbe) -> Self {
        let config = test_config(vec![
            replica_config("nyc", "10.0.0.1", 40.7, -74.0),
            replica_config("london", "10.0.0.2", 51.5, -0.1),
        ]);
        let server = DnsServer::with_collaborators(config, Arc::new(locator), Arc::new(probe))
            .expect("test config is valid");
        let table = server.rtt_table().clone();

        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("failed to bind UDP socket");
        let addr = socket.local_addr().expect("failed to get local addr");

        let shutdown = CancellationToken::new();
        tokio::spawn(server.serve(socket, shutdown.clone()));

        // Give the server a moment to load the catalog.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            table,
            shutdown,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Send a query and wait up to `timeout` for the reply.
async fn query(server: SocketAddr, name: &str, id: u16, timeout: Duration) -> Option<Message> {
    let sock = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind client socket");
    sock.send_to(&build_query_bytes(name, id), server)
        .await
        .expect("failed to send query");

    let mut buf = vec![0u8; 4096];
    let len = tokio::time::timeout(timeout, sock.recv(&mut buf))
        .await
        .ok()?
        .expect("failed to recv response");

    Some(Message::from_vec(&buf[..len]).expect("failed to parse DNS response"))
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn answers_zone_query_with_nearest_replica() {
    let locator = StaticLocator::new().with("127.0.0.1", 50.0, 1.0);
    let server = TestServer::start(locator, ScriptedProbe::new()).await;

    let msg = query(server.addr, ZONE, 0x1234, Duration::from_secs(5))
        .await
        .expect("no response");

    assert_eq!(msg.id(), 0x1234);
    assert_eq!(msg.message_type(), MessageType::Response);
    assert_eq!(msg.queries().len(), 1);
    assert_single_a(&msg, Ipv4Addr::new(10, 0, 0, 2));
}

#[tokio::test]
async fn unlocatable_client_gets_first_replica() {
    let server = TestServer::start(StaticLocator::new(), ScriptedProbe::new()).await;

    let msg = query(server.addr, ZONE, 1, Duration::from_secs(5))
        .await
        .expect("no response");

    assert_single_a(&msg, Ipv4Addr::new(10, 0, 0, 1));
}

#[tokio::test]
async fn wrong_zone_gets_no_response() {
    let server = TestServer::start(StaticLocator::new(), ScriptedProbe::new()).await;

    let reply = query(server.addr, "example.org", 2, Duration::from_millis(300)).await;
    assert!(reply.is_none(), "queries outside the zone must be dropped");

    // The server keeps serving afterwards.
    assert!(query(server.addr, ZONE, 3, Duration::from_secs(5)).await.is_some());
}

#[tokio::test]
async fn measured_rtt_overrides_geography() {
    // Geographically nearest is london, but nyc measures faster.
    let locator = StaticLocator::new().with("127.0.0.1", 50.0, 1.0);
    let probe = ScriptedProbe::new().with("10.0.0.1", 10).with("10.0.0.2", 90);
    let server = TestServer::start(locator, probe).await;

    let first = query(server.addr, ZONE, 10, Duration::from_secs(5))
        .await
        .expect("no response");
    assert_single_a(&first, Ipv4Addr::new(10, 0, 0, 2));

    // Wait for the measurement worker to fill the table.
    let client = "127.0.0.1".parse().unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.table.samples_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("measurement never completed");
    assert_eq!(
        server.table.select_by_rtt(client),
        Some(Ipv4Addr::new(10, 0, 0, 1))
    );

    let second = query(server.addr, ZONE, 11, Duration::from_secs(5))
        .await
        .expect("no response");
    assert_eq!(second.id(), 11);
    assert_single_a(&second, Ipv4Addr::new(10, 0, 0, 1));
}
