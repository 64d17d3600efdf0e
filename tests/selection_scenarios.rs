//! Replica selection scenarios run against the public engine API.

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use replica_dns::geo::nearest_replica;
use replica_dns::measurement::MeasurementWorker;
use replica_dns::{Coordinate, ReplicaCatalog, SelectionSource};

use common::*;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn ip4(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn two_hosts() -> ReplicaCatalog {
    ReplicaCatalog::new(vec![
        host("replicaA", "10.0.0.1", 40.1, -74.0),
        host("replicaB", "10.0.0.2", 51.5, -0.1),
    ])
    .unwrap()
}

// =========================================================================
// RTT path
// =========================================================================

#[tokio::test]
async fn measured_client_gets_lowest_rtt_without_geo_or_measurement() {
    let locator = StaticLocator::new().with("1.2.3.4", 51.5, -0.1);
    let mut t = build_engine(two_hosts(), locator.clone());
    t.table.record(ip4("10.0.0.1"), ip("1.2.3.4"), Duration::from_millis(20));
    t.table.record(ip4("10.0.0.2"), ip("1.2.3.4"), Duration::from_millis(35));

    let (selected, source) = t.engine.select_with_source(ip("1.2.3.4")).await;

    assert_eq!(selected, ip4("10.0.0.1"));
    assert_eq!(source, SelectionSource::Rtt);
    assert_eq!(locator.calls(), 0, "geolocation must not be consulted");
    assert_eq!(t.queue.try_next(), None, "no measurement may be requested");
}

#[tokio::test]
async fn equal_rtts_resolve_to_first_catalog_replica() {
    let mut t = build_engine(two_hosts(), StaticLocator::new());
    t.table.record(ip4("10.0.0.2"), ip("1.2.3.4"), Duration::from_millis(25));
    t.table.record(ip4("10.0.0.1"), ip("1.2.3.4"), Duration::from_millis(25));

    for _ in 0..10 {
        assert_eq!(t.engine.select(ip("1.2.3.4")).await, ip4("10.0.0.1"));
    }
    assert_eq!(t.queue.try_next(), None);
}

// =========================================================================
// Geo path
// =========================================================================

#[tokio::test]
async fn cold_client_gets_nearest_replica_and_one_measurement_request() {
    let locator = StaticLocator::new().with("5.6.7.8", 40.0, -73.9);
    let mut t = build_engine(two_hosts(), locator.clone());

    let (selected, source) = t.engine.select_with_source(ip("5.6.7.8")).await;

    assert_eq!(selected, ip4("10.0.0.1"));
    assert_eq!(source, SelectionSource::Geo);
    assert_eq!(locator.calls(), 1);
    assert_eq!(t.queue.try_next(), Some(ip("5.6.7.8")));
    assert_eq!(t.queue.try_next(), None);
}

#[tokio::test]
async fn unlocatable_client_gets_fallback_regardless_of_catalog() {
    // Fallback is deliberately not the nearest to anything in particular.
    let catalog = ReplicaCatalog::new(vec![
        host("nyc", "10.0.0.1", 40.7, -74.0),
        host("sydney", "10.0.0.2", -33.9, 151.2),
        host("london", "10.0.0.3", 51.5, -0.1),
    ])
    .unwrap()
    .with_fallback("sydney")
    .unwrap();
    let mut t = build_engine(catalog, StaticLocator::new());

    let (selected, source) = t.engine.select_with_source(ip("9.9.9.9")).await;

    assert_eq!(selected, ip4("10.0.0.2"));
    assert_eq!(source, SelectionSource::Fallback);
    assert_eq!(t.queue.try_next(), Some(ip("9.9.9.9")));
}

#[test]
fn nearest_of_three_known_hosts() {
    let catalog = ReplicaCatalog::new(vec![
        host("oregon", "10.0.0.1", 45.5, -122.7),
        host("virginia", "10.0.0.2", 38.9, -77.0),
        host("ireland", "10.0.0.3", 53.3, -6.3),
    ])
    .unwrap();

    // Chicago is far closer to Virginia than to Oregon or Ireland.
    let chicago = Coordinate { lat: 41.9, lon: -87.6 };
    assert_eq!(nearest_replica(&catalog, chicago).name, "virginia");

    let reykjavik = Coordinate { lat: 64.1, lon: -21.9 };
    assert_eq!(nearest_replica(&catalog, reykjavik).name, "ireland");
}

// =========================================================================
// Cold to warm
// =========================================================================

#[tokio::test]
async fn measurement_turns_cold_client_into_rtt_selection() {
    let locator = StaticLocator::new().with("5.6.7.8", 40.0, -73.9);
    let mut t = build_engine(two_hosts(), locator.clone());

    // Geographically nearest is replicaA, but replicaB measures faster.
    assert_eq!(t.engine.select(ip("5.6.7.8")).await, ip4("10.0.0.1"));
    let client = t.queue.try_next().expect("measurement requested");

    let probe = ScriptedProbe::new().with("10.0.0.1", 80).with("10.0.0.2", 30);
    let (_, worker_queue) = replica_dns::MeasurementHandle::channel(1);
    let worker = MeasurementWorker::new(
        worker_queue,
        Arc::new(probe),
        t.catalog.clone(),
        t.table.clone(),
    );
    assert_eq!(worker.measure_client(client).await, 2);

    let (selected, source) = t.engine.select_with_source(ip("5.6.7.8")).await;
    assert_eq!(selected, ip4("10.0.0.2"));
    assert_eq!(source, SelectionSource::Rtt);
    assert_eq!(locator.calls(), 1);
}
