//! Shared test infrastructure for selection and loopback integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};

use replica_dns::config::{
    Config, DnsConfig, GeoConfig, MeasurementConfig, ReplicaConfig, TelemetryConfig,
};
use replica_dns::geo::{GeoError, GeoSelector, Locator};
use replica_dns::measurement::{MeasurementHandle, MeasurementQueue, ProbeError, RttProbe};
use replica_dns::{Coordinate, ReplicaCatalog, ReplicaHost, ReplicaSelectionEngine, RttTable};

// --- Constants ---

pub const ZONE: &str = "cdn.example.com";

// --- Locator ---

/// Locator answering from a fixed table. Unknown addresses fail the way a
/// lookup service reports private ranges.
#[derive(Clone, Default)]
pub struct StaticLocator {
    coords: HashMap<IpAddr, Coordinate>,
    calls: Arc<AtomicUsize>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate `ip` at (`lat`, `lon`).
    pub fn with(mut self, ip: &str, lat: f64, lon: f64) -> Self {
        self.coords.insert(ip.parse().unwrap(), Coordinate { lat, lon });
        self
    }

    /// Number of lookups performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Locator for StaticLocator {
    async fn locate(&self, ip: IpAddr) -> Result<Coordinate, GeoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.coords
            .get(&ip)
            .copied()
            .ok_or_else(|| GeoError::Failed("private range".to_string()))
    }
}

// --- Probe ---

/// Probe answering with a fixed RTT per replica; replicas not listed are
/// unreachable.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    rtts: HashMap<Ipv4Addr, Duration>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, replica: &str, rtt_ms: u64) -> Self {
        self.rtts
            .insert(replica.parse().unwrap(), Duration::from_millis(rtt_ms));
        self
    }
}

#[async_trait]
impl RttProbe for ScriptedProbe {
    async fn measure(&self, replica: &ReplicaHost, _client: IpAddr) -> Result<Duration, ProbeError> {
        self.rtts
            .get(&replica.ip)
            .copied()
            .ok_or_else(|| ProbeError::Network(format!("{} unreachable", replica.ip)))
    }
}

// --- Catalog and engine builders ---

pub fn host(name: &str, ip: &str, lat: f64, lon: f64) -> ReplicaHost {
    ReplicaHost {
        name: name.to_string(),
        ip: ip.parse().unwrap(),
        coord: Coordinate { lat, lon },
    }
}

/// Engine under test plus the pieces tests inspect.
pub struct TestEngine {
    pub engine: ReplicaSelectionEngine,
    pub queue: MeasurementQueue,
    pub table: RttTable,
    pub catalog: Arc<ReplicaCatalog>,
}

pub fn build_engine(catalog: ReplicaCatalog, locator: StaticLocator) -> TestEngine {
    let catalog = Arc::new(catalog);
    let table = RttTable::with_replicas(catalog.ips());
    let geo = GeoSelector::new(Arc::new(locator), catalog.clone(), Duration::from_secs(1));
    let (handle, queue) = MeasurementHandle::channel(64);

    TestEngine {
        engine: ReplicaSelectionEngine::new(table.clone(), geo, handle),
        queue,
        table,
        catalog,
    }
}

// --- Config builders ---

pub fn replica_config(name: &str, ip: &str, lat: f64, lon: f64) -> ReplicaConfig {
    ReplicaConfig {
        name: name.to_string(),
        ip: ip.parse().unwrap(),
        lat: Some(lat),
        lon: Some(lon),
    }
}

pub fn test_config(replicas: Vec<ReplicaConfig>) -> Config {
    Config {
        dns: DnsConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            zone: ZONE.to_string(),
            ttl: 60,
            replicas,
            fallback: None,
        },
        geo: GeoConfig::default(),
        measurement: MeasurementConfig::default(),
        telemetry: TelemetryConfig::default(),
    }
}

// --- Query construction ---

/// Build wire-format bytes for an A query.
pub fn build_query_bytes(name: &str, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(RecordType::A);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

// --- Response helpers ---

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(a.0),
            _ => None,
        })
        .collect()
}

/// Assert the response carries exactly one A record with `expected`.
pub fn assert_single_a(msg: &Message, expected: Ipv4Addr) {
    assert_eq!(
        extract_a_ips(msg),
        vec![expected],
        "expected a single A record for {}",
        expected
    );
}
