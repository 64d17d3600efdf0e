//! Configuration types for replica-dns.

use hickory_proto::rr::Name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::DnsError;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS responder configuration.
    pub dns: DnsConfig,

    /// Geolocation lookup configuration.
    #[serde(default)]
    pub geo: GeoConfig,

    /// RTT measurement configuration.
    #[serde(default)]
    pub measurement: MeasurementConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load a TOML file, layered with `REPLICA_DNS__*` environment variables.
    ///
    /// The result is not validated; callers apply overrides first and then
    /// call [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, DnsError> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix("REPLICA_DNS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), DnsError> {
        self.dns.validate()?;

        if self.measurement.queue_capacity == 0 {
            return Err(DnsError::Config(
                "measurement.queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// DNS responder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address to listen on for UDP queries.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// The single zone this responder answers for.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// TTL for answer records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Replica catalog, in selection order.
    #[serde(default)]
    pub replicas: Vec<ReplicaConfig>,

    /// Name of the replica returned when geolocation fails.
    /// Defaults to the first replica.
    #[serde(default)]
    pub fallback: Option<String>,
}

impl DnsConfig {
    fn validate(&self) -> Result<(), DnsError> {
        Name::from_ascii(&self.zone)
            .map_err(|e| DnsError::Config(format!("invalid zone {:?}: {}", self.zone, e)))?;

        if self.replicas.is_empty() {
            return Err(DnsError::Config(
                "at least one replica must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for replica in &self.replicas {
            if !names.insert(replica.name.as_str()) {
                return Err(DnsError::Config(format!(
                    "duplicate replica name {:?}",
                    replica.name
                )));
            }
            replica.validate()?;
        }

        if let Some(ref fallback) = self.fallback {
            if !names.contains(fallback.as_str()) {
                return Err(DnsError::Config(format!(
                    "fallback {:?} is not a configured replica",
                    fallback
                )));
            }
        }

        Ok(())
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            zone: default_zone(),
            ttl: default_ttl(),
            replicas: Vec::new(),
            fallback: None,
        }
    }
}

/// A replica host as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Host name (informational, also used to name the fallback).
    pub name: String,

    /// IPv4 address handed out in answers.
    pub ip: Ipv4Addr,

    /// Latitude in degrees. Resolved by geolocation at startup when absent.
    #[serde(default)]
    pub lat: Option<f64>,

    /// Longitude in degrees. Resolved by geolocation at startup when absent.
    #[serde(default)]
    pub lon: Option<f64>,
}

impl ReplicaConfig {
    fn validate(&self) -> Result<(), DnsError> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(DnsError::Config(format!(
                        "replica {:?} has out-of-range coordinates ({}, {})",
                        self.name, lat, lon
                    )));
                }
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(DnsError::Config(format!(
                "replica {:?} must set both lat and lon, or neither",
                self.name
            ))),
        }
    }
}

/// Geolocation lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Base URL of the ip-api compatible lookup service.
    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,

    /// Upper bound on a single lookup, in milliseconds.
    #[serde(default = "default_geo_timeout_ms")]
    pub timeout_ms: u64,
}

impl GeoConfig {
    /// Lookup timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geo_endpoint(),
            timeout_ms: default_geo_timeout_ms(),
        }
    }
}

/// RTT measurement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Whether cold clients trigger measurements at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Capacity of the pending measurement queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// TCP port of the measurement agent on each replica.
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    /// Upper bound on a single probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl MeasurementConfig {
    /// Probe timeout as a `Duration`.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_queue_capacity(),
            agent_port: default_agent_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "replica_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 44444;

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn default_zone() -> String {
    "cs5700cdnproject.ccs.neu.edu".to_string()
}

fn default_ttl() -> u32 {
    60
}

fn default_geo_endpoint() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_geo_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_agent_port() -> u16 {
    44445
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}
