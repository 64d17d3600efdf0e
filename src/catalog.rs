//! Static replica catalog.
//!
//! The catalog is built once at startup and is read-only afterwards. Replica
//! order is the configuration order and drives every tie-break.

use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info};

use crate::config::DnsConfig;
use crate::error::DnsError;
use crate::geo::Locator;

/// A point on the globe, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// A content-serving replica.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaHost {
    /// Host name.
    pub name: String,
    /// Address handed out in A records.
    pub ip: Ipv4Addr,
    /// Location of the replica.
    pub coord: Coordinate,
}

/// Ordered, non-empty set of replicas with a designated fallback host.
#[derive(Debug, Clone)]
pub struct ReplicaCatalog {
    hosts: Vec<ReplicaHost>,
    fallback: usize,
}

impl ReplicaCatalog {
    /// Build a catalog whose fallback is the first host.
    pub fn new(hosts: Vec<ReplicaHost>) -> Result<Self, DnsError> {
        if hosts.is_empty() {
            return Err(DnsError::Config(
                "replica catalog must not be empty".to_string(),
            ));
        }
        Ok(Self { hosts, fallback: 0 })
    }

    /// Designate the host called `name` as the fallback.
    pub fn with_fallback(mut self, name: &str) -> Result<Self, DnsError> {
        self.fallback = self
            .hosts
            .iter()
            .position(|h| h.name == name)
            .ok_or_else(|| DnsError::Config(format!("unknown fallback replica {:?}", name)))?;
        Ok(self)
    }

    /// Build the catalog from configuration, geolocating replicas that have
    /// no configured coordinates.
    pub async fn resolve(config: &DnsConfig, locator: &dyn Locator) -> Result<Self, DnsError> {
        let mut hosts = Vec::with_capacity(config.replicas.len());

        for replica in &config.replicas {
            let coord = match (replica.lat, replica.lon) {
                (Some(lat), Some(lon)) => Coordinate { lat, lon },
                _ => {
                    let coord = locator
                        .locate(IpAddr::V4(replica.ip))
                        .await
                        .map_err(|e| {
                            DnsError::Config(format!(
                                "cannot locate replica {} ({}): {}",
                                replica.name, replica.ip, e
                            ))
                        })?;
                    debug!(
                        name = %replica.name,
                        ip = %replica.ip,
                        lat = coord.lat,
                        lon = coord.lon,
                        "located replica"
                    );
                    coord
                }
            };

            hosts.push(ReplicaHost {
                name: replica.name.clone(),
                ip: replica.ip,
                coord,
            });
        }

        let catalog = Self::new(hosts)?;
        let catalog = match config.fallback {
            Some(ref name) => catalog.with_fallback(name)?,
            None => catalog,
        };

        info!(
            replicas = catalog.len(),
            fallback = %catalog.fallback().name,
            "replica catalog loaded"
        );

        Ok(catalog)
    }

    /// All replicas, in catalog order.
    pub fn hosts(&self) -> &[ReplicaHost] {
        &self.hosts
    }

    /// The host returned when a client cannot be located.
    pub fn fallback(&self) -> &ReplicaHost {
        &self.hosts[self.fallback]
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the catalog has no replicas.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Replica addresses in catalog order.
    pub fn ips(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.hosts.iter().map(|h| h.ip)
    }
}
