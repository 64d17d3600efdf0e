//! Shared RTT measurements and RTT-based replica selection.
//!
//! The table maps replica -> client -> measured RTT. It is written by the
//! measurement worker and read on every query, so all access goes through a
//! single lock and a reader never sees a half-applied update.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::metrics;

/// Measurements taken from one replica.
#[derive(Debug)]
struct ReplicaSamples {
    replica: Ipv4Addr,
    clients: HashMap<IpAddr, Duration>,
}

/// Thread-safe RTT table.
///
/// Replicas are kept in registration order, which is the order
/// `select_by_rtt` scans them in.
#[derive(Debug, Clone, Default)]
pub struct RttTable {
    inner: Arc<RwLock<Vec<ReplicaSamples>>>,
}

impl RttTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the given replicas registered up front, so that
    /// scan order follows the catalog rather than measurement arrival.
    pub fn with_replicas(replicas: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        let table = Self::new();
        for replica in replicas {
            table.register_replica(replica);
        }
        table
    }

    /// Register a replica. No-op if it is already known.
    pub fn register_replica(&self, replica: Ipv4Addr) {
        let mut inner = self.inner.write();
        if !inner.iter().any(|r| r.replica == replica) {
            inner.push(ReplicaSamples {
                replica,
                clients: HashMap::new(),
            });
        }
    }

    /// Store a measurement, replacing any previous one for the same pair.
    ///
    /// A zero RTT is not a valid sample and is rejected; returns whether the
    /// sample was stored.
    pub fn record(&self, replica: Ipv4Addr, client: IpAddr, rtt: Duration) -> bool {
        if rtt.is_zero() {
            debug!(%replica, %client, "ignoring zero RTT sample");
            return false;
        }

        let mut inner = self.inner.write();
        let idx = match inner.iter().position(|r| r.replica == replica) {
            Some(idx) => idx,
            None => {
                inner.push(ReplicaSamples {
                    replica,
                    clients: HashMap::new(),
                });
                inner.len() - 1
            }
        };
        inner[idx].clients.insert(client, rtt);
        debug!(%replica, %client, rtt_ms = rtt.as_secs_f64() * 1000.0, "recorded RTT");
        true
    }

    /// Measured RTT between `replica` and `client`, if any.
    pub fn get(&self, replica: Ipv4Addr, client: IpAddr) -> Option<Duration> {
        let inner = self.inner.read();
        inner
            .iter()
            .find(|r| r.replica == replica)
            .and_then(|r| r.clients.get(&client).copied())
    }

    /// Replica with the lowest measured RTT to `client`.
    ///
    /// On equal RTTs the earliest registered replica wins. Returns `None` when
    /// no replica has measured this client yet.
    pub fn select_by_rtt(&self, client: IpAddr) -> Option<Ipv4Addr> {
        let inner = self.inner.read();
        let mut best: Option<(Ipv4Addr, Duration)> = None;

        for samples in inner.iter() {
            if let Some(&rtt) = samples.clients.get(&client) {
                match best {
                    Some((_, best_rtt)) if rtt >= best_rtt => {}
                    _ => best = Some((samples.replica, rtt)),
                }
            }
        }

        best.map(|(replica, _)| replica)
    }

    /// Number of registered replicas.
    pub fn replicas_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Total number of stored samples across all replicas.
    pub fn samples_count(&self) -> usize {
        self.inner.read().iter().map(|r| r.clients.len()).sum()
    }

    /// Emit current table metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        let samples = inner.iter().map(|r| r.clients.len()).sum();
        metrics::record_rtt_table_counts(inner.len(), samples);
    }
}
