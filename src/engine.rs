//! Replica selection for a single query.

use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

use crate::geo::GeoSelector;
use crate::measurement::MeasurementHandle;
use crate::metrics;
use crate::rtt::RttTable;

/// Which path produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// Lowest measured RTT.
    Rtt,
    /// Nearest replica to the located client.
    Geo,
    /// Client could not be located; fallback host.
    Fallback,
}

impl SelectionSource {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionSource::Rtt => "rtt",
            SelectionSource::Geo => "geo",
            SelectionSource::Fallback => "fallback",
        }
    }
}

/// Chooses the replica to answer with.
///
/// Measured RTTs win. Without any, the nearest replica is used and a
/// measurement is requested so later queries from the same client can use
/// real RTT data.
#[derive(Clone)]
pub struct ReplicaSelectionEngine {
    rtt: RttTable,
    geo: GeoSelector,
    measurements: MeasurementHandle,
}

impl ReplicaSelectionEngine {
    /// Create an engine over the shared RTT table.
    pub fn new(rtt: RttTable, geo: GeoSelector, measurements: MeasurementHandle) -> Self {
        Self {
            rtt,
            geo,
            measurements,
        }
    }

    /// Replica address for `client`. Always produces an answer.
    pub async fn select(&self, client: IpAddr) -> Ipv4Addr {
        self.select_with_source(client).await.0
    }

    /// Like [`select`](Self::select), also reporting which path was taken.
    pub async fn select_with_source(&self, client: IpAddr) -> (Ipv4Addr, SelectionSource) {
        if let Some(replica) = self.rtt.select_by_rtt(client) {
            debug!(%client, %replica, "selected by RTT");
            metrics::record_selection(SelectionSource::Rtt);
            return (replica, SelectionSource::Rtt);
        }

        let (replica, source) = self.geo.select_with_source(client).await;
        self.measurements.request_measurement(client);

        debug!(%client, %replica, source = source.as_str(), "selected without RTT data");
        metrics::record_selection(source);
        (replica, source)
    }

    /// The shared RTT table.
    pub fn rtt_table(&self) -> &RttTable {
        &self.rtt
    }
}
