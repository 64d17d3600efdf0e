//! Geolocation lookups and nearest-replica selection.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{Coordinate, ReplicaCatalog, ReplicaHost};
use crate::config::GeoConfig;
use crate::engine::SelectionSource;
use crate::error::DnsError;
use crate::metrics;

/// Reasons a client could not be located.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The lookup service answered with an explicit failure status.
    #[error("lookup failed: {0}")]
    Failed(String),

    /// The service reported success without usable coordinates.
    #[error("lookup returned no usable coordinates")]
    Incomplete,

    /// The lookup did not finish in time.
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    /// Transport, HTTP status or decoding error.
    #[error("lookup transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GeoError {
    /// True for failures the service reports itself (private or reserved
    /// ranges and the like), as opposed to the lookup breaking.
    pub fn is_expected(&self) -> bool {
        matches!(self, GeoError::Failed(_))
    }

    fn kind(&self) -> metrics::GeoFailureKind {
        match self {
            GeoError::Failed(_) => metrics::GeoFailureKind::Failed,
            GeoError::Incomplete => metrics::GeoFailureKind::Incomplete,
            GeoError::Timeout(_) => metrics::GeoFailureKind::Timeout,
            GeoError::Transport(_) => metrics::GeoFailureKind::Transport,
        }
    }
}

/// Resolves an IP address to a coordinate.
#[async_trait]
pub trait Locator: Send + Sync {
    /// Locate `ip`.
    async fn locate(&self, ip: IpAddr) -> Result<Coordinate, GeoError>;
}

/// Response body of an ip-api compatible service.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

impl IpApiResponse {
    fn into_coordinate(self) -> Result<Coordinate, GeoError> {
        if self.status.eq_ignore_ascii_case("fail") {
            return Err(GeoError::Failed(
                self.message.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Ok(Coordinate { lat, lon })
            }
            _ => Err(GeoError::Incomplete),
        }
    }
}

/// HTTP locator for ip-api.com style JSON endpoints.
#[derive(Debug, Clone)]
pub struct IpApiLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiLocator {
    /// Create a locator from configuration.
    pub fn new(config: &GeoConfig) -> Result<Self, DnsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, ip: IpAddr) -> String {
        format!("{}/{}?fields=status,message,lat,lon", self.endpoint, ip)
    }
}

#[async_trait]
impl Locator for IpApiLocator {
    async fn locate(&self, ip: IpAddr) -> Result<Coordinate, GeoError> {
        let response: IpApiResponse = self
            .client
            .get(self.url(ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_coordinate()
    }
}

/// Catalog entry closest to `coord`.
///
/// Ties go to the entry that appears first in the catalog.
pub fn nearest_replica(catalog: &ReplicaCatalog, coord: Coordinate) -> &ReplicaHost {
    let mut best = catalog.fallback();
    let mut best_distance: Option<f64> = None;

    for host in catalog.hosts() {
        let d = coord.distance_to(&host.coord);
        match best_distance {
            Some(current) if d >= current => {}
            _ => {
                best = host;
                best_distance = Some(d);
            }
        }
    }

    best
}

/// Picks the geographically nearest replica for a client.
#[derive(Clone)]
pub struct GeoSelector {
    locator: Arc<dyn Locator>,
    catalog: Arc<ReplicaCatalog>,
    timeout: Duration,
}

impl GeoSelector {
    /// Create a selector over `catalog` that gives each lookup `timeout`.
    pub fn new(locator: Arc<dyn Locator>, catalog: Arc<ReplicaCatalog>, timeout: Duration) -> Self {
        Self {
            locator,
            catalog,
            timeout,
        }
    }

    /// The catalog this selector chooses from.
    pub fn catalog(&self) -> &ReplicaCatalog {
        &self.catalog
    }

    /// Nearest replica to `client`, or the fallback host if the client
    /// cannot be located. Never fails.
    pub async fn select_by_geo(&self, client: IpAddr) -> Ipv4Addr {
        self.select_with_source(client).await.0
    }

    /// Like [`select_by_geo`](Self::select_by_geo), also reporting whether
    /// the fallback host was used.
    pub async fn select_with_source(&self, client: IpAddr) -> (Ipv4Addr, SelectionSource) {
        match self.lookup(client).await {
            Ok(coord) => {
                let host = nearest_replica(&self.catalog, coord);
                debug!(
                    %client,
                    lat = coord.lat,
                    lon = coord.lon,
                    replica = %host.name,
                    "selected nearest replica"
                );
                (host.ip, SelectionSource::Geo)
            }
            Err(e) => {
                if e.is_expected() {
                    debug!(%client, error = %e, "client not locatable, using fallback");
                } else {
                    warn!(%client, error = %e, "geolocation lookup failed, using fallback");
                }
                metrics::record_geo_failure(e.kind());
                (self.catalog.fallback().ip, SelectionSource::Fallback)
            }
        }
    }

    async fn lookup(&self, client: IpAddr) -> Result<Coordinate, GeoError> {
        tokio::time::timeout(self.timeout, self.locator.locate(client))
            .await
            .map_err(|_| GeoError::Timeout(self.timeout))?
    }
}
