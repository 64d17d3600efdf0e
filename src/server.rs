//! DNS server setup and lifecycle management.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::ReplicaCatalog;
use crate::config::Config;
use crate::engine::ReplicaSelectionEngine;
use crate::error::DnsError;
use crate::geo::{GeoSelector, IpApiLocator, Locator};
use crate::handler::QueryHandler;
use crate::measurement::{AgentProbe, MeasurementHandle, MeasurementWorker, RttProbe};
use crate::metrics::{self, QueryResult};
use crate::rtt::RttTable;

/// Interval for emitting RTT table metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 4096;

/// Periodically emit RTT table metrics.
async fn metrics_loop(table: RttTable, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                table.emit_metrics();
                debug!(
                    replicas = table.replicas_count(),
                    samples = table.samples_count(),
                    "emitted RTT table metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// DNS responder answering with the best replica per client.
pub struct DnsServer {
    config: Config,
    locator: Arc<dyn Locator>,
    probe: Arc<dyn RttProbe>,
    table: RttTable,
}

impl DnsServer {
    /// Create a server using the HTTP locator and replica measurement agents.
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: Config) -> Result<Self, DnsError> {
        config.validate()?;
        let locator = Arc::new(IpApiLocator::new(&config.geo)?);
        let probe = Arc::new(AgentProbe::from_config(&config.measurement));
        Self::with_collaborators(config, locator, probe)
    }

    /// Create a server with explicit geolocation and probe implementations.
    ///
    /// Fails if the configuration does not validate.
    pub fn with_collaborators(
        config: Config,
        locator: Arc<dyn Locator>,
        probe: Arc<dyn RttProbe>,
    ) -> Result<Self, DnsError> {
        config.validate()?;
        Ok(Self {
            config,
            locator,
            probe,
            table: RttTable::new(),
        })
    }

    /// Get a reference to the shared RTT table.
    pub fn rtt_table(&self) -> &RttTable {
        &self.table
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        let socket = UdpSocket::bind(self.config.dns.listen_addr).await?;
        info!(addr = %self.config.dns.listen_addr, "DNS UDP listening");
        self.serve(socket, shutdown).await
    }

    /// Serve queries on an already bound socket until `shutdown` is cancelled.
    ///
    /// Datagrams are handled one at a time; measurement runs on its own task.
    pub async fn serve(self, socket: UdpSocket, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            zone = %self.config.dns.zone,
            replicas = self.config.dns.replicas.len(),
            "Starting replica-dns server"
        );

        let catalog = Arc::new(ReplicaCatalog::resolve(&self.config.dns, self.locator.as_ref()).await?);
        for ip in catalog.ips() {
            self.table.register_replica(ip);
        }

        let worker_shutdown = shutdown.child_token();
        let (measurements, worker_handle) = if self.config.measurement.enabled {
            let (handle, queue) = MeasurementHandle::channel(self.config.measurement.queue_capacity);
            let worker = MeasurementWorker::new(
                queue,
                self.probe.clone(),
                catalog.clone(),
                self.table.clone(),
            );
            let task = tokio::spawn(worker.run(worker_shutdown.clone()));
            (handle, Some(task))
        } else {
            info!("RTT measurement disabled");
            (MeasurementHandle::disabled(), None)
        };

        let geo = GeoSelector::new(self.locator.clone(), catalog.clone(), self.config.geo.timeout());
        let engine = ReplicaSelectionEngine::new(self.table.clone(), geo, measurements);
        let handler = QueryHandler::new(&self.config.dns.zone, self.config.dns.ttl, engine);

        let metrics_handle = tokio::spawn(metrics_loop(self.table.clone(), shutdown.child_token()));
        self.table.emit_metrics();

        info!(zone = %handler.zone(), "DNS server ready to serve queries");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("DNS server shutdown requested");
                    break;
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, src) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(error = %e, "UDP receive failed");
                            continue;
                        }
                    };

                    if let Some(response) = handler.handle(&buf[..len], src).await {
                        if let Err(e) = socket.send_to(&response, src).await {
                            warn!(%src, error = %e, "failed to send response");
                            metrics::record_query(QueryResult::Error, Duration::ZERO);
                        }
                    }
                }
            }
        }

        // Stop background tasks.
        worker_shutdown.cancel();
        let _ = metrics_handle.await;
        if let Some(task) = worker_handle {
            if let Err(e) = task.await {
                error!("Measurement worker error: {}", e);
            }
        }

        info!("DNS server stopped");
        Ok(())
    }
}
