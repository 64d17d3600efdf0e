//! Active RTT measurement.
//!
//! The query path only ever calls [`MeasurementHandle::request_measurement`],
//! which enqueues the client without waiting. A [`MeasurementWorker`] drains
//! the queue on its own task, probes every replica and writes the results
//! into the shared [`RttTable`].

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{ReplicaCatalog, ReplicaHost};
use crate::config::MeasurementConfig;
use crate::metrics::{self, MeasurementRequestOutcome};
use crate::rtt::RttTable;

/// Probe error types.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe did not complete in time.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    /// Could not reach the measurement agent.
    #[error("network error: {0}")]
    Network(String),
    /// The agent answered with something that is not a positive RTT.
    #[error("invalid agent reply: {0}")]
    InvalidReply(String),
}

/// Measures the RTT between a replica and a client.
#[async_trait]
pub trait RttProbe: Send + Sync {
    /// Measure the round trip from `replica` to `client`.
    async fn measure(&self, replica: &ReplicaHost, client: IpAddr) -> Result<Duration, ProbeError>;
}

/// Longest agent reply accepted, newline included.
const MAX_REPLY_LEN: u64 = 64;

/// Probe that asks the measurement agent running on each replica.
///
/// The agent listens on TCP; it receives the client address followed by a
/// newline and answers with one line holding the RTT in milliseconds.
#[derive(Debug, Clone)]
pub struct AgentProbe {
    port: u16,
    timeout: Duration,
}

impl AgentProbe {
    /// Create a probe for agents listening on `port`.
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Create a probe from configuration.
    pub fn from_config(config: &MeasurementConfig) -> Self {
        Self::new(config.agent_port, config.probe_timeout())
    }

    async fn exchange(addr: SocketAddr, client: IpAddr) -> Result<Duration, ProbeError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProbeError::Network(format!("connect to {}: {}", addr, e)))?;

        stream
            .write_all(format!("{}\n", client).as_bytes())
            .await
            .map_err(|e| ProbeError::Network(format!("write to {}: {}", addr, e)))?;

        let mut line = String::new();
        BufReader::new(stream.take(MAX_REPLY_LEN))
            .read_line(&mut line)
            .await
            .map_err(|e| ProbeError::Network(format!("read from {}: {}", addr, e)))?;

        if line.len() as u64 >= MAX_REPLY_LEN && !line.ends_with('\n') {
            return Err(ProbeError::InvalidReply(format!(
                "reply longer than {} bytes",
                MAX_REPLY_LEN
            )));
        }

        parse_rtt_reply(&line)
    }
}

#[async_trait]
impl RttProbe for AgentProbe {
    async fn measure(&self, replica: &ReplicaHost, client: IpAddr) -> Result<Duration, ProbeError> {
        let addr = SocketAddr::new(IpAddr::V4(replica.ip), self.port);
        tokio::time::timeout(self.timeout, Self::exchange(addr, client))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
    }
}

/// Parse an agent reply (milliseconds, decimal) into a positive RTT.
pub fn parse_rtt_reply(line: &str) -> Result<Duration, ProbeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::InvalidReply("empty reply".to_string()));
    }

    let ms: f64 = trimmed
        .parse()
        .map_err(|_| ProbeError::InvalidReply(trimmed.to_string()))?;

    if !ms.is_finite() || ms <= 0.0 {
        return Err(ProbeError::InvalidReply(trimmed.to_string()));
    }

    Ok(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
}

/// Clients queued or currently being measured.
type PendingSet = Arc<Mutex<HashSet<IpAddr>>>;

/// Sending side of the measurement queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MeasurementHandle {
    tx: Option<mpsc::Sender<IpAddr>>,
    pending: PendingSet,
}

/// Receiving side of the measurement queue.
#[derive(Debug)]
pub struct MeasurementQueue {
    rx: mpsc::Receiver<IpAddr>,
    pending: PendingSet,
}

impl MeasurementHandle {
    /// Create a bounded queue holding at most `capacity` pending clients.
    pub fn channel(capacity: usize) -> (Self, MeasurementQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        let pending = PendingSet::default();
        (
            Self {
                tx: Some(tx),
                pending: pending.clone(),
            },
            MeasurementQueue { rx, pending },
        )
    }

    /// A handle that discards every request.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            pending: PendingSet::default(),
        }
    }

    /// Ask for `client` to be measured. Never blocks and never fails; a
    /// request that cannot be queued is logged and dropped.
    pub fn request_measurement(&self, client: IpAddr) {
        let Some(ref tx) = self.tx else {
            metrics::record_measurement_request(MeasurementRequestOutcome::Disabled);
            return;
        };

        if !self.pending.lock().insert(client) {
            debug!(%client, "measurement already pending");
            metrics::record_measurement_request(MeasurementRequestOutcome::Coalesced);
            return;
        }

        match tx.try_send(client) {
            Ok(()) => {
                debug!(%client, "measurement requested");
                metrics::record_measurement_request(MeasurementRequestOutcome::Queued);
            }
            Err(TrySendError::Full(_)) => {
                self.pending.lock().remove(&client);
                warn!(%client, "measurement queue full, dropping request");
                metrics::record_measurement_request(MeasurementRequestOutcome::QueueFull);
            }
            Err(TrySendError::Closed(_)) => {
                self.pending.lock().remove(&client);
                warn!(%client, "measurement worker gone, dropping request");
                metrics::record_measurement_request(MeasurementRequestOutcome::Closed);
            }
        }
    }

    /// Number of clients queued or being measured.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl MeasurementQueue {
    /// Wait for the next client. `None` once every handle is dropped.
    pub async fn next(&mut self) -> Option<IpAddr> {
        self.rx.recv().await
    }

    /// Take the next client if one is already queued.
    pub fn try_next(&mut self) -> Option<IpAddr> {
        self.rx.try_recv().ok()
    }

    /// Mark `client` as done so later requests queue it again.
    pub fn complete(&self, client: IpAddr) {
        self.pending.lock().remove(&client);
    }
}

/// Drains the measurement queue and fills the RTT table.
pub struct MeasurementWorker {
    queue: MeasurementQueue,
    probe: Arc<dyn RttProbe>,
    catalog: Arc<ReplicaCatalog>,
    table: RttTable,
}

impl MeasurementWorker {
    /// Create a worker probing every replica in `catalog`.
    pub fn new(
        queue: MeasurementQueue,
        probe: Arc<dyn RttProbe>,
        catalog: Arc<ReplicaCatalog>,
        table: RttTable,
    ) -> Self {
        Self {
            queue,
            probe,
            catalog,
            table,
        }
    }

    /// Process requests until cancelled or the queue closes.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(replicas = self.catalog.len(), "measurement worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("measurement worker shutting down");
                    return;
                }
                next = self.queue.next() => match next {
                    Some(client) => {
                        self.measure_client(client).await;
                    }
                    None => {
                        debug!("measurement queue closed");
                        return;
                    }
                }
            }
        }
    }

    /// Probe every replica for `client` concurrently and record the samples.
    /// Returns how many samples were stored.
    pub async fn measure_client(&self, client: IpAddr) -> usize {
        let probe = &self.probe;
        let results = join_all(self.catalog.hosts().iter().map(|host| async move {
            let timer = metrics::Timer::start();
            let result = probe.measure(host, client).await;
            metrics::record_probe(result.is_ok(), timer.elapsed());
            (host, result)
        }))
        .await;

        let mut recorded = 0;
        for (host, result) in results {
            match result {
                Ok(rtt) => {
                    if self.table.record(host.ip, client, rtt) {
                        recorded += 1;
                    }
                }
                Err(e) => {
                    warn!(%client, replica = %host.name, error = %e, "RTT probe failed");
                }
            }
        }

        self.queue.complete(client);
        debug!(%client, recorded, "measurement round complete");
        recorded
    }
}
