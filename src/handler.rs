//! Per-datagram query handling.

use std::net::SocketAddr;
use tracing::{debug, trace, warn};

use crate::codec::{self, normalize_domain};
use crate::engine::ReplicaSelectionEngine;
use crate::metrics::{self, QueryResult, Timer};

/// Turns a query datagram into a response datagram for the served zone.
#[derive(Clone)]
pub struct QueryHandler {
    zone: String,
    ttl: u32,
    engine: ReplicaSelectionEngine,
}

impl QueryHandler {
    /// Create a handler answering for `zone`.
    pub fn new(zone: &str, ttl: u32, engine: ReplicaSelectionEngine) -> Self {
        Self {
            zone: normalize_domain(zone),
            ttl,
            engine,
        }
    }

    /// The zone this handler answers for.
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Handle one datagram from `src`.
    ///
    /// Returns the response to send, or `None` when the query is dropped
    /// (undecodable, or outside the served zone).
    pub async fn handle(&self, packet: &[u8], src: SocketAddr) -> Option<Vec<u8>> {
        let timer = Timer::start();

        let query = match codec::parse_query(packet) {
            Ok(query) => query,
            Err(e) => {
                debug!(%src, error = %e, "dropping undecodable query");
                metrics::record_query(QueryResult::Malformed, timer.elapsed());
                return None;
            }
        };

        if query.domain != self.zone {
            trace!(%src, domain = %query.domain, "dropping query outside zone");
            metrics::record_query(QueryResult::WrongZone, timer.elapsed());
            return None;
        }

        let (replica, source) = self.engine.select_with_source(src.ip()).await;

        match codec::build_response(query.id, &query.name, replica, self.ttl) {
            Ok(response) => {
                debug!(
                    %src,
                    id = query.id,
                    %replica,
                    source = source.as_str(),
                    "answering query"
                );
                metrics::record_query(QueryResult::Answered, timer.elapsed());
                Some(response)
            }
            Err(e) => {
                warn!(%src, id = query.id, error = %e, "failed to build response");
                metrics::record_query(QueryResult::Error, timer.elapsed());
                None
            }
        }
    }
}
