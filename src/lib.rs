//! replica-dns - A DNS responder that picks the best CDN replica per client.
//!
//! Every query for the served zone is answered with a single A record. The
//! address is the replica with the lowest measured round-trip time to the
//! client or, while no measurement exists, the replica geographically
//! closest to the client.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          replica-dns                             │
//! │                                                                  │
//! │  UDP :44444 ──▶ QueryHandler ──▶ ReplicaSelectionEngine          │
//! │                                     │         │                  │
//! │                         select_by_rtt│         │ no RTT data     │
//! │                                     ▼         ▼                  │
//! │                               ┌──────────┐  GeoSelector ──▶ geo  │
//! │                               │ RttTable │      │         lookup │
//! │                               └──────────┘      │                │
//! │                                     ▲           ▼                │
//! │                                     │   request_measurement      │
//! │                                     │           │                │
//! │                               MeasurementWorker ◀┘ (queue)       │
//! │                                     │                            │
//! │                                     └──▶ agent on each replica   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use replica_dns::{Config, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: Config = load_config();
//!     let shutdown = CancellationToken::new();
//!
//!     let server = DnsServer::new(config).unwrap();
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod codec;
pub mod config;
pub mod distance;
pub mod engine;
pub mod error;
pub mod geo;
pub mod handler;
pub mod measurement;
pub mod metrics;
pub mod rtt;
pub mod server;
pub mod telemetry;

// Re-export main types
pub use catalog::{Coordinate, ReplicaCatalog, ReplicaHost};
pub use config::{Config, DnsConfig, GeoConfig, MeasurementConfig, ReplicaConfig, TelemetryConfig};
pub use engine::{ReplicaSelectionEngine, SelectionSource};
pub use error::DnsError;
pub use geo::{GeoError, GeoSelector, Locator};
pub use measurement::{MeasurementHandle, RttProbe};
pub use rtt::RttTable;
pub use server::DnsServer;
