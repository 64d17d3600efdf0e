//! replica-dns binary entry point.

use clap::Parser;
use replica_dns::{telemetry, Config, DnsServer};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// DNS responder that answers with the best CDN replica for each client.
#[derive(Parser, Debug)]
#[command(name = "replica-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "replica-dns.toml")]
    config: PathBuf,

    /// UDP port to listen on (overrides dns.listen_addr's port).
    #[arg(short, long)]
    port: Option<u16>,

    /// Zone to answer for (overrides dns.zone).
    #[arg(short, long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;

    if let Some(port) = args.port {
        config.dns.listen_addr.set_port(port);
    }
    if let Some(name) = args.name {
        config.dns.zone = name;
    }
    config.validate()?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.dns.listen_addr,
        zone = %config.dns.zone,
        replicas = config.dns.replicas.len(),
        "Starting replica-dns"
    );

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    // Run DNS server
    let server = DnsServer::new(config)?;
    let result = server.run(shutdown).await;

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("replica-dns shutdown complete");
    Ok(())
}
