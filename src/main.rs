//! proxy-runtime
//!
//! Runtime core of a reverse proxy: keeps clusters, destinations and routes
//! in line with a declarative config file, probes destination health, and
//! publishes the route table the serving layer dispatches from.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ loader / watcher ──▶ ConfigReconciler::apply
//!                                            │
//!            ┌───────────────────────────────┼───────────────────────────┐
//!            ▼                               ▼                           ▼
//!     ClusterState / DestinationState    RouteState          ActiveHealthCheckMonitor
//!     (AtomicSlot config + health)           │                  probers ── semaphore
//!            │                               ▼                           │
//!            ▼                      DynamicEndpointTable                 │
//!     ClusterDynamicState ◀──────── health change ◀──────────────────────┘
//!            │                        + ChangeToken
//!            ▼
//!     LoadBalancer policies ──▶ chosen destination (forwarder)
//! ```

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "proxy-runtime")]
#[command(about = "Reverse proxy runtime core", long_about = None)]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    proxy_runtime::lifecycle::run(&args.config).await?;
    Ok(())
}
