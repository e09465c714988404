//! loadgen: Synthetic edit workload for a replicated document.
//!
//! Snapshots a directory into a Loro document, applies a burst of random text
//! insertions, and reports when a peer's advertised heads match the local
//! heads.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use loadgen::{Simulation, SimulationConfig};
use loadgen_core::PeerId;
use loadgen_core::mutation::{DEFAULT_INSERTS_PER_ROUND, DEFAULT_ROUND_COUNT, MutationConfig};

#[derive(Parser, Debug)]
#[command(name = "loadgen")]
#[command(about = "Synthetic edit workload for a replicated document")]
struct Args {
    /// Directory to snapshot into the document
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Number of files to modify (repetition allowed)
    #[arg(long, default_value_t = DEFAULT_ROUND_COUNT)]
    rounds: usize,

    /// Number of inserts per modified file
    #[arg(long, default_value_t = DEFAULT_INSERTS_PER_ROUND)]
    inserts: usize,

    /// Pause after the edits before listening for peer heads, in milliseconds
    #[arg(long, default_value_t = 100)]
    settle_ms: u64,

    /// Seed for reproducible file selection and insert positions
    #[arg(long)]
    seed: Option<u64>,

    /// Local peer ID as 16 hex chars (generated if not provided)
    #[arg(long)]
    peer_id: Option<PeerId>,

    /// Delay before the loopback peer applies each update, in milliseconds
    #[arg(long, default_value_t = 20)]
    peer_latency_ms: u64,

    /// Interval between peer head advertisements, in milliseconds (0 disables)
    #[arg(long, default_value_t = 1000)]
    gossip_ms: u64,

    /// Give up if no convergence is seen within this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> SimulationConfig {
        SimulationConfig {
            root: self.root.clone(),
            mutation: MutationConfig {
                round_count: self.rounds,
                inserts_per_round: self.inserts,
            },
            settle_delay: Duration::from_millis(self.settle_ms),
            seed: self.seed,
            peer_id: self.peer_id,
            peer_latency: Duration::from_millis(self.peer_latency_ms),
            gossip_interval: Duration::from_millis(self.gossip_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,loadgen=debug,loadgen_core=debug"
    } else {
        "info,loadgen=info,loadgen_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting loadgen");
    info!("Root path: {:?}", args.root);

    let mut simulation = Simulation::start(args.config()).await?;

    if let Some(secs) = args.timeout_secs {
        return match simulation.next_convergence(Some(Duration::from_secs(secs))).await {
            Some(signal) => {
                info!("Converged with peer {}", signal.storage_id);
                Ok(())
            }
            None => bail!("No convergence within {}s", secs),
        };
    }

    info!("Waiting for peer heads. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            Some(signal) = simulation.next_convergence(None) => {
                debug!(
                    "Convergence #{} with peer {} at {}",
                    simulation.signal_count(),
                    signal.storage_id,
                    signal.heads
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_in_code_constants() {
        let args = Args::parse_from(["loadgen"]);
        let config = args.config();
        assert_eq!(config.mutation, MutationConfig::default());
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.root, PathBuf::from("."));
        assert!(args.timeout_secs.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "loadgen",
            "--root",
            "/tmp/x",
            "--rounds",
            "5",
            "--inserts",
            "2",
            "--seed",
            "9",
            "--peer-id",
            "00000000000000aa",
            "--timeout-secs",
            "3",
        ]);
        let config = args.config();
        assert_eq!(config.root, PathBuf::from("/tmp/x"));
        assert_eq!(config.mutation.round_count, 5);
        assert_eq!(config.mutation.inserts_per_round, 2);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.peer_id, Some(PeerId::from(0xaa)));
    }

    #[test]
    fn test_rejects_bad_peer_id() {
        assert!(Args::try_parse_from(["loadgen", "--peer-id", "xyz"]).is_err());
    }
}
