//! Simulation pipeline: collect, build, mutate, settle, then watch for
//! convergence.

use anyhow::{Context, Result};
use futures::StreamExt;
use futures::channel::mpsc::{self, UnboundedReceiver};
use loadgen_core::{
    BuildReport, ConvergenceSignal, ConvergenceWatcher, DocumentEngine, EventBus, LoroDocument,
    LoroEngine, MutationConfig, MutationReport, PeerId, SharedDocument, build_document, collect,
    run_mutation_phase, text_records,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::native_fs::NativeFs;
use crate::peer::{DEFAULT_GOSSIP_INTERVAL, DEFAULT_LATENCY, LoopbackPeer};

/// Pause after the mutation phase before listening for heads.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Directory snapshotted into the document
    pub root: PathBuf,
    pub mutation: MutationConfig,
    pub settle_delay: Duration,
    /// Seed for file selection and insertion positions; random when unset
    pub seed: Option<u64>,
    /// Local writer ID; generated when unset
    pub peer_id: Option<PeerId>,
    pub peer_latency: Duration,
    pub gossip_interval: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            mutation: MutationConfig::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            seed: None,
            peer_id: None,
            peer_latency: DEFAULT_LATENCY,
            gossip_interval: DEFAULT_GOSSIP_INTERVAL,
        }
    }
}

/// A run that has finished its edits and is listening for convergence.
pub struct Simulation {
    document: Arc<LoroDocument>,
    watcher: ConvergenceWatcher,
    signals: UnboundedReceiver<ConvergenceSignal>,
    peer: JoinHandle<()>,
    files: usize,
    build: BuildReport,
    mutation: MutationReport,
}

impl Simulation {
    /// Run every phase up to and including watcher registration.
    ///
    /// Filesystem and document errors abort the run.
    pub async fn start(config: SimulationConfig) -> Result<Self> {
        let fs = NativeFs::new(config.root.clone());
        let records = collect(&fs, "")
            .await
            .with_context(|| format!("Failed to collect files under {:?}", config.root))?;
        info!("Collected {} file(s) from {:?}", records.len(), config.root);

        let peer_id = config.peer_id.unwrap_or_else(PeerId::generate);
        let (outbound_tx, outbound_rx) = mpsc::unbounded();
        let engine = LoroEngine::new(peer_id).with_outbound(outbound_tx);
        let document = Arc::new(engine.create_document()?);
        info!("Local peer ID: {}", engine.peer_id());

        let bus = Arc::new(EventBus::new());
        let peer = LoopbackPeer::new(Arc::clone(&bus))
            .with_latency(config.peer_latency)
            .with_gossip_interval(config.gossip_interval);
        info!("Loopback peer storage ID: {}", peer.storage_id());
        let peer = tokio::spawn(peer.run(outbound_rx));

        let build = build_document(&*document, &records)
            .context("Failed to build document")?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mutation = run_mutation_phase(
            &*document,
            &text_records(&records),
            &config.mutation,
            &mut rng,
        )
        .context("Failed to apply mutations")?;

        if !mutation.skipped() {
            tokio::time::sleep(config.settle_delay).await;
        }

        let (watcher, signals) = ConvergenceWatcher::attach(&bus, Arc::clone(&document));

        info!("Simulation parameters:");
        info!("Number of files to modify: {}", config.mutation.round_count);
        info!("Number of inserts per file: {}", config.mutation.inserts_per_round);
        println!("{}", document.id().url());

        Ok(Self {
            document,
            watcher,
            signals,
            peer,
            files: records.len(),
            build,
            mutation,
        })
    }

    pub fn document(&self) -> &Arc<LoroDocument> {
        &self.document
    }

    /// Number of files collected.
    pub fn file_count(&self) -> usize {
        self.files
    }

    pub fn build_report(&self) -> BuildReport {
        self.build
    }

    pub fn mutation_report(&self) -> MutationReport {
        self.mutation
    }

    /// Convergence signals emitted so far.
    pub fn signal_count(&self) -> usize {
        self.watcher.signal_count()
    }

    /// Wait for the next convergence signal.
    ///
    /// Without a limit this waits as long as it takes. Returns `None` when the
    /// limit elapses first.
    pub async fn next_convergence(&mut self, limit: Option<Duration>) -> Option<ConvergenceSignal> {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.signals.next())
                .await
                .ok()
                .flatten(),
            None => self.signals.next().await,
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.peer.abort();
    }
}
