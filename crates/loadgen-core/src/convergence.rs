//! Convergence watcher: matches peer head advertisements against local heads.

use crate::document::SharedDocument;
use crate::events::{EventBus, RemoteHeads, Subscription};
use crate::heads::Heads;
use crate::ids::StorageId;
use futures::channel::mpsc::{self, UnboundedReceiver};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Emitted once for every advertisement whose heads equal the local heads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceSignal {
    pub storage_id: StorageId,
    pub heads: Heads,
}

/// Passive listener that reports every advertisement matching the document.
///
/// Stays subscribed for as long as it is alive and never deduplicates: two
/// matching advertisements yield two signals.
pub struct ConvergenceWatcher {
    signals: Arc<AtomicUsize>,
    _subscription: Subscription,
}

impl ConvergenceWatcher {
    /// Subscribe to `bus` and compare each advertisement with `doc`'s heads.
    ///
    /// Returns the watcher and a stream carrying one item per signal.
    pub fn attach<D>(
        bus: &Arc<EventBus>,
        doc: Arc<D>,
    ) -> (Self, UnboundedReceiver<ConvergenceSignal>)
    where
        D: SharedDocument + ?Sized + 'static,
    {
        let (tx, rx) = mpsc::unbounded();
        let signals = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&signals);

        let subscription = bus.subscribe(move |event: &RemoteHeads| {
            let local = doc.heads();
            if !doc.heads_equal(&local, &event.heads) {
                debug!(
                    "Peer {} at {}, local at {}",
                    event.storage_id, event.heads, local
                );
                return;
            }

            info!("done sync");
            debug!("Peer {} converged at {}", event.storage_id, local);
            counter.fetch_add(1, Ordering::Relaxed);
            // Receiver may already be dropped
            let _ = tx.unbounded_send(ConvergenceSignal {
                storage_id: event.storage_id.clone(),
                heads: local,
            });
        });

        let watcher = Self {
            signals,
            _subscription: subscription,
        };
        (watcher, rx)
    }

    /// Signals emitted so far.
    pub fn signal_count(&self) -> usize {
        self.signals.load(Ordering::Relaxed)
    }
}
