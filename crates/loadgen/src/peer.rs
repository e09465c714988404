//! Loopback replica peer.
//!
//! Stands in for a remote sync peer: it consumes the local engine's outbound
//! update stream, imports each update into its own Loro replica, and
//! advertises the replica's heads on the event bus. Heads are advertised after
//! every import and again on every gossip tick, so a listener that subscribes
//! late still hears the current state.

use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use loadgen_core::{DocumentId, EventBus, Heads, OutboundUpdate, RemoteHeads, StorageId};
use loro::LoroDoc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Delay before an update is applied when not configured.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(20);

/// Period between unsolicited head advertisements when not configured.
pub const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_secs(1);

/// In-process replica that gossips its heads.
pub struct LoopbackPeer {
    storage_id: StorageId,
    /// One replica per document seen on the update stream
    replicas: HashMap<DocumentId, LoroDoc>,
    bus: Arc<EventBus>,
    latency: Duration,
    gossip_interval: Duration,
}

impl LoopbackPeer {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            storage_id: StorageId::generate(),
            replicas: HashMap::new(),
            bus,
            latency: DEFAULT_LATENCY,
            gossip_interval: DEFAULT_GOSSIP_INTERVAL,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Zero disables periodic gossip.
    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    pub fn storage_id(&self) -> &StorageId {
        &self.storage_id
    }

    /// Heads of the replica for `document`, if any update for it arrived.
    pub fn heads(&self, document: &DocumentId) -> Option<Heads> {
        self.replicas
            .get(document)
            .map(|replica| Heads::from(&replica.state_frontiers()))
    }

    /// Import one update and advertise the resulting heads.
    pub fn apply(&mut self, update: &OutboundUpdate) {
        let replica = self
            .replicas
            .entry(update.document)
            .or_insert_with(LoroDoc::new);
        match replica.import(&update.bytes) {
            Ok(_) => {
                debug!(
                    "Peer {} imported {} byte(s) for {}",
                    self.storage_id,
                    update.bytes.len(),
                    update.document
                );
                self.advertise(&update.document);
            }
            Err(e) => warn!(
                "Peer {} failed to import update for {}: {}",
                self.storage_id, update.document, e
            ),
        }
    }

    fn advertise(&self, document: &DocumentId) {
        if let Some(heads) = self.heads(document) {
            self.bus.emit(&RemoteHeads {
                storage_id: self.storage_id.clone(),
                heads,
            });
        }
    }

    fn gossip(&self) {
        for document in self.replicas.keys() {
            self.advertise(document);
        }
    }

    /// Consume `updates` until the stream ends.
    pub async fn run(mut self, mut updates: UnboundedReceiver<OutboundUpdate>) {
        let mut gossip = if self.gossip_interval.is_zero() {
            None
        } else {
            let mut interval = time::interval(self.gossip_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        };

        loop {
            tokio::select! {
                update = updates.next() => {
                    let Some(update) = update else {
                        debug!("Update stream closed, peer {} stopping", self.storage_id);
                        break;
                    };
                    if !self.latency.is_zero() {
                        time::sleep(self.latency).await;
                    }
                    self.apply(&update);
                }

                _ = next_tick(&mut gossip) => {
                    self.gossip();
                }
            }
        }
    }
}

// Never resolves when gossip is disabled
async fn next_tick(gossip: &mut Option<Interval>) {
    match gossip {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use loadgen_core::{DocumentEngine, LoroEngine, PeerId, SharedDocument, Subscription};
    use std::sync::Mutex;

    type Recording = (Arc<EventBus>, Arc<Mutex<Vec<RemoteHeads>>>, Subscription);

    fn recording_bus() -> Recording {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sub = bus.subscribe(move |event| seen_clone.lock().unwrap().push(event.clone()));
        (bus, seen, sub)
    }

    #[test]
    fn test_apply_advertises_replica_heads() {
        let (tx, mut rx) = mpsc::unbounded();
        let doc = LoroEngine::new(PeerId::from(1))
            .with_outbound(tx)
            .create_document()
            .unwrap();
        doc.change(&mut |t| t.put_text("a.txt", "hello")).unwrap();

        let (bus, seen, _sub) = recording_bus();
        let mut peer = LoopbackPeer::new(bus);
        let update = rx.try_next().unwrap().unwrap();
        peer.apply(&update);

        assert_eq!(peer.heads(&doc.id()), Some(doc.heads()));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0].storage_id, peer.storage_id());
        assert_eq!(seen[0].heads, doc.heads());
    }

    #[test]
    fn test_corrupt_update_is_not_advertised() {
        let (bus, seen, _sub) = recording_bus();
        let mut peer = LoopbackPeer::new(bus);
        peer.apply(&OutboundUpdate {
            document: DocumentId::generate(),
            bytes: vec![1, 2, 3],
        });
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_replicates_and_gossips() {
        let (tx, rx) = mpsc::unbounded();
        let doc = LoroEngine::new(PeerId::from(1))
            .with_outbound(tx)
            .create_document()
            .unwrap();
        doc.change(&mut |t| t.put_text("a.txt", "hello")).unwrap();

        let (bus, seen, _sub) = recording_bus();
        let peer = LoopbackPeer::new(bus)
            .with_latency(Duration::ZERO)
            .with_gossip_interval(Duration::from_millis(10));
        let task = tokio::spawn(peer.run(rx));

        time::sleep(Duration::from_millis(100)).await;
        task.abort();

        let seen = seen.lock().unwrap();
        // One advertisement for the import plus gossip ticks
        assert!(seen.len() >= 2, "got {} advertisement(s)", seen.len());
        assert!(seen.iter().all(|event| event.heads == doc.heads()));
    }

    #[tokio::test]
    async fn test_run_stops_when_stream_closes() {
        let (tx, rx) = mpsc::unbounded::<OutboundUpdate>();
        let (bus, _seen, _sub) = recording_bus();
        let task = tokio::spawn(LoopbackPeer::new(bus).run(rx));
        drop(tx);
        time::timeout(Duration::from_secs(1), task)
            .await
            .expect("peer should stop")
            .unwrap();
    }
}
