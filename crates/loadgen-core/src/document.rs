//! Shared document seam: the replicated key-value document the workload drives.
//!
//! The pipeline only talks to the traits in this module:
//! - `DocumentEngine` creates documents
//! - `SharedDocument` runs atomic changes and reports heads
//! - `Transaction` is the mutable view handed to a change
//!
//! Implementations:
//! - `LoroEngine` / `LoroDocument` - Loro CRDT; text values are `LoroText`
//!   containers, so `update_text` produces fine-grained diff operations
//! - `MemoryEngine` / `MemoryDocument` - For testing

use crate::heads::{ChangeId, Heads};
use crate::ids::{DocumentId, PeerId};
use futures::channel::mpsc::UnboundedSender;
use loro::{
    Container, ExportMode, LoroDoc, LoroMap, LoroText, LoroValue, UpdateOptions, ValueOrContainer,
    VersionVector,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Root map that holds one entry per collected file.
pub const FILES_ROOT: &str = "files";

/// Field set on the marker written in place of binary content.
pub const OPAQUE_MARKER_KEY: &str = "binary";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Loro error: {0}")]
    Loro(String),

    #[error("Value at {0} is not text")]
    NotText(String),

    #[error("No value at {0}")]
    MissingKey(String),

    #[error("Encode error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

fn loro_err(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Loro(e.to_string())
}

/// Engine-neutral read view of one document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    /// Text payload
    Text(String),
    /// The `{ binary: true }` marker
    Opaque,
    /// Anything else, rendered for diagnostics
    Other(String),
}

/// Mutable view of a document inside one atomic change.
pub trait Transaction {
    /// Write a text value at `key`, replacing whatever was there.
    fn put_text(&mut self, key: &str, content: &str) -> Result<()>;

    /// Write the opaque marker at `key`.
    fn put_opaque(&mut self, key: &str) -> Result<()>;

    /// Replace the text at `key` with `content` by diffing against the
    /// current value. Fails if the current value is not text.
    fn update_text(&mut self, key: &str, content: &str) -> Result<()>;

    /// Current value at `key`, including writes made earlier in this change.
    fn get(&self, key: &str) -> Option<FieldValue>;
}

/// Handle to one shared document.
pub trait SharedDocument: Send + Sync {
    fn id(&self) -> DocumentId;

    /// Run `mutator` as a single atomic change.
    ///
    /// If the mutator fails, none of its writes become visible or replicated.
    fn change(&self, mutator: &mut dyn FnMut(&mut dyn Transaction) -> Result<()>) -> Result<()>;

    /// Current local heads.
    fn heads(&self) -> Heads;

    /// Head-set equality as the engine defines it.
    fn heads_equal(&self, a: &Heads, b: &Heads) -> bool {
        a == b
    }

    /// All committed fields.
    fn snapshot(&self) -> BTreeMap<String, FieldValue>;
}

/// Creates shared documents.
pub trait DocumentEngine {
    type Document: SharedDocument;

    fn create_document(&self) -> Result<Self::Document>;
}

// ============================================================================
// Loro implementation
// ============================================================================

/// Update blob produced by one committed change, bound for remote replicas.
#[derive(Debug, Clone)]
pub struct OutboundUpdate {
    pub document: DocumentId,
    pub bytes: Vec<u8>,
}

/// Creates Loro-backed documents that all write under one peer ID.
pub struct LoroEngine {
    peer_id: PeerId,
    outbound: Option<UnboundedSender<OutboundUpdate>>,
}

impl LoroEngine {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            outbound: None,
        }
    }

    /// Forward every committed change of documents created from now on.
    pub fn with_outbound(mut self, outbound: UnboundedSender<OutboundUpdate>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

impl DocumentEngine for LoroEngine {
    type Document = LoroDocument;

    fn create_document(&self) -> Result<LoroDocument> {
        let doc = LoroDoc::new();
        // Set peer ID before any operations for consistent version vectors
        doc.set_peer_id(self.peer_id.as_u64()).map_err(loro_err)?;

        let id = DocumentId::generate();
        debug!("Created document {} for peer {}", id, self.peer_id);

        Ok(LoroDocument {
            id,
            doc,
            last_sent: Mutex::new(VersionVector::default()),
            outbound: self.outbound.clone(),
        })
    }
}

/// A shared document backed by a `LoroDoc`.
///
/// Fields live in the `files` root map.
pub struct LoroDocument {
    id: DocumentId,
    doc: LoroDoc,
    /// Version already forwarded on `outbound`
    last_sent: Mutex<VersionVector>,
    outbound: Option<UnboundedSender<OutboundUpdate>>,
}

impl LoroDocument {
    fn files(&self) -> LoroMap {
        self.doc.get_map(FILES_ROOT)
    }

    /// Send everything committed since `last_sent` to the outbound channel.
    fn forward_updates(&self, last_sent: &mut VersionVector) -> Result<()> {
        let Some(outbound) = &self.outbound else {
            return Ok(());
        };

        let bytes = self
            .doc
            .export(ExportMode::updates(last_sent))
            .map_err(|e| DocumentError::Encode(e.to_string()))?;
        *last_sent = self.doc.oplog_vv();

        let update = OutboundUpdate {
            document: self.id,
            bytes,
        };
        if outbound.unbounded_send(update).is_err() {
            debug!("Outbound channel closed, update for {} dropped", self.id);
        }
        Ok(())
    }
}

impl SharedDocument for LoroDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn change(&self, mutator: &mut dyn FnMut(&mut dyn Transaction) -> Result<()>) -> Result<()> {
        // Held for the whole change so concurrent changes never share counters
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());

        // Writes land on a fork and reach the live doc only when the mutator succeeds
        let before = self.doc.oplog_vv();
        let staged = self.doc.fork();
        staged.set_peer_id(self.doc.peer_id()).map_err(loro_err)?;
        let mut tx = LoroTransaction {
            files: staged.get_map(FILES_ROOT),
        };
        mutator(&mut tx)?;
        staged.commit();

        if staged.oplog_vv() == before {
            return Ok(());
        }
        let bytes = staged
            .export(ExportMode::updates(&before))
            .map_err(|e| DocumentError::Encode(e.to_string()))?;
        self.doc.import(&bytes).map_err(loro_err)?;
        self.forward_updates(&mut last_sent)
    }

    fn heads(&self) -> Heads {
        Heads::from(&self.doc.state_frontiers())
    }

    fn snapshot(&self) -> BTreeMap<String, FieldValue> {
        match self.files().get_deep_value() {
            LoroValue::Map(map) => map
                .iter()
                .map(|(key, value)| (key.clone(), field_from_loro(value)))
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

struct LoroTransaction {
    files: LoroMap,
}

impl Transaction for LoroTransaction {
    fn put_text(&mut self, key: &str, content: &str) -> Result<()> {
        let text = self
            .files
            .insert_container(key, LoroText::new())
            .map_err(loro_err)?;
        if !content.is_empty() {
            text.insert(0, content).map_err(loro_err)?;
        }
        Ok(())
    }

    fn put_opaque(&mut self, key: &str) -> Result<()> {
        let marker = self
            .files
            .insert_container(key, LoroMap::new())
            .map_err(loro_err)?;
        marker.insert(OPAQUE_MARKER_KEY, true).map_err(loro_err)?;
        Ok(())
    }

    fn update_text(&mut self, key: &str, content: &str) -> Result<()> {
        match self.files.get(key) {
            Some(ValueOrContainer::Container(Container::Text(text))) => text
                .update(content, UpdateOptions::default())
                .map_err(|e| DocumentError::Loro(format!("{:?}", e))),
            Some(_) => Err(DocumentError::NotText(key.to_string())),
            None => Err(DocumentError::MissingKey(key.to_string())),
        }
    }

    fn get(&self, key: &str) -> Option<FieldValue> {
        match self.files.get_deep_value() {
            LoroValue::Map(map) => map.get(key).map(field_from_loro),
            _ => None,
        }
    }
}

/// Convert a deep Loro value into the engine-neutral view
fn field_from_loro(value: &LoroValue) -> FieldValue {
    match value {
        LoroValue::String(s) => FieldValue::Text(s.to_string()),
        LoroValue::Map(map) if is_opaque_marker(map.get(OPAQUE_MARKER_KEY)) => FieldValue::Opaque,
        other => FieldValue::Other(format!("{:?}", other)),
    }
}

fn is_opaque_marker(flag: Option<&LoroValue>) -> bool {
    matches!(flag, Some(LoroValue::Bool(true)))
}

// ============================================================================
// In-memory implementation (for testing)
// ============================================================================

/// Creates `MemoryDocument`s.
pub struct MemoryEngine {
    peer_id: PeerId,
}

impl MemoryEngine {
    pub fn new(peer_id: PeerId) -> Self {
        Self { peer_id }
    }
}

impl DocumentEngine for MemoryEngine {
    type Document = MemoryDocument;

    fn create_document(&self) -> Result<MemoryDocument> {
        Ok(MemoryDocument::new(self.peer_id))
    }
}

/// In-memory document for testing.
///
/// Changes run against a staged copy that replaces the committed state only
/// when the mutator succeeds. Each committed change becomes the single head
/// `(peer, change_count - 1)`.
pub struct MemoryDocument {
    id: DocumentId,
    peer_id: PeerId,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    fields: BTreeMap<String, FieldValue>,
    changes: i32,
}

impl MemoryDocument {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            id: DocumentId::generate(),
            peer_id,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Number of committed changes.
    pub fn change_count(&self) -> usize {
        self.state.lock().unwrap().changes as usize
    }
}

impl SharedDocument for MemoryDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn change(&self, mutator: &mut dyn FnMut(&mut dyn Transaction) -> Result<()>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let mut tx = MemoryTransaction {
            fields: state.fields.clone(),
        };
        mutator(&mut tx)?;
        state.fields = tx.fields;
        state.changes += 1;
        Ok(())
    }

    fn heads(&self) -> Heads {
        let state = self.state.lock().unwrap();
        if state.changes == 0 {
            return Heads::new();
        }
        [ChangeId::new(self.peer_id.as_u64(), state.changes - 1)]
            .into_iter()
            .collect()
    }

    fn snapshot(&self) -> BTreeMap<String, FieldValue> {
        self.state.lock().unwrap().fields.clone()
    }
}

struct MemoryTransaction {
    fields: BTreeMap<String, FieldValue>,
}

impl Transaction for MemoryTransaction {
    fn put_text(&mut self, key: &str, content: &str) -> Result<()> {
        self.fields
            .insert(key.to_string(), FieldValue::Text(content.to_string()));
        Ok(())
    }

    fn put_opaque(&mut self, key: &str) -> Result<()> {
        self.fields.insert(key.to_string(), FieldValue::Opaque);
        Ok(())
    }

    fn update_text(&mut self, key: &str, content: &str) -> Result<()> {
        match self.fields.get_mut(key) {
            Some(FieldValue::Text(text)) => {
                *text = content.to_string();
                Ok(())
            }
            Some(_) => Err(DocumentError::NotText(key.to_string())),
            None => Err(DocumentError::MissingKey(key.to_string())),
        }
    }

    fn get(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn loro_document() -> LoroDocument {
        LoroEngine::new(PeerId::from(1)).create_document().unwrap()
    }

    #[test]
    fn test_loro_put_and_snapshot() {
        let doc = loro_document();
        doc.change(&mut |tx| {
            tx.put_text("a.txt", "hello")?;
            tx.put_opaque("b.bin")?;
            tx.put_text("empty.txt", "")
        })
        .unwrap();

        let snapshot = doc.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot["a.txt"], FieldValue::Text("hello".into()));
        assert_eq!(snapshot["b.bin"], FieldValue::Opaque);
        assert_eq!(snapshot["empty.txt"], FieldValue::Text(String::new()));
    }

    #[test]
    fn test_loro_update_text_diffs_in_place() {
        let doc = loro_document();
        doc.change(&mut |tx| tx.put_text("a.txt", "hello world"))
            .unwrap();
        doc.change(&mut |tx| tx.update_text("a.txt", "hello brave world"))
            .unwrap();

        assert_eq!(
            doc.snapshot()["a.txt"],
            FieldValue::Text("hello brave world".into())
        );
    }

    #[test]
    fn test_loro_update_text_rejects_opaque() {
        let doc = loro_document();
        doc.change(&mut |tx| tx.put_opaque("b.bin")).unwrap();

        let mut result = None;
        doc.change(&mut |tx| {
            result = Some(tx.update_text("b.bin", "text"));
            Ok(())
        })
        .unwrap();

        assert!(matches!(result, Some(Err(DocumentError::NotText(_)))));
        assert_eq!(doc.snapshot()["b.bin"], FieldValue::Opaque);
    }

    #[test]
    fn test_loro_update_text_missing_key() {
        let doc = loro_document();
        let err = doc
            .change(&mut |tx| tx.update_text("nope", "x"))
            .unwrap_err();
        assert!(matches!(err, DocumentError::MissingKey(_)));
        assert!(doc.snapshot().is_empty());
        assert!(doc.heads().is_empty());
    }

    #[test]
    fn test_loro_failed_change_leaves_no_trace() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded();
        let doc = LoroEngine::new(PeerId::from(1))
            .with_outbound(tx)
            .create_document()
            .unwrap();
        doc.change(&mut |tx| tx.put_text("a.txt", "hello")).unwrap();
        let heads = doc.heads();

        let err = doc.change(&mut |tx| {
            tx.put_text("staged.txt", "leak")?;
            tx.update_text("missing", "x")
        });
        assert!(matches!(err, Err(DocumentError::MissingKey(_))));
        assert!(!doc.snapshot().contains_key("staged.txt"));
        assert_eq!(doc.heads(), heads);

        doc.change(&mut |tx| tx.put_text("ok.txt", "fine")).unwrap();

        let replica = LoroDoc::new();
        for _ in 0..2 {
            let update = futures::executor::block_on(rx.next()).unwrap();
            replica.import(&update.bytes).unwrap();
        }
        assert!(rx.try_next().is_err(), "failed change sent nothing");

        let LoroValue::Map(map) = replica.get_map(FILES_ROOT).get_deep_value() else {
            panic!("expected map");
        };
        assert!(map.get("ok.txt").is_some());
        assert!(map.get("staged.txt").is_none());
        assert_eq!(Heads::from(&replica.state_frontiers()), doc.heads());
    }

    #[test]
    fn test_loro_changes_keep_local_peer_id() {
        let doc = loro_document();
        doc.change(&mut |tx| tx.put_text("a.txt", "x")).unwrap();
        doc.change(&mut |tx| tx.update_text("a.txt", "xy")).unwrap();
        assert!(doc.heads().iter().all(|id| id.peer == 1));
    }

    #[test]
    fn test_loro_get_sees_pending_writes() {
        let doc = loro_document();
        doc.change(&mut |tx| {
            tx.put_text("a.txt", "pending")?;
            assert_eq!(tx.get("a.txt"), Some(FieldValue::Text("pending".into())));
            assert_eq!(tx.get("missing"), None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_loro_heads_advance_per_change() {
        let doc = loro_document();
        assert!(doc.heads().is_empty());

        doc.change(&mut |tx| tx.put_text("a.txt", "x")).unwrap();
        let first = doc.heads();
        doc.change(&mut |tx| tx.update_text("a.txt", "xy")).unwrap();
        let second = doc.heads();

        assert_eq!(first.len(), 1);
        assert!(!doc.heads_equal(&first, &second));
        assert!(doc.heads_equal(&second, &doc.heads()));
    }

    #[test]
    fn test_loro_outbound_updates_replicate() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded();
        let engine = LoroEngine::new(PeerId::from(1)).with_outbound(tx);
        let doc = engine.create_document().unwrap();

        doc.change(&mut |tx| tx.put_text("a.txt", "hello")).unwrap();
        doc.change(&mut |tx| tx.update_text("a.txt", "hello!")).unwrap();

        let replica = LoroDoc::new();
        for _ in 0..2 {
            let update = futures::executor::block_on(rx.next()).unwrap();
            assert_eq!(update.document, doc.id());
            replica.import(&update.bytes).unwrap();
        }

        assert_eq!(Heads::from(&replica.state_frontiers()), doc.heads());
        let value = replica.get_map(FILES_ROOT).get_deep_value();
        let LoroValue::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(
            field_from_loro(map.get("a.txt").unwrap()),
            FieldValue::Text("hello!".into())
        );
    }

    #[test]
    fn test_memory_change_is_atomic() {
        let doc = MemoryDocument::new(PeerId::from(9));
        doc.change(&mut |tx| tx.put_text("a.txt", "hello")).unwrap();

        let err = doc.change(&mut |tx| {
            tx.put_text("b.txt", "staged")?;
            tx.update_text("missing", "boom")
        });

        assert!(err.is_err());
        let snapshot = doc.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.contains_key("b.txt"));
        assert_eq!(doc.change_count(), 1);
    }

    #[test]
    fn test_memory_heads_track_changes() {
        let doc = MemoryEngine::new(PeerId::from(9)).create_document().unwrap();
        assert!(doc.heads().is_empty());
        doc.change(&mut |tx| tx.put_opaque("x")).unwrap();
        doc.change(&mut |tx| tx.put_opaque("y")).unwrap();
        let expected: Heads = [ChangeId::new(9, 1)].into_iter().collect();
        assert_eq!(doc.heads(), expected);
    }

    #[test]
    fn test_field_value_serialization() {
        let json = serde_json::to_string(&FieldValue::Text("hi".into())).unwrap();
        assert_eq!(json, r#"{"kind":"text","value":"hi"}"#);
        let json = serde_json::to_string(&FieldValue::Opaque).unwrap();
        assert_eq!(json, r#"{"kind":"opaque"}"#);
    }
}
