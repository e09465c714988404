//! loadgen-core: Workload generation and convergence detection for a
//! replicated-document sync engine.
//!
//! This crate provides:
//! - A tree collector that flattens a directory into keyed file records
//! - A document builder and a randomized text-mutation engine
//! - A convergence watcher driven by peer head advertisements
//! - FileSystem and SharedDocument trait abstractions (Loro-backed and in-memory)

pub mod builder;
pub mod classify;
pub mod collector;
pub mod convergence;
pub mod document;
pub mod events;
pub mod fs;
pub mod heads;
pub mod ids;
pub mod mutation;

pub use builder::{BuildReport, build_document};
pub use classify::Content;
pub use collector::{CollectError, FileRecord, collect, text_records};
pub use convergence::{ConvergenceSignal, ConvergenceWatcher};
pub use document::{
    DocumentEngine, DocumentError, FieldValue, LoroDocument, LoroEngine, MemoryDocument,
    MemoryEngine, OutboundUpdate, SharedDocument, Transaction,
};
pub use events::{EventBus, RemoteHeads, Subscription};
pub use fs::{FileEntry, FileStat, FileSystem, FsError, InMemoryFs};
pub use heads::{ChangeId, Heads};
pub use ids::{DocumentId, PeerId, PeerIdError, StorageId};
pub use mutation::{MutationConfig, MutationReport, insert_at_random, run_mutation_phase};
