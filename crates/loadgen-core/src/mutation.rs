//! Mutation engine: random point insertions across the text working set.
//!
//! Every round picks a text file uniformly at random (with replacement),
//! starts again from the content recorded at collection time, inserts the
//! payload at `inserts_per_round` random positions, and writes the result
//! back with the engine's diffing text update. Rounds that hit the same file
//! do not build on each other: the document ends up holding the last round's
//! output for that file.

use crate::collector::FileRecord;
use crate::document::{Result, SharedDocument};
use rand::Rng;
use tracing::{error, info};

/// Literal inserted at each position.
pub const INSERT_PAYLOAD: &str = "foo";

/// Files touched per run when not configured.
pub const DEFAULT_ROUND_COUNT: usize = 1000;

/// Insertions per touched file when not configured.
pub const DEFAULT_INSERTS_PER_ROUND: usize = 100;

/// How much work one mutation phase does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationConfig {
    /// Number of files to touch, repetition allowed
    pub round_count: usize,
    /// Point insertions per touched file
    pub inserts_per_round: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            round_count: DEFAULT_ROUND_COUNT,
            inserts_per_round: DEFAULT_INSERTS_PER_ROUND,
        }
    }
}

/// Outcome of one mutation phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// Rounds issued (zero when the phase was skipped)
    pub rounds: usize,
    /// Rounds whose text update succeeded
    pub applied: usize,
    /// Rounds whose text update failed and were skipped
    pub failed: usize,
}

impl MutationReport {
    pub fn skipped(&self) -> bool {
        self.rounds == 0
    }
}

/// Insert the payload `inserts` times into `original`.
///
/// Each position is uniform over `[0, len)` of the string built so far, so
/// later insertions see the shifted coordinates of earlier ones. Positions
/// count characters; an empty string always inserts at 0.
pub fn insert_at_random<R: Rng + ?Sized>(original: &str, inserts: usize, rng: &mut R) -> String {
    let payload: Vec<char> = INSERT_PAYLOAD.chars().collect();
    let mut chars: Vec<char> = original.chars().collect();
    chars.reserve(inserts * payload.len());

    for _ in 0..inserts {
        let position = if chars.is_empty() {
            0
        } else {
            rng.random_range(0..chars.len())
        };
        chars.splice(position..position, payload.iter().copied());
    }

    chars.into_iter().collect()
}

/// Run `config.round_count` rounds over `text_files` inside one atomic change.
///
/// Skips the whole phase (no change is issued) when `text_files` is empty. A
/// failed text update is logged with the value currently at that key and the
/// batch moves on; only a failure of the change itself is returned.
pub fn run_mutation_phase<D, R>(
    doc: &D,
    text_files: &[&FileRecord],
    config: &MutationConfig,
    rng: &mut R,
) -> Result<MutationReport>
where
    D: SharedDocument + ?Sized,
    R: Rng + ?Sized,
{
    if text_files.is_empty() {
        info!("No text files to modify, skipping mutation phase");
        return Ok(MutationReport::default());
    }

    let mut report = MutationReport::default();

    doc.change(&mut |tx| {
        report = MutationReport::default();
        for _ in 0..config.round_count {
            let file = text_files[rng.random_range(0..text_files.len())];
            info!("Modifying file: {}", file.path);

            let original = file.content.as_deref().unwrap_or_default();
            let modified = insert_at_random(original, config.inserts_per_round, rng);

            report.rounds += 1;
            match tx.update_text(&file.path, &modified) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!(
                        "failed {} (current value: {:?}): {}",
                        file.path,
                        tx.get(&file.path),
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(())
    })?;

    info!(
        "Mutation phase done: {} round(s), {} applied, {} failed",
        report.rounds, report.applied, report.failed
    );
    Ok(report)
}
