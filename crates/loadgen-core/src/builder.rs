//! Document builder: seeds a fresh document with every collected record.

use crate::collector::FileRecord;
use crate::document::{Result, SharedDocument};
use tracing::info;

/// Counts from the build change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub text: usize,
    pub opaque: usize,
}

/// Write all records in one atomic change.
///
/// Text records store their content; binary records store the opaque marker.
pub fn build_document<D: SharedDocument + ?Sized>(
    doc: &D,
    records: &[FileRecord],
) -> Result<BuildReport> {
    let mut report = BuildReport::default();

    doc.change(&mut |tx| {
        report = BuildReport::default();
        for record in records {
            match &record.content {
                Some(content) => {
                    tx.put_text(&record.path, content)?;
                    report.text += 1;
                }
                None => {
                    tx.put_opaque(&record.path)?;
                    report.opaque += 1;
                }
            }
        }
        Ok(())
    })?;

    info!(
        "Built document {} with {} text and {} binary file(s)",
        doc.id(),
        report.text,
        report.opaque
    );
    Ok(report)
}
