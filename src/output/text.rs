//! Plain-text report.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::duplicates::ScanResult;

/// Human-readable report of a scan.
pub struct TextOutput<'a> {
    result: &'a ScanResult,
}

impl<'a> TextOutput<'a> {
    /// Create a report for `result`.
    #[must_use]
    pub fn new(result: &'a ScanResult) -> Self {
        Self { result }
    }

    /// Write the groups followed by a summary.
    ///
    /// The representative of each group is marked with `*`.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let result = self.result;

        for (i, group) in result.groups.values().enumerate() {
            writeln!(
                writer,
                "Group {} ({} files, {} reclaimable)",
                i + 1,
                group.len(),
                ByteSize::b(group.reclaimable_bytes())
            )?;
            for file in group.files() {
                let marker = if file.path == group.representative.path {
                    '*'
                } else {
                    ' '
                };
                writeln!(
                    writer,
                    "  {} {} ({})",
                    marker,
                    file.path.display(),
                    ByteSize::b(file.size_bytes)
                )?;
            }
            writeln!(writer)?;
        }

        if result.groups.is_empty() {
            writeln!(writer, "No near-duplicate images found.")?;
        }

        writeln!(
            writer,
            "Scanned {} images ({} hashed, {} failed, {} roots skipped) in {:.2?}",
            result.total_files,
            result.hashes_computed,
            result.failed_files,
            result.skipped_roots,
            result.elapsed
        )?;
        if let Some(strategy) = result.strategy {
            writeln!(
                writer,
                "Strategy {} with max distance {} ({} comparisons)",
                strategy, result.max_distance, result.comparisons
            )?;
        }
        writeln!(
            writer,
            "{} groups, {} duplicate files, {} reclaimable",
            result.group_count(),
            result.duplicate_files(),
            result.reclaimable_display()
        )?;
        if result.cancelled {
            writeln!(writer, "Scan was interrupted; results are partial.")?;
        }
        Ok(())
    }
}
