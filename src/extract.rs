//! Appends derived sequence features to every sequence table of a directory.
//!
//! Each table is rewritten in place: rows are streamed one at a time from the
//! original file into a temporary file created next to it, and the temporary
//! file is renamed over the original once every row has been written. The
//! original is therefore either fully replaced or left as it was.

use crate::features::{extended_header, STANDARD_CODONS};
use crate::options::{ExtractOptions, MalformedRowPolicy, SchemaMismatchPolicy};
use crate::record::{FeatureRecord, GeneRecord};
use crate::table_utils::{file_name_of, list_files_with_suffix};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// What happened to one table during a run.
#[derive(Clone, Debug, PartialEq)]
pub enum FileOutcome {
    /// The table was rewritten with its features. `skipped_rows` counts the
    /// malformed rows dropped under [MalformedRowPolicy::SkipRow].
    Processed { rows: usize, skipped_rows: usize },
    /// The header was not the canonical one; the table was not modified.
    SkippedSchema { header: Vec<String> },
    /// The run stopped (schema abort, failure or cancellation) before
    /// reaching this table.
    NotVisited,
    /// Processing failed; the table was not modified and the run stopped.
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Per-table outcomes of a run, in the order the tables were considered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionReport {
    pub files: Vec<FileReport>,
}

impl ExtractionReport {
    /// Looks up the outcome of the table named `file_name`.
    pub fn outcome(&self, file_name: &str) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|f| f.path.file_name().map(|n| n == file_name).unwrap_or(false))
            .map(|f| &f.outcome)
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::SkippedSchema { .. }))
    }

    pub fn not_visited(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::NotVisited))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    fn count<F: Fn(&FileOutcome) -> bool>(&self, f: F) -> usize {
        self.files.iter().filter(|r| f(&r.outcome)).count()
    }

    /// Turns a failed table into an error, so that callers treating failures
    /// as fatal can use `?`.
    pub fn ensure_success(&self) -> anyhow::Result<()> {
        for f in self.files.iter() {
            if let FileOutcome::Failed { error } = &f.outcome {
                anyhow::bail!(
                    "Feature extraction failed for {}: {}",
                    f.path.display(),
                    error
                );
            }
        }
        Ok(())
    }
}

enum TableState {
    SchemaMismatch(Vec<String>),
    Rewritten { rows: usize, skipped_rows: usize },
}

/// Computes the codon frequencies, segment lengths, segment GC contents and
/// wobble GC contents of every row of every sequence table in `dir`, and
/// appends them as new columns to the table.
///
/// Tables are the files whose name ends with the extension of
/// [ExtractOptions::format]; they are visited in file name order. A table
/// whose header is not exactly [ExtractOptions::canonical_header] is left
/// untouched, and [ExtractOptions::on_schema_mismatch] decides whether the
/// remaining tables are still visited. Since an extended table no longer has
/// the canonical header, running this twice on the same directory never
/// touches a table twice.
///
/// A table that cannot be processed (I/O error, or a malformed row under
/// [MalformedRowPolicy::FailFast]) is reported as [FileOutcome::Failed] and
/// stops the run. Use [ExtractionReport::ensure_success] to turn this into an
/// error.
///
/// ### Errors
///
/// Returns an error only if `dir` cannot be listed.
pub fn extract_features<T: AsRef<Path>>(
    dir: T,
    opts: &ExtractOptions,
) -> anyhow::Result<ExtractionReport> {
    let dir = dir.as_ref();
    let tables = list_files_with_suffix(dir, opts.format.extension())
        .with_context(|| format!("Could not list the tables in {}", dir.display()))?;
    let canonical = opts.canonical_header();

    let mut report = ExtractionReport::default();
    let mut stopped = false;

    for path in tables {
        if stopped || opts.is_cancelled() {
            if !stopped {
                info!("Feature extraction cancelled; remaining tables are not visited");
                stopped = true;
            }
            report.files.push(FileReport {
                path,
                outcome: FileOutcome::NotVisited,
            });
            continue;
        }

        info!("Extracting DNA features from: {}", file_name_of(&path));
        let outcome = match process_table(&path, &canonical, opts) {
            Ok(TableState::Rewritten { rows, skipped_rows }) => {
                debug!("wrote features for {} rows of {}", rows, path.display());
                FileOutcome::Processed { rows, skipped_rows }
            }
            Ok(TableState::SchemaMismatch(header)) => {
                warn!(
                    "The header of {} does not match the expected columns {:?}; the table is left unchanged.",
                    path.display(),
                    canonical
                );
                if opts.on_schema_mismatch == SchemaMismatchPolicy::AbortDirectory {
                    warn!("Stopping here; the tables after it in {} are not processed.", dir.display());
                    stopped = true;
                }
                FileOutcome::SkippedSchema { header }
            }
            Err(e) => {
                warn!("Could not extract features from {}: {:#}", path.display(), e);
                stopped = true;
                FileOutcome::Failed {
                    error: format!("{:#}", e),
                }
            }
        };
        report.files.push(FileReport { path, outcome });
    }

    Ok(report)
}

fn process_table(
    path: &Path,
    canonical: &[String],
    opts: &ExtractOptions,
) -> anyhow::Result<TableState> {
    let delimiter = opts.format.delimiter();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Could not open {}", path.display()))?;

    let header: Vec<String> = rdr
        .headers()
        .with_context(|| format!("Could not read the header of {}", path.display()))?
        .iter()
        .map(|s| s.to_string())
        .collect();
    if header != canonical {
        return Ok(TableState::SchemaMismatch(header));
    }

    // the temporary file must live on the same filesystem for the final rename
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Could not create a temporary file in {}", parent.display()))?;

    let tmp_path = tmp.path().to_path_buf();
    let mut rows = 0usize;
    let mut skipped_rows = 0usize;
    {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(&mut tmp);
        wtr.write_record(extended_header(&header, &STANDARD_CODONS))
            .with_context(|| format!("Could not write the header to {}", tmp_path.display()))?;

        let mut record = csv::StringRecord::new();
        while rdr
            .read_record(&mut record)
            .with_context(|| format!("Could not read a row of {}", path.display()))?
        {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() != header.len() {
                match opts.on_malformed_row {
                    MalformedRowPolicy::FailFast => anyhow::bail!(
                        "Line {} of {} has {} fields, expected {}",
                        line,
                        path.display(),
                        record.len(),
                        header.len()
                    ),
                    MalformedRowPolicy::SkipRow => {
                        warn!(
                            "Skipping line {} of {}: {} fields, expected {}",
                            line,
                            path.display(),
                            record.len(),
                            header.len()
                        );
                        skipped_rows += 1;
                        continue;
                    }
                }
            }

            let gene = GeneRecord::from_fields(record.iter())
                .with_context(|| format!("Line {} of {}", line, path.display()))?;
            let extended = FeatureRecord::new(gene, &STANDARD_CODONS);
            wtr.write_record(extended.to_fields()).with_context(|| {
                format!("Could not write line {} of {} to {}", line, path.display(), tmp_path.display())
            })?;
            rows += 1;
        }
        wtr.flush()
            .with_context(|| format!("Could not flush {}", tmp_path.display()))?;
    }

    // keep the permissions of the table being replaced
    let permissions = fs::metadata(path)
        .with_context(|| format!("Could not read the permissions of {}", path.display()))?
        .permissions();
    fs::set_permissions(tmp.path(), permissions)
        .with_context(|| format!("Could not set the permissions of {}", tmp.path().display()))?;

    tmp.persist(path)
        .with_context(|| format!("Could not replace {} with its extended version", path.display()))?;

    Ok(TableState::Rewritten { rows, skipped_rows })
}
