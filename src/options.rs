use crate::table_utils::{TableFormat, CANONICAL_FIELDS, TRANSCRIPT_ID};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
/// What the feature extraction driver does when a table's header is not the
/// canonical sequence-table header.
///
/// # Variants
///
/// * `AbortDirectory` - leave the table untouched and stop scanning the
///   directory; the tables after it are not visited either. This is how the
///   pipeline has always behaved and stays the default until the per-table
///   behavior is confirmed.
/// * `SkipFile` - leave the table untouched and go on with the next one.
pub enum SchemaMismatchPolicy {
    #[default]
    AbortDirectory,
    SkipFile,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
/// What the feature extraction driver does with a data row whose number of
/// cells differs from the header.
///
/// # Variants
///
/// * `FailFast` - stop the whole run with an error. The table being
///   rewritten is left untouched.
/// * `SkipRow` - drop the row from the output, log a warning and continue.
pub enum MalformedRowPolicy {
    #[default]
    FailFast,
    SkipRow,
}

#[derive(Clone, Debug)]
/// Configuration of a feature extraction run over a directory of sequence
/// tables.
///
/// # Fields
///
/// * `format`: delimiter and file extension of the tables to process.
/// * `id_column`: name expected for the first (gene id) column. Sequence
///   tables fetched from Ensembl name it `ensembl_gene_id`.
/// * `on_schema_mismatch`: see [SchemaMismatchPolicy].
/// * `on_malformed_row`: see [MalformedRowPolicy].
/// * `cancel`: an optional flag checked between tables; once it is set, the
///   remaining tables are not visited.
///
/// # Examples
///
/// ```
/// use genexp_prep::options::{ExtractOptions, SchemaMismatchPolicy};
/// let opts = ExtractOptions::default()
///     .with_id_column("ensembl_gene_id")
///     .with_schema_mismatch_policy(SchemaMismatchPolicy::SkipFile);
/// assert_eq!(opts.canonical_header()[0], "ensembl_gene_id");
/// ```
pub struct ExtractOptions {
    pub format: TableFormat,
    pub id_column: String,
    pub on_schema_mismatch: SchemaMismatchPolicy,
    pub on_malformed_row: MalformedRowPolicy,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ExtractOptions {
    fn default() -> ExtractOptions {
        ExtractOptions {
            format: TableFormat::CSV,
            id_column: CANONICAL_FIELDS[0].to_string(),
            on_schema_mismatch: SchemaMismatchPolicy::AbortDirectory,
            on_malformed_row: MalformedRowPolicy::FailFast,
            cancel: None,
        }
    }
}

impl ExtractOptions {
    pub fn new(
        format: TableFormat,
        id_column: &str,
        on_schema_mismatch: SchemaMismatchPolicy,
        on_malformed_row: MalformedRowPolicy,
    ) -> ExtractOptions {
        ExtractOptions {
            format,
            id_column: id_column.to_string(),
            on_schema_mismatch,
            on_malformed_row,
            cancel: None,
        }
    }

    pub fn with_format(mut self, format: TableFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_id_column(mut self, id_column: &str) -> Self {
        self.id_column = id_column.to_string();
        self
    }

    pub fn with_schema_mismatch_policy(mut self, policy: SchemaMismatchPolicy) -> Self {
        self.on_schema_mismatch = policy;
        self
    }

    pub fn with_malformed_row_policy(mut self, policy: MalformedRowPolicy) -> Self {
        self.on_malformed_row = policy;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The header a table must have to be processed.
    pub fn canonical_header(&self) -> Vec<String> {
        std::iter::once(self.id_column.clone())
            .chain(CANONICAL_FIELDS[1..].iter().map(|s| s.to_string()))
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
/// Configuration of the median expression step.
///
/// # Fields
///
/// * `rsd_threshold`: transcripts whose relative standard deviation across
///   runs is not strictly below this value are dropped. Defaults to 2.
/// * `id_column`: name of the transcript column of the expression matrix.
///   Matrices built from Salmon output name it `Name`; it is renamed to
///   `transcript_id` on output.
pub struct ExpressionOptions {
    pub rsd_threshold: f64,
    pub id_column: String,
}

impl Default for ExpressionOptions {
    fn default() -> ExpressionOptions {
        ExpressionOptions {
            rsd_threshold: 2.0,
            id_column: String::from("Name"),
        }
    }
}

impl ExpressionOptions {
    pub fn new(rsd_threshold: f64, id_column: &str) -> anyhow::Result<ExpressionOptions> {
        if !(rsd_threshold.is_finite() && rsd_threshold > 0.0) {
            anyhow::bail!(
                "The RSD threshold must be a positive number, got {}",
                rsd_threshold
            );
        }
        Ok(ExpressionOptions {
            rsd_threshold,
            id_column: id_column.to_string(),
        })
    }
}

#[derive(Clone, Debug)]
/// Configuration of the DNA/RNA dataset merge.
///
/// * `on`: the key column present in both tables.
pub struct MergeOptions {
    pub on: String,
}

impl Default for MergeOptions {
    fn default() -> MergeOptions {
        MergeOptions {
            on: TRANSCRIPT_ID.to_string(),
        }
    }
}

impl MergeOptions {
    pub fn new(on: &str) -> MergeOptions {
        MergeOptions { on: on.to_string() }
    }
}
