//! Per-transcript expression from RNA-seq quantification.
//!
//! Quant files of one species are assembled into an [ExpressionMatrix] of
//! length-scaled TPM values (transcripts x runs). Transcripts whose
//! expression varies too much across runs are then dropped, and the median
//! over runs is kept as the expression value of each transcript.

use crate::options::ExpressionOptions;
use crate::reader::quant::{check_quant_columns, read_quant_file, run_id_from_file_name};
use crate::table_utils::{
    file_name_of, list_files_with_suffix, read_table, write_table, TableFormat, TRANSCRIPT_ID,
};
use anyhow::{bail, Context};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Transcript column of an expression matrix.
pub const MATRIX_ID_COLUMN: &str = "Name";

/// Columns appended by [calculate_rsd].
pub const RSD_COLUMNS: [&str; 3] = ["mean", "std_dev", "rsd"];

/// Value column of a median expression table.
pub const MEDIAN_EXPRESSION: &str = "median_expression";

const LENGTH_MEAN: &str = "mean_effective_length";

/// Per-run quantification values. Each of the three frames has a
/// [MATRIX_ID_COLUMN] column followed by one Float64 column per run, with a
/// null cell where a transcript is missing from a run. Transcripts are kept
/// in the order they were first seen.
#[derive(Clone, Debug)]
pub struct ExpressionMatrix {
    runs: Vec<String>,
    tpm: DataFrame,
    effective_length: DataFrame,
    num_reads: DataFrame,
}

impl Default for ExpressionMatrix {
    fn default() -> ExpressionMatrix {
        // SAFETY: a single column trivially satisfies the length and unique-name invariants.
        let empty = unsafe {
            DataFrame::new_no_checks(vec![Series::new_empty(MATRIX_ID_COLUMN, &DataType::String)])
        };
        ExpressionMatrix {
            runs: Vec::new(),
            tpm: empty.clone(),
            effective_length: empty.clone(),
            num_reads: empty,
        }
    }
}

/// Adds the `measure` column of `run` to `frame` as a column named `run_id`.
///
/// The transcripts of the result are those of `frame` followed by the ones
/// only `run` has, so that earlier runs keep their row order.
fn append_run(
    frame: &DataFrame,
    run: &DataFrame,
    measure: &str,
    run_id: &str,
) -> anyhow::Result<DataFrame> {
    let names = frame
        .select([MATRIX_ID_COLUMN])?
        .vstack(&run.select([MATRIX_ID_COLUMN])?)?;
    let values = run
        .clone()
        .lazy()
        .select([col(MATRIX_ID_COLUMN), col(measure).alias(run_id)]);

    let out = names
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .left_join(frame.clone().lazy(), col(MATRIX_ID_COLUMN), col(MATRIX_ID_COLUMN))
        .left_join(values, col(MATRIX_ID_COLUMN), col(MATRIX_ID_COLUMN))
        .collect()?;
    Ok(out)
}

/// Sum of each of `columns`; an all-null column sums to 0.
fn column_sums(df: &DataFrame, columns: &[String]) -> anyhow::Result<Vec<f64>> {
    let sums = df
        .clone()
        .lazy()
        .select(columns.iter().map(|c| col(c).sum()).collect::<Vec<Expr>>())
        .collect()?;
    columns
        .iter()
        .map(|c| Ok(sums.column(c)?.f64()?.get(0).unwrap_or(0.0)))
        .collect()
}

impl ExpressionMatrix {
    /// Transcript names, in row order.
    pub fn transcripts(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .tpm
            .column(MATRIX_ID_COLUMN)?
            .str()?
            .into_iter()
            .flatten()
            .map(|s| s.to_string())
            .collect())
    }

    pub fn runs(&self) -> &[String] {
        &self.runs
    }

    /// The raw TPM values, one column per run.
    pub fn tpm(&self) -> &DataFrame {
        &self.tpm
    }

    /// Reads the given quant files, one run each. The run id is taken from
    /// the file name (`quant_<run id>.csv`).
    pub fn from_quant_files<T: AsRef<Path>>(paths: &[T]) -> anyhow::Result<ExpressionMatrix> {
        let mut matrix = ExpressionMatrix::default();
        for p in paths {
            let p = p.as_ref();
            let run_id = run_id_from_file_name(&file_name_of(p))?;
            let df = read_quant_file(p)?;
            matrix
                .add_run(&run_id, &df)
                .with_context(|| format!("Could not add {} to the expression matrix", p.display()))?;
        }
        Ok(matrix)
    }

    /// Reads every `*.csv` quant file of `dir`, in file name order.
    pub fn from_quant_dir<T: AsRef<Path>>(dir: T) -> anyhow::Result<ExpressionMatrix> {
        let files = list_files_with_suffix(dir.as_ref(), ".csv")?;
        if files.is_empty() {
            bail!("No quant files found in {}", dir.as_ref().display());
        }
        ExpressionMatrix::from_quant_files(&files)
    }

    /// Adds the quant table of one run. When a transcript is listed more than
    /// once, only its first row is used.
    pub fn add_run(&mut self, run_id: &str, quant: &DataFrame) -> anyhow::Result<()> {
        check_quant_columns(quant)?;
        if run_id == MATRIX_ID_COLUMN || self.runs.iter().any(|r| r == run_id) {
            bail!("Run {} is already part of the expression matrix", run_id);
        }

        let run = quant
            .clone()
            .lazy()
            .select([
                col(MATRIX_ID_COLUMN).cast(DataType::String),
                col("TPM").cast(DataType::Float64),
                col("EffectiveLength").cast(DataType::Float64),
                col("NumReads").cast(DataType::Float64),
            ])
            .filter(col(MATRIX_ID_COLUMN).is_not_null())
            .unique_stable(
                Some(vec![MATRIX_ID_COLUMN.to_string()]),
                UniqueKeepStrategy::First,
            )
            .collect()?;

        self.tpm = append_run(&self.tpm, &run, "TPM", run_id)?;
        self.effective_length = append_run(&self.effective_length, &run, "EffectiveLength", run_id)?;
        self.num_reads = append_run(&self.num_reads, &run, "NumReads", run_id)?;
        self.runs.push(run_id.to_string());
        Ok(())
    }

    /// Computes the length-scaled TPM matrix.
    ///
    /// TPM values are multiplied by the mean effective length of their
    /// transcript across runs, then each run is rescaled so that it sums to
    /// the total number of reads of that run. Cells of transcripts absent
    /// from a run stay empty.
    ///
    /// Returns a [DataFrame] with a [MATRIX_ID_COLUMN] column followed by
    /// one Float64 column per run.
    pub fn length_scaled_tpm(&self) -> anyhow::Result<DataFrame> {
        if self.runs.is_empty() {
            return Ok(self.tpm.clone());
        }
        let run_cols: Vec<Expr> = self.runs.iter().map(|r| col(r)).collect();

        let length_mean = self.effective_length.clone().lazy().select([
            col(MATRIX_ID_COLUMN),
            concat_list(&run_cols)?.list().mean().alias(LENGTH_MEAN),
        ]);
        let scaled = self
            .tpm
            .clone()
            .lazy()
            .left_join(length_mean, col(MATRIX_ID_COLUMN), col(MATRIX_ID_COLUMN))
            .with_columns(
                self.runs
                    .iter()
                    .map(|r| (col(r) * col(LENGTH_MEAN)).alias(r))
                    .collect::<Vec<Expr>>(),
            )
            .select([all().exclude([LENGTH_MEAN])])
            .collect()?;

        let counts_sums = column_sums(&self.num_reads, &self.runs)?;
        let scaled_sums = column_sums(&scaled, &self.runs)?;

        let mut rescale = Vec::with_capacity(self.runs.len());
        for ((run_id, counts_sum), new_sum) in self.runs.iter().zip(counts_sums).zip(scaled_sums) {
            let factor = counts_sum / new_sum;
            if factor.is_finite() {
                rescale.push((col(run_id) * lit(factor)).alias(run_id));
            } else {
                warn!(
                    "Run {} has no scalable abundance (reads: {}, length-weighted TPM: {}); its column is left empty",
                    run_id, counts_sum, new_sum
                );
                rescale.push(lit(NULL).cast(DataType::Float64).alias(run_id));
            }
        }

        Ok(scaled.lazy().with_columns(rescale).collect()?)
    }
}

/// Names of the per-run value columns of an expression matrix: everything
/// but the id column and the [RSD_COLUMNS].
fn run_columns(df: &DataFrame, id_column: &str) -> anyhow::Result<Vec<String>> {
    let names = df.get_column_names();
    if !names.contains(&id_column) {
        bail!("The expression matrix has no {:?} column", id_column);
    }
    Ok(names
        .into_iter()
        .filter(|n| *n != id_column && !RSD_COLUMNS.contains(n))
        .map(|n| n.to_string())
        .collect())
}

/// The run values of each row, as one list per row. Nulls inside a list are
/// ignored by the list aggregations.
fn run_values(runs: &[String]) -> anyhow::Result<Expr> {
    let values: Vec<Expr> = runs
        .iter()
        .map(|r| col(r).cast(DataType::Float64))
        .collect();
    Ok(concat_list(values)?)
}

/// Appends the `mean`, `std_dev` (sample) and `rsd` (`std_dev / mean`)
/// columns of every transcript across the run columns of `df`.
///
/// Empty cells are ignored. An undefined RSD (a single run, or a zero mean
/// with no variation) is set to 0, so the transcript is kept by
/// [median_expression].
pub fn calculate_rsd(df: &DataFrame, id_column: &str) -> anyhow::Result<DataFrame> {
    let runs = run_columns(df, id_column)?;
    let values = run_values(&runs)?;
    let [mean, std_dev, rsd] = RSD_COLUMNS;

    let out = df
        .clone()
        .lazy()
        .with_columns([
            values.clone().list().mean().alias(mean),
            values.list().std(1).alias(std_dev),
        ])
        .with_column(
            (col(std_dev) / col(mean))
                .fill_nan(lit(0.0))
                .fill_null(lit(0.0))
                .alias(rsd),
        )
        .collect()?;
    Ok(out)
}

/// Keeps the transcripts whose RSD is below [ExpressionOptions::rsd_threshold]
/// and returns their median expression across runs, as a two column
/// [DataFrame] (`transcript_id`, [MEDIAN_EXPRESSION]).
pub fn median_expression(df: &DataFrame, opts: &ExpressionOptions) -> anyhow::Result<DataFrame> {
    let runs = run_columns(df, &opts.id_column)?;
    let values = run_values(&runs)?;

    let out = calculate_rsd(df, &opts.id_column)?
        .lazy()
        .filter(col(RSD_COLUMNS[2]).lt(lit(opts.rsd_threshold)))
        .select([
            col(&opts.id_column).alias(TRANSCRIPT_ID),
            values.list().median().alias(MEDIAN_EXPRESSION),
        ])
        .collect()?;
    Ok(out)
}

/// Builds the length-scaled TPM matrix of the quant files in `quant_dir`
/// and writes it to `out`.
pub fn write_expression_matrix<T: AsRef<Path>, U: AsRef<Path>>(
    quant_dir: T,
    out: U,
) -> anyhow::Result<DataFrame> {
    let matrix = ExpressionMatrix::from_quant_dir(quant_dir.as_ref())?;
    let mut df = matrix.length_scaled_tpm()?;
    write_table(&mut df, out.as_ref(), TableFormat::CSV)?;
    info!(
        "Expression matrix of {} transcripts over {} runs written to {}",
        df.height(),
        matrix.runs().len(),
        out.as_ref().display()
    );
    Ok(df)
}

/// Computes the median expression table of every expression matrix
/// (`*.csv`) in `input_dir` and writes it to
/// `output_dir/rna_expression_<file name>`.
pub fn process_expression_dir<T: AsRef<Path>, U: AsRef<Path>>(
    input_dir: T,
    output_dir: U,
    opts: &ExpressionOptions,
) -> anyhow::Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    let mut written = Vec::new();
    for path in list_files_with_suffix(input_dir.as_ref(), ".csv")? {
        let name = file_name_of(&path);
        let matrix = read_table(&path, TableFormat::CSV)?;
        let mut medians = median_expression(&matrix, opts)
            .with_context(|| format!("Could not compute the median expression of {}", name))?;

        let out = output_dir.join(format!("rna_expression_{}", name));
        write_table(&mut medians, &out, TableFormat::CSV)?;
        info!(
            "{}: kept {} of {} transcripts",
            name,
            medians.height(),
            matrix.height()
        );
        written.push(out);
    }
    Ok(written)
}
