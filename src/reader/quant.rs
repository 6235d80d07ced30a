//! Salmon quantification output (`quant.sf`).
//!
//! A quant file is tab separated with the columns of [QUANT_FIELDS], one row
//! per transcript. The RNA-seq workflow leaves one `quant.sf` per run; they
//! are renamed `quant_<run id>.sf` before conversion.

use crate::table_utils::{file_name_of, list_files_with_suffix, TableFormat};
use anyhow::{bail, Context};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// The columns of a Salmon quant file.
pub const QUANT_FIELDS: [&str; 5] = ["Name", "Length", "EffectiveLength", "TPM", "NumReads"];

/// Extracts the run id from a quant file name such as `quant_DRR513083.csv`.
pub fn run_id_from_file_name(file_name: &str) -> anyhow::Result<String> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.split('_').nth(1) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => bail!(
            "Cannot find a run id in {:?}; expected a name like quant_<run id>.csv",
            file_name
        ),
    }
}

/// Reads a quant file into a [DataFrame]. Files ending in `.sf` or `.tsv`
/// are read as tab separated, anything else as comma separated.
///
/// ### Errors
///
/// Fails if the file cannot be parsed or lacks one of the [QUANT_FIELDS].
pub fn read_quant_file<T: AsRef<Path>>(file_path: T) -> anyhow::Result<DataFrame> {
    let file_path = file_path.as_ref();
    let format = match file_path.extension().and_then(|e| e.to_str()) {
        Some("sf") | Some("tsv") => TableFormat::TSV,
        _ => TableFormat::CSV,
    };
    let df = crate::table_utils::read_table(file_path, format)?;
    check_quant_columns(&df)
        .with_context(|| format!("{} is not a quant file", file_path.display()))?;
    Ok(df)
}

pub(crate) fn check_quant_columns(df: &DataFrame) -> anyhow::Result<()> {
    let names = df.get_column_names();
    let missing: Vec<&str> = QUANT_FIELDS
        .iter()
        .copied()
        .filter(|f| !names.contains(f))
        .collect();
    if !missing.is_empty() {
        bail!("Missing columns {:?}", missing);
    }
    Ok(())
}

/// Rewrites the tab separated `input` as the comma separated `output`,
/// cell by cell.
pub fn convert_quant_file<T: AsRef<Path>, U: AsRef<Path>>(input: T, output: U) -> anyhow::Result<()> {
    let input = input.as_ref();
    let output = output.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(input)
        .with_context(|| format!("Could not open {}", input.display()))?;
    let mut wtr = csv::Writer::from_path(output)
        .with_context(|| format!("Could not create {}", output.display()))?;
    for record in rdr.records() {
        wtr.write_record(&record?)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Converts every `*.sf` file of `input_dir` into a `*.csv` file of the same
/// name in `output_dir`, which is created if needed. Returns the written
/// paths, in file name order.
pub fn convert_quant_dir<T: AsRef<Path>, U: AsRef<Path>>(
    input_dir: T,
    output_dir: U,
) -> anyhow::Result<Vec<PathBuf>> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();
    let inputs = list_files_with_suffix(input_dir, ".sf")?;
    if inputs.is_empty() {
        info!("No quant files found in {}", input_dir.display());
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(output_dir)?;

    let mut written = Vec::with_capacity(inputs.len());
    for input in inputs {
        let out = output_dir.join(input.with_extension("csv").file_name().unwrap_or_default());
        convert_quant_file(&input, &out)?;
        info!("Converted {} to {}", file_name_of(&input), out.display());
        written.push(out);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const QUANT_SF: &str = "Name\tLength\tEffectiveLength\tTPM\tNumReads\n\
t1\t1000\t800.5\t10.0\t20\n\
t2\t500\t300\t5.5\t3\n";

    #[test]
    fn test_run_id_from_file_name() {
        assert_eq!(run_id_from_file_name("quant_DRR513083.csv").unwrap(), "DRR513083");
        assert_eq!(run_id_from_file_name("quant_SRR1.sf").unwrap(), "SRR1");
        assert!(run_id_from_file_name("quant.csv").is_err());
        assert!(run_id_from_file_name("quant_.csv").is_err());
    }

    #[test]
    fn test_convert_and_read() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let raw = dir.path().join("sf_files");
        fs::create_dir(&raw)?;
        fs::write(raw.join("quant_SRR1.sf"), QUANT_SF)?;
        fs::write(raw.join("notes.txt"), "ignored")?;

        let out_dir = dir.path().join("csv_files");
        let written = convert_quant_dir(&raw, &out_dir)?;
        assert_eq!(written, vec![out_dir.join("quant_SRR1.csv")]);
        assert_eq!(
            fs::read_to_string(&written[0])?,
            "Name,Length,EffectiveLength,TPM,NumReads\nt1,1000,800.5,10.0,20\nt2,500,300,5.5,3\n"
        );

        let from_sf = read_quant_file(raw.join("quant_SRR1.sf"))?;
        let from_csv = read_quant_file(&written[0])?;
        assert_eq!(from_sf.shape(), (2, 5));
        assert_eq!(from_csv.shape(), (2, 5));
        Ok(())
    }

    #[test]
    fn test_read_quant_file_missing_column() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("quant_SRR2.csv");
        fs::write(&path, "Name,TPM\nt1,1.0\n")?;
        assert!(read_quant_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_convert_empty_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let written = convert_quant_dir(dir.path(), dir.path().join("out"))?;
        assert!(written.is_empty());
        assert!(!dir.path().join("out").exists());
        Ok(())
    }
}
