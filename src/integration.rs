//! Joins the DNA feature table of a species with its RNA expression table.

use crate::options::MergeOptions;
use crate::table_utils::{read_table, write_table, TableFormat};
use anyhow::{bail, Context};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

fn with_string_key(df: &DataFrame, on: &str, side: &str) -> anyhow::Result<DataFrame> {
    if !df.get_column_names().contains(&on) {
        bail!("The {} table has no {:?} column", side, on);
    }
    let key = df.column(on)?.cast(&DataType::String)?;
    let mut df = df.clone();
    df.with_column(key)?;
    Ok(df)
}

/// Inner join of `dna` and `rna` on [MergeOptions::on]. Transcripts present
/// in only one of the tables are dropped.
///
/// ### Errors
///
/// Fails if the key column is missing from either table.
pub fn merge_frames(
    dna: &DataFrame,
    rna: &DataFrame,
    opts: &MergeOptions,
) -> anyhow::Result<DataFrame> {
    let on = opts.on.as_str();
    let dna = with_string_key(dna, on, "DNA")?;
    let rna = with_string_key(rna, on, "RNA")?;
    let merged = dna.inner_join(&rna, [on], [on])?;
    Ok(merged)
}

/// Reads the DNA and RNA tables, merges them with [merge_frames] and writes
/// the result to `out_path`.
///
/// ### Returns
///
/// The merged [DataFrame].
pub fn merge_datasets<T: AsRef<Path>, U: AsRef<Path>, V: AsRef<Path>>(
    dna_path: T,
    rna_path: U,
    out_path: V,
    opts: &MergeOptions,
) -> anyhow::Result<DataFrame> {
    let dna = read_table(dna_path.as_ref(), TableFormat::CSV)?;
    let rna = read_table(rna_path.as_ref(), TableFormat::CSV)?;
    let mut merged = merge_frames(&dna, &rna, opts).with_context(|| {
        format!(
            "Could not merge {} with {}",
            dna_path.as_ref().display(),
            rna_path.as_ref().display()
        )
    })?;
    write_table(&mut merged, out_path.as_ref(), TableFormat::CSV)?;
    info!(
        "Merged {} DNA rows and {} RNA rows into {} rows",
        dna.height(),
        rna.height(),
        merged.height()
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of(df: &DataFrame, key: &str, column: &str) -> Option<f64> {
        let keys = df.column("transcript_id").unwrap().str().unwrap().clone();
        let values = df.column(column).unwrap().cast(&DataType::Float64).unwrap();
        let values = values.f64().unwrap().clone();
        let found = keys
            .into_iter()
            .zip(values.into_iter())
            .find(|(k, _)| *k == Some(key))
            .and_then(|(_, v)| v);
        found
    }

    #[test]
    fn test_merge_frames() -> anyhow::Result<()> {
        let dna = df!(
            "gene_id" => ["g1", "g2", "g3"],
            "transcript_id" => ["t1", "t2", "t3"],
            "cds_length" => [300i64, 600, 900],
        )?;
        let rna = df!(
            "transcript_id" => ["t3", "t1", "t9"],
            "median_expression" => [1.5, 0.0, 7.0],
        )?;
        let merged = merge_frames(&dna, &rna, &MergeOptions::default())?;
        assert_eq!(merged.height(), 2);
        assert_eq!(merged.width(), 4);
        assert_eq!(value_of(&merged, "t1", "cds_length"), Some(300.0));
        assert_eq!(value_of(&merged, "t3", "median_expression"), Some(1.5));
        assert_eq!(value_of(&merged, "t2", "cds_length"), None);
        Ok(())
    }

    #[test]
    fn test_merge_missing_key() -> anyhow::Result<()> {
        let dna = df!("gene_id" => ["g1"])?;
        let rna = df!("transcript_id" => ["t1"], "median_expression" => [1.0])?;
        assert!(merge_frames(&dna, &rna, &MergeOptions::default()).is_err());
        assert!(merge_frames(&rna, &rna, &MergeOptions::new("Name")).is_err());
        Ok(())
    }

    #[test]
    fn test_merge_datasets() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dna = dir.path().join("dna.csv");
        let rna = dir.path().join("rna.csv");
        std::fs::write(&dna, "gene_id,transcript_id,cds_gc\ng1,t1,0.5\ng2,t2,0.25\n")?;
        std::fs::write(&rna, "transcript_id,median_expression\nt2,4.5\n")?;

        let out = dir.path().join("merged").join("species.csv");
        let merged = merge_datasets(&dna, &rna, &out, &MergeOptions::default())?;
        assert_eq!(merged.height(), 1);
        assert_eq!(
            std::fs::read_to_string(&out)?,
            "gene_id,transcript_id,cds_gc,median_expression\ng2,t2,0.25,4.5\n"
        );
        Ok(())
    }
}
