use genexp_prep::expression::{write_expression_matrix, MEDIAN_EXPRESSION};
use genexp_prep::reader::quant::convert_quant_dir;
use genexp_prep::{merge_datasets, process_expression_dir, ExpressionOptions, MergeOptions};
use polars::prelude::*;
use std::fs;

const RUN_1: &str = "Name\tLength\tEffectiveLength\tTPM\tNumReads\n\
t1\t150\t100\t10\t20\n\
t2\t250\t200\t30\t40\n";

const RUN_2: &str = "Name\tLength\tEffectiveLength\tTPM\tNumReads\n\
t1\t150\t300\t20\t10\n\
t2\t250\t200\t5\t30\n";

fn values_by_id(df: &DataFrame, id: &str, column: &str) -> anyhow::Result<Vec<(String, f64)>> {
    let ids = df.column(id)?.cast(&DataType::String)?;
    let values = df.column(column)?.cast(&DataType::Float64)?;
    let mut out: Vec<(String, f64)> = ids
        .str()?
        .into_iter()
        .zip(values.f64()?.into_iter())
        .filter_map(|(k, v)| Some((k?.to_string(), v?)))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
}

#[test]
fn test_quant_to_merged_dataset() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sf_dir = dir.path().join("sf");
    fs::create_dir(&sf_dir)?;
    fs::write(sf_dir.join("quant_SRR1.sf"), RUN_1)?;
    fs::write(sf_dir.join("quant_SRR2.sf"), RUN_2)?;

    let csv_dir = dir.path().join("quant_csv");
    assert_eq!(convert_quant_dir(&sf_dir, &csv_dir)?.len(), 2);

    let matrix_dir = dir.path().join("matrices");
    let matrix = write_expression_matrix(&csv_dir, matrix_dir.join("homo_sapiens.csv"))?;
    assert_eq!(matrix.get_column_names(), vec!["Name", "SRR1", "SRR2"]);
    let srr2 = values_by_id(&matrix, "Name", "SRR2")?;
    assert_close(srr2[0].1, 32.0);
    assert_close(srr2[1].1, 8.0);

    let rna_dir = dir.path().join("rna");
    let written = process_expression_dir(&matrix_dir, &rna_dir, &ExpressionOptions::default())?;
    let rna_path = rna_dir.join("rna_expression_homo_sapiens.csv");
    assert_eq!(written, vec![rna_path.clone()]);

    let dna_path = dir.path().join("dna.csv");
    fs::write(
        &dna_path,
        "gene_id,transcript_id,cds_gc\ng1,t1,0.5\ng3,t3,0.25\n",
    )?;
    let out = dir.path().join("final").join("homo_sapiens.csv");
    let merged = merge_datasets(&dna_path, &rna_path, &out, &MergeOptions::default())?;
    assert!(out.exists());

    let medians = values_by_id(&merged, "transcript_id", MEDIAN_EXPRESSION)?;
    assert_eq!(medians.len(), 1);
    assert_eq!(medians[0].0, "t1");
    assert_close(medians[0].1, 23.5);
    Ok(())
}

#[test]
fn test_rsd_threshold_drops_unstable_transcripts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix_dir = dir.path().join("matrices");
    fs::create_dir(&matrix_dir)?;
    fs::write(
        matrix_dir.join("yeast.csv"),
        "Name,r1,r2,r3\nstable,10.5,11.5,11.25\nnoisy,0.5,0.5,90\n",
    )?;

    let opts = ExpressionOptions::new(1.0, "Name")?;
    process_expression_dir(&matrix_dir, dir.path().join("rna"), &opts)?;
    let rna = fs::read_to_string(dir.path().join("rna").join("rna_expression_yeast.csv"))?;
    assert_eq!(rna, "transcript_id,median_expression\nstable,11.25\n");
    Ok(())
}
