use crate::table_utils::{get_noodles_reader_from_reader, TableFormat};
use anyhow::Context;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Header of a table converted from FASTA.
pub const SEQUENCE_TABLE_FIELDS: [&str; 2] = ["identifier", "sequence"];

/// One FASTA record, flattened: its name (the first word of the definition
/// line, without `>`) and its full sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceEntry {
    pub identifier: String,
    pub sequence: String,
}

/// Reads every record of a FASTA stream, gzipped or not.
pub fn read_sequence_entries(r: impl Read + 'static) -> anyhow::Result<Vec<SequenceEntry>> {
    let mut reader = get_noodles_reader_from_reader(r)?;
    let mut entries = Vec::new();
    for result in reader.records() {
        let record = result?;
        let identifier = record.name().to_string();
        let sequence = std::str::from_utf8(record.sequence().as_ref())
            .with_context(|| format!("The sequence of {} is not valid UTF-8", identifier))?
            .to_string();
        entries.push(SequenceEntry {
            identifier,
            sequence,
        });
    }
    Ok(entries)
}

/// Writes `entries` as a two column table (`identifier`, `sequence`).
pub fn write_sequence_table<W: Write>(
    entries: &[SequenceEntry],
    out: W,
    format: TableFormat,
) -> anyhow::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(out);
    wtr.write_record(SEQUENCE_TABLE_FIELDS)?;
    for e in entries {
        wtr.write_record([e.identifier.as_str(), e.sequence.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Converts a (possibly gzipped) FASTA file into a CSV sequence table and
/// returns the number of records written.
pub fn fasta_to_table<T: AsRef<Path>, U: AsRef<Path>>(fasta: T, out: U) -> anyhow::Result<usize> {
    let fasta = fasta.as_ref();
    let out = out.as_ref();

    let file = std::fs::File::open(fasta)
        .with_context(|| format!("Could not open the FASTA file {}", fasta.display()))?;
    let entries = read_sequence_entries(file)
        .with_context(|| format!("Could not parse the FASTA file {}", fasta.display()))?;

    let table = std::fs::File::create(out)
        .with_context(|| format!("Could not create {}", out.display()))?;
    write_sequence_table(&entries, std::io::BufWriter::new(table), TableFormat::CSV)
        .with_context(|| format!("Could not write {}", out.display()))?;

    info!(
        "Wrote {} sequences from {} to {}",
        entries.len(),
        fasta.display(),
        out.display()
    );
    Ok(entries.len())
}
