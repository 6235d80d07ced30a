use anyhow::Context;
use flate2::read::GzDecoder;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Type alias for a noodles FASTA reader that can read from
/// a `dyn BufRead`. It is used to allow reading from either
/// a compressed or uncompressed FASTA file.
pub type FastaReader = noodles::fasta::Reader<Box<dyn BufRead>>;

/// The columns of a sequence table as produced by the upstream sequence
/// retrieval step, in order. The first column may be renamed through
/// [crate::options::ExtractOptions::id_column].
pub const CANONICAL_FIELDS: [&str; 7] = [
    "gene_id",
    "transcript_id",
    "promoter",
    "utr5",
    "cds",
    "utr3",
    "terminator",
];

/// Column joining DNA and RNA tables.
pub const TRANSCRIPT_ID: &str = "transcript_id";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
/// Delimited text formats understood by the table readers and writers.
///
/// # Variants
///
/// * `CSV` - comma separated, `.csv` extension. Used by every table the
///   pipeline writes.
/// * `TSV` - tab separated, `.tsv` extension.
pub enum TableFormat {
    #[default]
    CSV,
    TSV,
}

impl TableFormat {
    pub fn delimiter(&self) -> u8 {
        match self {
            TableFormat::CSV => b',',
            TableFormat::TSV => b'\t',
        }
    }

    /// The file name suffix, including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::CSV => ".csv",
            TableFormat::TSV => ".tsv",
        }
    }
}

impl std::str::FromStr for TableFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<TableFormat> {
        let ft = match s.to_lowercase().as_str() {
            "csv" => TableFormat::CSV,
            "tsv" => TableFormat::TSV,
            "tab" => TableFormat::TSV,
            _ => anyhow::bail!("Cannot parse the table format {:?}.", s),
        };
        Ok(ft)
    }
}

impl std::fmt::Display for TableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableFormat::CSV => write!(f, "CSV"),
            TableFormat::TSV => write!(f, "TSV"),
        }
    }
}

/// Lists the regular files of `dir` whose name ends with `suffix`, sorted by
/// file name so that a directory is always visited in the same order.
pub fn list_files_with_suffix<T: AsRef<Path>>(dir: T, suffix: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(suffix) {
            files.push(entry.path());
        }
    }
    files.sort_unstable_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// The file name of `path` as a string, for logging and reports.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Reads a whole delimited table with a header into a [DataFrame].
pub fn read_table<T: AsRef<Path>>(file_path: T, format: TableFormat) -> anyhow::Result<DataFrame> {
    let file_path = file_path.as_ref();
    let df = CsvReader::from_path(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?
        .has_header(true)
        .with_separator(format.delimiter())
        .finish()
        .with_context(|| format!("Could not parse {} as {}", file_path.display(), format))?;
    Ok(df)
}

/// Writes `df` with a header row to `file_path`, creating the parent
/// directory if it does not exist. Null cells are written empty.
pub fn write_table<T: AsRef<Path>>(
    df: &mut DataFrame,
    file_path: T,
    format: TableFormat,
) -> anyhow::Result<()> {
    let file_path = file_path.as_ref();

    // create the folder if it doesn't exist
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Could not create the parent directory of the output file {:?}",
                    file_path.as_os_str()
                )
            })?;
        }
    }

    let file = File::create(file_path)?;
    let mut file = BufWriter::with_capacity(4194304, file);
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(format.delimiter())
        .with_null_value(String::new())
        .finish(df)?;
    Ok(())
}

/// Tests if the stream underlying the [BufReader] `reader` is gzipped or not by examining the
/// first 2 bytes for the magic header.  This function *requires*, but does not check, that
/// none of the stream has yet been consumed (i.e. that no read calls have yet been issued
/// to `reader`). It will fill the buffer to examine the first two bytes, but will not consume
/// them.
///
/// If the first 2 bytes could be succesfully read, this returns
/// [Ok]`(true)` if the file is a gzipped file
/// [Ok]`(false)` if it is not a gzipped file
///
/// If the first 2 bytes could not be succesfully read, then this
/// returns the relevant [std::io::Error].
pub fn is_gzipped<T: BufRead>(reader: &mut T) -> std::io::Result<bool> {
    const GZIP_MAGIC_NUMBER: [u8; 2] = [0x1f, 0x8b];

    let src = reader.fill_buf()?;
    if src.get(..2) == Some(&GZIP_MAGIC_NUMBER) {
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Wraps `r` into a buffered reader, transparently decompressing it when
/// the stream starts with the gzip magic number.
pub fn get_decompressed_reader(r: impl Read + 'static) -> anyhow::Result<Box<dyn BufRead>> {
    let mut inner_rdr = BufReader::new(r);
    if is_gzipped(&mut inner_rdr)? {
        trace!("auto-detected gzipped input - reading via decompression");
        Ok(Box::new(BufReader::new(GzDecoder::new(inner_rdr))))
    } else {
        Ok(Box::new(inner_rdr))
    }
}

/// Creates a [FastaReader] from the provided reader, decompressing gzip input.
///
/// **Note** : It is intended that this function *take ownership* of the underlying reader, which
/// is the reason behind the `'static` lifetime bound.
pub fn get_noodles_reader_from_reader(r: impl Read + 'static) -> anyhow::Result<FastaReader> {
    Ok(noodles::fasta::Reader::new(get_decompressed_reader(r)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_table_format() {
        assert_eq!("csv".parse::<TableFormat>().unwrap(), TableFormat::CSV);
        assert_eq!("TSV".parse::<TableFormat>().unwrap(), TableFormat::TSV);
        assert!("xlsx".parse::<TableFormat>().is_err());
        assert_eq!(TableFormat::TSV.delimiter(), b'\t');
        assert_eq!(TableFormat::default().extension(), ".csv");
    }

    #[test]
    fn test_list_files_with_suffix() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.csv", "a.csv", "c.txt", "d.csv.bak"] {
            File::create(dir.path().join(name))?;
        }
        std::fs::create_dir(dir.path().join("e.csv"))?;

        let files = list_files_with_suffix(dir.path(), ".csv")?;
        let names: Vec<String> = files.iter().map(|p| file_name_of(p)).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
        Ok(())
    }

    #[test]
    fn test_table_roundtrip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut df = df!(
            "transcript_id" => ["t1", "t2"],
            "value" => [Some(1.5), None],
        )?;
        let path = dir.path().join("nested").join("out.csv");
        write_table(&mut df, &path, TableFormat::CSV)?;
        assert_eq!(std::fs::read_to_string(&path)?, "transcript_id,value\nt1,1.5\nt2,\n");

        let back = read_table(&path, TableFormat::CSV)?;
        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.column("value")?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn test_is_gzipped() -> anyhow::Result<()> {
        let mut plain = BufReader::new(std::io::Cursor::new(b">s\nACGT\n".to_vec()));
        assert!(!is_gzipped(&mut plain)?);

        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b">s\nACGT\n")?;
        let mut gz = BufReader::new(std::io::Cursor::new(enc.finish()?));
        assert!(is_gzipped(&mut gz)?);

        let mut empty = BufReader::new(std::io::Cursor::new(Vec::new()));
        assert!(!is_gzipped(&mut empty)?);
        Ok(())
    }
}
