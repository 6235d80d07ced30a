use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use genexp_prep::expression::write_expression_matrix;
use genexp_prep::reader::fasta_to_table;
use genexp_prep::reader::quant::convert_quant_dir;
use genexp_prep::{
    extract_features, merge_datasets, process_expression_dir, ExpressionOptions, ExtractOptions,
    MalformedRowPolicy, MergeOptions, SchemaMismatchPolicy, TableFormat,
};
use peak_alloc::PeakAlloc;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

#[global_allocator]
static PEAK_ALLOC: PeakAlloc = PeakAlloc;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Only report warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Report debugging information
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append codon usage, lengths and GC contents to every sequence table
    /// of a directory, in place
    Features(FeaturesArgs),
    /// Convert a (possibly gzipped) FASTA file into an identifier,sequence table
    FastaToTable { fasta: PathBuf, out: PathBuf },
    /// Convert the Salmon quant.sf files of a directory to CSV
    ConvertQuant {
        input_dir: PathBuf,
        output_dir: PathBuf,
    },
    /// Build the length-scaled TPM matrix of a directory of quant CSV files
    ExpressionMatrix { quant_dir: PathBuf, out: PathBuf },
    /// Compute the median expression of the stable transcripts of every
    /// expression matrix of a directory
    MedianExpression {
        matrix_dir: PathBuf,
        out_dir: PathBuf,
        /// Transcripts whose relative standard deviation across runs is not
        /// below this value are dropped
        #[arg(long, default_value_t = 2.0)]
        rsd_threshold: f64,
    },
    /// Join a DNA feature table with an RNA expression table
    Merge {
        dna: PathBuf,
        rna: PathBuf,
        out: PathBuf,
        /// Key column present in both tables
        #[arg(long, default_value = "transcript_id")]
        on: String,
    },
}

#[derive(Args)]
struct FeaturesArgs {
    /// Directory of sequence tables
    dir: PathBuf,
    /// Table format: csv or tsv
    #[arg(long, default_value = "csv")]
    format: TableFormat,
    /// Name of the gene id column
    #[arg(long, default_value = "gene_id")]
    id_column: String,
    /// Go on with the next table when a header does not match, instead of
    /// stopping
    #[arg(long)]
    skip_mismatched: bool,
    /// Drop rows with a wrong number of cells instead of failing
    #[arg(long)]
    skip_malformed: bool,
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        LevelFilter::WARN
    } else if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run_features(args: FeaturesArgs) -> anyhow::Result<()> {
    let opts = ExtractOptions::default()
        .with_format(args.format)
        .with_id_column(&args.id_column)
        .with_schema_mismatch_policy(if args.skip_mismatched {
            SchemaMismatchPolicy::SkipFile
        } else {
            SchemaMismatchPolicy::AbortDirectory
        })
        .with_malformed_row_policy(if args.skip_malformed {
            MalformedRowPolicy::SkipRow
        } else {
            MalformedRowPolicy::FailFast
        });

    let report = extract_features(&args.dir, &opts)?;
    report.ensure_success()?;
    info!(
        "{} tables processed, {} skipped, {} not visited",
        report.processed(),
        report.skipped(),
        report.not_visited()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let start = Instant::now();
    match cli.command {
        Commands::Features(args) => run_features(args)?,
        Commands::FastaToTable { fasta, out } => {
            let n = fasta_to_table(&fasta, &out)?;
            info!("Wrote {} sequences to {}", n, out.display());
        }
        Commands::ConvertQuant {
            input_dir,
            output_dir,
        } => {
            let written = convert_quant_dir(&input_dir, &output_dir)?;
            info!("Converted {} quant files", written.len());
        }
        Commands::ExpressionMatrix { quant_dir, out } => {
            write_expression_matrix(&quant_dir, &out)?;
        }
        Commands::MedianExpression {
            matrix_dir,
            out_dir,
            rsd_threshold,
        } => {
            let opts = ExpressionOptions::new(rsd_threshold, "Name")?;
            let written = process_expression_dir(&matrix_dir, &out_dir, &opts)
                .with_context(|| format!("Could not process {}", matrix_dir.display()))?;
            info!("Wrote {} median expression tables", written.len());
        }
        Commands::Merge { dna, rna, out, on } => {
            merge_datasets(&dna, &rna, &out, &MergeOptions::new(&on))?;
        }
    }

    debug!("Finished in {:?}", start.elapsed());
    debug!("Peak memory usage was {} GB", PEAK_ALLOC.peak_usage_as_gb());
    Ok(())
}
