//! genexp-prep builds a gene expression training dataset from two kinds of
//! input: the DNA sequence components of every transcript of a species
//! (promoter, 5' UTR, coding sequence, 3' UTR, terminator), and RNA-seq
//! quantification of the same transcripts.
//!
//! The DNA side is handled by [extract], which appends codon usage, segment
//! lengths and GC contents to every sequence table of a directory, rewriting
//! each table in place. The RNA side turns Salmon quant files into a median
//! expression value per transcript ([expression]). [integration] joins both
//! on the transcript id.

pub mod expression;
pub mod extract;
pub mod features;
pub mod integration;
pub mod nucleotide;
pub mod options;
pub mod reader;
pub mod record;
pub mod table_utils;

pub use expression::{calculate_rsd, median_expression, process_expression_dir, ExpressionMatrix};
pub use extract::{extract_features, ExtractionReport, FileOutcome};
pub use features::{CodonAlphabet, SegmentFeatures, STANDARD_CODONS};
pub use integration::merge_datasets;
pub use nucleotide::{count_gc, wobble_gc, WobblePosition};
pub use options::{
    ExpressionOptions, ExtractOptions, MalformedRowPolicy, MergeOptions, SchemaMismatchPolicy,
};
pub use record::{FeatureRecord, GeneRecord, TranscriptId};
pub use table_utils::TableFormat;
