pub mod fasta;
pub mod quant;
pub use fasta::{fasta_to_table, SequenceEntry};
pub use quant::{read_quant_file, run_id_from_file_name, QUANT_FIELDS};
