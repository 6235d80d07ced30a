use crate::features::{CodonAlphabet, SegmentFeatures};
use anyhow::bail;
use nutype::nutype;

#[nutype(derive(Debug, Clone, PartialEq, Eq, Hash, AsRef, Display))]
/// Stable transcript identifier, the key shared by DNA and RNA tables.
pub struct TranscriptId(String);

/// One row of a sequence table: the sequence components of one transcript.
///
/// Sequences are stored as read; they are expected to be uppercase `ACGT`
/// but this is not checked.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneRecord {
    pub gene_id: String,
    pub transcript_id: TranscriptId,
    pub promoter: String,
    pub utr5: String,
    pub cds: String,
    pub utr3: String,
    pub terminator: String,
}

impl GeneRecord {
    /// Builds a record from the cells of one row laid out in the canonical
    /// column order.
    ///
    /// Fails if the row does not have exactly seven cells.
    pub fn from_fields<'a, I>(fields: I) -> anyhow::Result<GeneRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let cells: Vec<&str> = fields.into_iter().collect();
        let [gene_id, transcript_id, promoter, utr5, cds, utr3, terminator] = cells[..] else {
            bail!(
                "Expected 7 fields (gene id, transcript id, promoter, utr5, cds, utr3, terminator), found {}",
                cells.len()
            );
        };
        Ok(GeneRecord {
            gene_id: gene_id.to_string(),
            transcript_id: TranscriptId::new(transcript_id),
            promoter: promoter.to_string(),
            utr5: utr5.to_string(),
            cds: cds.to_string(),
            utr3: utr3.to_string(),
            terminator: terminator.to_string(),
        })
    }

    /// Computes the derived features of this record.
    pub fn features(&self, alphabet: &CodonAlphabet) -> SegmentFeatures {
        SegmentFeatures::compute(&self.utr5, &self.cds, &self.utr3, alphabet)
    }

    /// The cells of this record in canonical column order.
    pub fn fields(&self) -> [&str; 7] {
        [
            self.gene_id.as_str(),
            self.transcript_id.as_ref(),
            self.promoter.as_str(),
            self.utr5.as_str(),
            self.cds.as_str(),
            self.utr3.as_str(),
            self.terminator.as_str(),
        ]
    }
}

/// A [GeneRecord] extended with its derived features.
///
/// It is produced and written out one row at a time and never kept around.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRecord {
    pub gene: GeneRecord,
    pub features: SegmentFeatures,
}

impl FeatureRecord {
    pub fn new(gene: GeneRecord, alphabet: &CodonAlphabet) -> FeatureRecord {
        let features = gene.features(alphabet);
        FeatureRecord { gene, features }
    }

    /// All cells of the extended row: the seven original cells, one per
    /// codon, then the summary columns.
    pub fn to_fields(&self) -> Vec<String> {
        self.gene
            .fields()
            .iter()
            .map(|s| s.to_string())
            .chain(self.features.to_fields())
            .collect()
    }
}
