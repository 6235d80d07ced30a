use crate::nucleotide::{gc_fraction, wobble_gc, WobblePosition};
use anyhow::bail;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// The nucleotide alphabet, in the order used to enumerate codons.
pub const NUCLEOTIDES: &str = "ACGT";

/// Names of the eight per-record summary columns, in output order. They
/// follow the 64 codon columns in an extended table.
pub const DERIVED_FIELDS: [&str; 8] = [
    "cds_length",
    "utr5_length",
    "utr3_length",
    "utr5_gc",
    "cds_gc",
    "utr3_gc",
    "cds_wobble2_gc",
    "cds_wobble3_gc",
];

lazy_static! {
    /// All 64 codons over `ACGT`, in lexicographic order (`AAA`, `AAC`, ..., `TTT`).
    pub static ref STANDARD_CODONS: CodonAlphabet = CodonAlphabet::from_nucleotides(NUCLEOTIDES);
}

/// An ordered set of codons, together with a lookup from codon to column.
///
/// The order defines the order of the codon columns in an extended table
/// and of [CodonUsage::frequencies].
#[derive(Clone, Debug)]
pub struct CodonAlphabet {
    codons: Vec<String>,
    index: HashMap<[u8; 3], usize>,
}

impl CodonAlphabet {
    /// Builds the alphabet of every length-3 combination of `nucleotides`,
    /// enumerated as the cartesian product in the given order.
    pub fn from_nucleotides(nucleotides: &str) -> CodonAlphabet {
        let bases = nucleotides.as_bytes();
        let mut codons = Vec::with_capacity(bases.len().pow(3));
        for &a in bases {
            for &b in bases {
                for &c in bases {
                    codons.push([a, b, c]);
                }
            }
        }
        let index = codons.iter().enumerate().map(|(i, c)| (*c, i)).collect();
        CodonAlphabet {
            codons: codons
                .iter()
                .map(|c| String::from_utf8_lossy(c).into_owned())
                .collect(),
            index,
        }
    }

    /// Builds an alphabet from an explicit list of codons.
    ///
    /// Every codon must be exactly three ASCII characters long and appear
    /// only once.
    pub fn new<T: AsRef<str>>(codons: &[T]) -> anyhow::Result<CodonAlphabet> {
        let mut index = HashMap::with_capacity(codons.len());
        let mut names = Vec::with_capacity(codons.len());
        for (i, codon) in codons.iter().enumerate() {
            let codon = codon.as_ref();
            let key = match <[u8; 3]>::try_from(codon.as_bytes()) {
                Ok(key) if codon.is_ascii() => key,
                _ => bail!("Codon {:?} is not a triplet of ASCII nucleotides", codon),
            };
            if index.insert(key, i).is_some() {
                bail!("Codon {:?} appears more than once in the alphabet", codon);
            }
            names.push(codon.to_string());
        }
        Ok(CodonAlphabet {
            codons: names,
            index,
        })
    }

    pub fn codons(&self) -> &[String] {
        &self.codons
    }

    pub fn len(&self) -> usize {
        self.codons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codons.is_empty()
    }

    /// Returns the column of `triplet` in this alphabet, if it is part of it.
    pub fn position(&self, triplet: &[u8]) -> Option<usize> {
        let key: [u8; 3] = triplet.try_into().ok()?;
        self.index.get(&key).copied()
    }

    /// Same as [CodonAlphabet::position] for a triplet of characters; a
    /// non-ASCII character is never part of the alphabet.
    fn position_of_chars(&self, triplet: &[char]) -> Option<usize> {
        let [a, b, c] = *triplet else { return None };
        if !(a.is_ascii() && b.is_ascii() && c.is_ascii()) {
            return None;
        }
        self.index.get(&[a as u8, b as u8, c as u8]).copied()
    }
}

/// Relative codon usage of one CDS.
#[derive(Clone, Debug, PartialEq)]
pub struct CodonUsage {
    /// One frequency per codon of the alphabet, in alphabet order.
    pub frequencies: Vec<f64>,
    /// Number of complete triplets in the CDS, i.e. the denominator.
    pub codon_count: usize,
}

impl CodonUsage {
    /// Looks up the frequency of `codon` in `alphabet`.
    pub fn get(&self, alphabet: &CodonAlphabet, codon: &str) -> Option<f64> {
        alphabet
            .position(codon.as_bytes())
            .and_then(|i| self.frequencies.get(i).copied())
    }

    /// Whether the CDS had at least one complete codon. Without one, every
    /// frequency is zero rather than undefined.
    pub fn has_codons(&self) -> bool {
        self.codon_count > 0
    }
}

/// Computes the relative frequency of every codon of `alphabet` in `cds`.
///
/// The CDS is read in non-overlapping triplets from its first base; the 1-2
/// trailing bases of a CDS whose length is not a multiple of three are
/// ignored. Each count is divided by the number of complete triplets, so the
/// frequencies of a CDS made of alphabet codons sum to 1. Triplets that are
/// not in the alphabet (e.g. containing `N`) are not counted but still part
/// of the denominator.
///
/// A CDS shorter than three bases has no codon; all frequencies are then 0.
pub fn codon_frequencies(cds: &str, alphabet: &CodonAlphabet) -> CodonUsage {
    let bases: Vec<char> = cds.chars().collect();
    let codon_count = bases.len() / 3;
    let mut frequencies = vec![0.0f64; alphabet.len()];

    if codon_count == 0 {
        return CodonUsage {
            frequencies,
            codon_count,
        };
    }

    for triplet in bases.chunks_exact(3) {
        if let Some(i) = alphabet.position_of_chars(triplet) {
            frequencies[i] += 1.0;
        }
    }

    let denom = codon_count as f64;
    frequencies.iter_mut().for_each(|f| *f /= denom);

    CodonUsage {
        frequencies,
        codon_count,
    }
}

/// Lengths of the three transcribed segments, in characters. An empty
/// segment has no length ([None]) rather than a length of 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentLengths {
    pub cds_length: Option<usize>,
    pub utr5_length: Option<usize>,
    pub utr3_length: Option<usize>,
}

fn non_empty_len(sequence: &str) -> Option<usize> {
    match sequence.chars().count() {
        0 => None,
        l => Some(l),
    }
}

pub fn segment_lengths(cds: &str, utr5: &str, utr3: &str) -> SegmentLengths {
    SegmentLengths {
        cds_length: non_empty_len(cds),
        utr5_length: non_empty_len(utr5),
        utr3_length: non_empty_len(utr3),
    }
}

/// GC fractions of the three transcribed segments; [None] for an empty segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SegmentGcContent {
    pub utr5_gc: Option<f64>,
    pub cds_gc: Option<f64>,
    pub utr3_gc: Option<f64>,
}

pub fn segment_gc_content(utr5: &str, cds: &str, utr3: &str) -> SegmentGcContent {
    SegmentGcContent {
        utr5_gc: gc_fraction(utr5),
        cds_gc: gc_fraction(cds),
        utr3_gc: gc_fraction(utr3),
    }
}

/// GC fractions at the 2nd and 3rd codon positions of a CDS.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WobbleGcContent {
    pub cds_wobble2_gc: Option<f64>,
    pub cds_wobble3_gc: Option<f64>,
}

pub fn wobble_gc_content(cds: &str) -> WobbleGcContent {
    WobbleGcContent {
        cds_wobble2_gc: wobble_gc(cds, WobblePosition::Second),
        cds_wobble3_gc: wobble_gc(cds, WobblePosition::Third),
    }
}

/// Every derived feature of one gene record.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentFeatures {
    pub codon_usage: CodonUsage,
    pub lengths: SegmentLengths,
    pub gc: SegmentGcContent,
    pub wobble: WobbleGcContent,
}

impl SegmentFeatures {
    /// Computes all features from the three transcribed segments.
    pub fn compute(utr5: &str, cds: &str, utr3: &str, alphabet: &CodonAlphabet) -> Self {
        SegmentFeatures {
            codon_usage: codon_frequencies(cds, alphabet),
            lengths: segment_lengths(cds, utr5, utr3),
            gc: segment_gc_content(utr5, cds, utr3),
            wobble: wobble_gc_content(cds),
        }
    }

    /// Renders the features as table cells: one per codon, then the
    /// [DERIVED_FIELDS] in order.
    ///
    /// Undefined values become empty cells. Codon cells of a CDS without a
    /// complete codon are written as a plain `0`.
    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.codon_usage.frequencies.len() + DERIVED_FIELDS.len());
        if self.codon_usage.has_codons() {
            fields.extend(self.codon_usage.frequencies.iter().map(|&f| format_fraction(f)));
        } else {
            fields.extend(self.codon_usage.frequencies.iter().map(|_| String::from("0")));
        }

        fields.extend(
            [
                self.lengths.cds_length,
                self.lengths.utr5_length,
                self.lengths.utr3_length,
            ]
            .iter()
            .map(|l| format_optional(l.map(|l| l.to_string()))),
        );
        fields.extend(
            [
                self.gc.utr5_gc,
                self.gc.cds_gc,
                self.gc.utr3_gc,
                self.wobble.cds_wobble2_gc,
                self.wobble.cds_wobble3_gc,
            ]
            .iter()
            .map(|v| format_optional(v.map(format_fraction))),
        );
        fields
    }
}

fn format_optional(value: Option<String>) -> String {
    value.unwrap_or_default()
}

/// Formats a fraction with the shortest representation that round-trips,
/// keeping one decimal for integral values (`0.0`, `1.0`) so that the
/// column reads as floating point.
pub fn format_fraction(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Builds the header of an extended table: the `base` columns, followed by
/// one column per codon of `alphabet` and the [DERIVED_FIELDS].
///
/// `base` is left untouched; a new header is returned.
pub fn extended_header<T: AsRef<str>>(base: &[T], alphabet: &CodonAlphabet) -> Vec<String> {
    base.iter()
        .map(|s| s.as_ref().to_string())
        .chain(alphabet.codons().iter().cloned())
        .chain(DERIVED_FIELDS.iter().map(|s| s.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_standard_codons() {
        let codons = STANDARD_CODONS.codons();
        assert_eq!(codons.len(), 64);
        assert_eq!(codons[0], "AAA");
        assert_eq!(codons[1], "AAC");
        assert_eq!(codons[4], "ACA");
        assert_eq!(codons[63], "TTT");
        let mut sorted = codons.to_vec();
        sorted.sort();
        assert_eq!(sorted, codons);
    }

    #[test]
    fn test_codon_alphabet_new() {
        let alphabet = CodonAlphabet::new(&["TTT", "AAA"]).unwrap();
        assert_eq!(alphabet.position(b"TTT"), Some(0));
        assert_eq!(alphabet.position(b"AAA"), Some(1));
        assert_eq!(alphabet.position(b"CCC"), None);

        assert!(CodonAlphabet::new(&["AA"]).is_err());
        assert!(CodonAlphabet::new(&["AAA", "AAA"]).is_err());
    }

    #[test]
    fn test_codon_frequencies_standard_case() {
        let usage = codon_frequencies("AGTCAAAGTTAT", &STANDARD_CODONS);
        assert_eq!(usage.codon_count, 4);
        for codon in STANDARD_CODONS.codons() {
            let f = usage.get(&STANDARD_CODONS, codon).unwrap();
            match codon.as_str() {
                "AGT" => assert_eq!(f, 0.5),
                "CAA" | "TAT" => assert_eq!(f, 0.25),
                _ => assert_eq!(f, 0.0, "codon {}", codon),
            }
        }
    }

    #[test]
    fn test_codon_frequencies_short_cds() {
        for cds in ["", "A", "AG"] {
            let usage = codon_frequencies(cds, &STANDARD_CODONS);
            assert_eq!(usage.codon_count, 0);
            assert!(!usage.has_codons());
            assert_eq!(usage.frequencies.len(), 64);
            assert!(usage.frequencies.iter().all(|&f| f == 0.0));
        }
    }

    #[test]
    fn test_codon_frequencies_sum_to_one() {
        let cdss = [
            "ATG",
            "ATGA",
            "ATGAA",
            "ATGGCCAAGTTTCCCGGGTAA",
            "ACGTACGTACGTACGTACGTACGTACGTACGTACGTAC",
        ];
        for cds in cdss {
            let usage = codon_frequencies(cds, &STANDARD_CODONS);
            let sum: f64 = usage.frequencies.iter().sum();
            assert!((sum - 1.0).abs() < TOLERANCE, "{} sums to {}", cds, sum);
        }
    }

    #[test]
    fn test_codon_frequencies_trailing_bases_ignored() {
        let usage = codon_frequencies("ATGCCGA", &STANDARD_CODONS);
        assert_eq!(usage.codon_count, 2);
        assert_eq!(usage.get(&STANDARD_CODONS, "ATG"), Some(0.5));
        assert_eq!(usage.get(&STANDARD_CODONS, "CCG"), Some(0.5));
        // the leftover "A" never forms a codon
        assert_eq!(usage.get(&STANDARD_CODONS, "AAA"), Some(0.0));
    }

    #[test]
    fn test_codon_frequencies_unknown_triplet() {
        let usage = codon_frequencies("ATGNNN", &STANDARD_CODONS);
        assert_eq!(usage.codon_count, 2);
        assert_eq!(usage.get(&STANDARD_CODONS, "ATG"), Some(0.5));
        let sum: f64 = usage.frequencies.iter().sum();
        assert!((sum - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn test_segment_lengths() {
        let lengths = segment_lengths("AGTCAAAGTTAT", "AAA", "TATAAA");
        assert_eq!(
            lengths,
            SegmentLengths {
                cds_length: Some(12),
                utr5_length: Some(3),
                utr3_length: Some(6),
            }
        );

        let lengths = segment_lengths("", "", "");
        assert_eq!(lengths.cds_length, None);
        assert_eq!(lengths.utr5_length, None);
        assert_eq!(lengths.utr3_length, None);
    }

    #[test]
    fn test_lengths_count_characters() {
        let lengths = segment_lengths("ÉÉÉ", "É", "");
        assert_eq!(lengths.cds_length, Some(3));
        assert_eq!(lengths.utr5_length, Some(1));

        let usage = codon_frequencies("ÉÉÉATG", &STANDARD_CODONS);
        assert_eq!(usage.codon_count, 2);
        assert_eq!(usage.get(&STANDARD_CODONS, "ATG"), Some(0.5));
    }

    #[test]
    fn test_segment_gc_content() {
        let gc = segment_gc_content("AAGTGC", "AGTCAAAGTTAT", "TATAAAGGGCCC");
        assert_eq!(gc.utr5_gc, Some(0.5));
        assert_eq!(gc.cds_gc, Some(0.25));
        assert_eq!(gc.utr3_gc, Some(0.5));

        let gc = segment_gc_content("", "", "");
        assert_eq!(gc.utr5_gc, None);
        assert_eq!(gc.cds_gc, None);
        assert_eq!(gc.utr3_gc, None);
    }

    #[test]
    fn test_wobble_gc_content() {
        let wobble = wobble_gc_content("AGTCGCAAATTT");
        assert_eq!(wobble.cds_wobble2_gc, Some(0.5));
        assert_eq!(wobble.cds_wobble3_gc, Some(0.25));

        let wobble = wobble_gc_content("");
        assert_eq!(wobble.cds_wobble2_gc, None);
        assert_eq!(wobble.cds_wobble3_gc, None);
    }

    #[test]
    fn test_to_fields() {
        let features = SegmentFeatures::compute("AAGTGC", "AGTCAAAGTTAT", "", &STANDARD_CODONS);
        let fields = features.to_fields();
        assert_eq!(fields.len(), 72);

        let agt = STANDARD_CODONS.position(b"AGT").unwrap();
        assert_eq!(fields[agt], "0.5");
        assert_eq!(fields[0], "0.0");

        assert_eq!(
            &fields[64..],
            &["12", "6", "", "0.5", "0.25", "", "0.5", "0.0"]
        );
    }

    #[test]
    fn test_to_fields_empty_cds() {
        let features = SegmentFeatures::compute("", "", "", &STANDARD_CODONS);
        let fields = features.to_fields();
        assert!(fields[..64].iter().all(|f| f == "0"));
        assert!(fields[64..].iter().all(|f| f.is_empty()));
    }

    #[test]
    fn test_format_fraction() {
        assert_eq!(format_fraction(0.0), "0.0");
        assert_eq!(format_fraction(1.0), "1.0");
        assert_eq!(format_fraction(0.25), "0.25");
        assert_eq!(format_fraction(1.0 / 3.0), "0.3333333333333333");
    }

    #[test]
    fn test_extended_header() {
        let base = vec!["a".to_string(), "b".to_string()];
        let header = extended_header(&base, &STANDARD_CODONS);
        assert_eq!(header.len(), 2 + 64 + 8);
        assert_eq!(header[2], "AAA");
        assert_eq!(header[65], "TTT");
        assert_eq!(header[66], "cds_length");
        assert_eq!(header[73], "cds_wobble3_gc");
        // the base header is not modified
        assert_eq!(base.len(), 2);
    }
}
