/// A codon position whose nucleotides are pooled across a whole CDS when
/// computing wobble GC content.
///
/// Only the 2nd and 3rd positions are of interest, so those are the only
/// two variants; a first-position "wobble" cannot be requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WobblePosition {
    Second,
    Third,
}

impl WobblePosition {
    /// The 0-based offset of this position inside each codon.
    pub fn offset(&self) -> usize {
        match self {
            WobblePosition::Second => 1,
            WobblePosition::Third => 2,
        }
    }
}

impl TryFrom<usize> for WobblePosition {
    type Error = anyhow::Error;

    /// Converts a 1-based codon position into a [WobblePosition].
    fn try_from(position: usize) -> anyhow::Result<WobblePosition> {
        match position {
            2 => Ok(WobblePosition::Second),
            3 => Ok(WobblePosition::Third),
            _ => anyhow::bail!(
                "Wobble GC content is defined for codon positions 2 and 3, got {}",
                position
            ),
        }
    }
}

impl std::fmt::Display for WobblePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WobblePosition::Second => write!(f, "wobble2"),
            WobblePosition::Third => write!(f, "wobble3"),
        }
    }
}

/// Counts the `G` and `C` nucleotides of `sequence`.
///
/// Matching is exact and case sensitive; any other character (including
/// lowercase `g`/`c` and `N`) contributes nothing. An empty sequence yields 0.
///
/// ```
/// use genexp_prep::nucleotide::count_gc;
/// assert_eq!(count_gc("AGTCAAAGTTAT"), 3);
/// assert_eq!(count_gc(""), 0);
/// ```
pub fn count_gc(sequence: &str) -> usize {
    count_gc_chars(sequence.chars())
}

fn count_gc_chars<I: IntoIterator<Item = char>>(bases: I) -> usize {
    bases.into_iter().filter(|&b| b == 'G' || b == 'C').count()
}

/// Computes the GC fraction of the nucleotides found at `position` of every
/// codon of `cds`.
///
/// The pooled subsequence takes every third base starting at
/// [WobblePosition::offset], so the trailing partial codon still contributes
/// when it is long enough to reach the position. Returns [None] when that
/// subsequence is empty, i.e. when `cds` is shorter than the position.
///
/// ```
/// use genexp_prep::nucleotide::{wobble_gc, WobblePosition};
/// assert_eq!(wobble_gc("AGTCGCAAATTT", WobblePosition::Second), Some(0.5));
/// assert_eq!(wobble_gc("A", WobblePosition::Second), None);
/// ```
pub fn wobble_gc(cds: &str, position: WobblePosition) -> Option<f64> {
    let pooled = cds.chars().skip(position.offset()).step_by(3);
    let len = pooled.clone().count();
    if len == 0 {
        return None;
    }
    Some(count_gc_chars(pooled) as f64 / len as f64)
}

/// The GC fraction of a whole sequence, or [None] when it is empty. The
/// length is counted in characters.
pub fn gc_fraction(sequence: &str) -> Option<f64> {
    if sequence.is_empty() {
        None
    } else {
        Some(count_gc(sequence) as f64 / sequence.chars().count() as f64)
    }
}
