//! Read-store seam consumed by the profiling engine.

use crate::errors::Result;

/// One read covering a pileup column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadObservation {
    pub mapping_quality: u8,
    /// `None` when the read carries a deletion at this position.
    pub base_quality: Option<u8>,
    pub is_reverse: bool,
    pub is_duplicate: bool,
}

impl ReadObservation {
    pub fn is_deletion(&self) -> bool {
        self.base_quality.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PileupColumn {
    pub position: u64,
    pub reads: Vec<ReadObservation>,
}

/// A mapped read overlapping a queried span, as seen by read counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedSegment<'a> {
    pub name: &'a [u8],
    pub start: u64,
    pub end: u64,
    pub is_duplicate: bool,
}

/// Per-contig totals taken from the store's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigReadCounts {
    pub name: String,
    pub length: u64,
    pub mapped: u64,
    pub unmapped: u64,
}

/// Streaming access to aligned reads.
///
/// Handles are not shared between workers; each worker opens its own.
pub trait AlignmentSource {
    fn contig_names(&self) -> &[String];

    /// Visits every pileup column with at least one read inside
    /// `[start, end)` on `chromosome`, in increasing position order.
    fn for_each_column(
        &mut self,
        chromosome: &str,
        start: u64,
        end: u64,
        visit: &mut dyn FnMut(&PileupColumn),
    ) -> Result<()>;

    /// Visits every mapped read overlapping `[start, end)`, ordered by start.
    fn for_each_segment(
        &mut self,
        chromosome: &str,
        start: u64,
        end: u64,
        visit: &mut dyn FnMut(&AlignedSegment<'_>),
    ) -> Result<()>;

    /// Mapped and unmapped totals per contig, in header order. Reads without a
    /// contig are reported under the name `*`.
    fn contig_read_counts(&mut self) -> Result<Vec<ContigReadCounts>>;
}

/// Maps a target chromosome name onto the store's naming convention.
///
/// Tries the literal name, then with a `chr` prefix added, then with the
/// prefix removed; `MT` additionally maps to `chrM`. This heuristic is tuned
/// for human assemblies and may mis-resolve other naming schemes.
pub fn resolve_contig_name<'a>(chromosome: &str, contigs: &'a [String]) -> Option<&'a str> {
    let find = |candidate: &str| {
        contigs
            .iter()
            .find(|name| name.as_str() == candidate)
            .map(String::as_str)
    };

    find(chromosome)
        .or_else(|| find(&format!("chr{chromosome}")))
        .or_else(|| chromosome.strip_prefix("chr").and_then(|bare| find(bare)))
        .or_else(|| (chromosome == "MT").then(|| find("chrM")).flatten())
}

#[cfg(test)]
mod tests {
    use super::resolve_contig_name;

    fn contigs(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn prefers_literal_name() {
        let names = contigs(&["1", "chr1"]);
        assert_eq!(resolve_contig_name("1", &names), Some("1"));
        assert_eq!(resolve_contig_name("chr1", &names), Some("chr1"));
    }

    #[test]
    fn adds_or_strips_chr_prefix() {
        let prefixed = contigs(&["chr1", "chrX"]);
        assert_eq!(resolve_contig_name("X", &prefixed), Some("chrX"));

        let bare = contigs(&["1", "X"]);
        assert_eq!(resolve_contig_name("chr1", &bare), Some("1"));
    }

    #[test]
    fn maps_mitochondrial_alias() {
        let names = contigs(&["chr1", "chrM"]);
        assert_eq!(resolve_contig_name("MT", &names), Some("chrM"));
        assert_eq!(resolve_contig_name("M", &names), Some("chrM"));
    }

    #[test]
    fn unresolvable_name_yields_none() {
        let names = contigs(&["chr1"]);
        assert_eq!(resolve_contig_name("GL000192.1", &names), None);
    }
}
