//! Read counts per target and on/off-target accounting per chromosome.

use crate::alignment::{AlignedSegment, AlignmentSource, ContigReadCounts, resolve_contig_name};
use crate::cluster::Cluster;
use crate::errors::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Counts reads overlapping each target and remembers, per chromosome, which
/// distinct reads (name and start) landed on any target.
#[derive(Debug, Clone, Default)]
pub struct ReadCounter {
    count_duplicate_reads: bool,
    on_target: HashMap<String, HashSet<(Vec<u8>, u64)>>,
}

impl ReadCounter {
    pub fn new(count_duplicate_reads: bool) -> Self {
        Self {
            count_duplicate_reads,
            on_target: HashMap::new(),
        }
    }

    /// Read counts index-aligned with `cluster.intervals`; `None` for targets
    /// on a chromosome the store does not know.
    pub fn count_cluster<S: AlignmentSource + ?Sized>(
        &mut self,
        source: &mut S,
        cluster: Cluster<'_>,
    ) -> Result<Vec<Option<u64>>> {
        let Some(contig) =
            resolve_contig_name(cluster.chromosome(), source.contig_names()).map(str::to_string)
        else {
            return Ok(vec![None; cluster.len()]);
        };

        let intervals = cluster.intervals;
        // Running maximum of interval ends, so the first target that can reach
        // a read start is found by binary search.
        let reach: Vec<u64> = intervals
            .iter()
            .scan(0_u64, |max_end, interval| {
                *max_end = (*max_end).max(interval.end);
                Some(*max_end)
            })
            .collect();

        let mut counts = vec![0_u64; intervals.len()];
        let credited = self.on_target.entry(contig.clone()).or_default();
        let count_duplicates = self.count_duplicate_reads;
        let (span_start, span_end) = cluster.span();
        let mut segments = 0_u64;

        source.for_each_segment(
            &contig,
            span_start,
            span_end,
            &mut |segment: &AlignedSegment<'_>| {
                if segment.is_duplicate && !count_duplicates {
                    return;
                }
                segments += 1;

                let first = reach.partition_point(|&end| end <= segment.start);
                let last = intervals.partition_point(|interval| interval.start < segment.end);
                let mut on_target = false;
                for (index, interval) in intervals.iter().enumerate().take(last).skip(first) {
                    if interval.overlaps(segment.start, segment.end) {
                        counts[index] += 1;
                        on_target = true;
                    }
                }
                if on_target {
                    credited.insert((segment.name.to_vec(), segment.start));
                }
            },
        )?;

        debug!(
            chromosome = %contig,
            start = span_start,
            end = span_end,
            segments,
            "counted cluster reads"
        );
        Ok(counts.into_iter().map(Some).collect())
    }

    /// Folds in the distinct reads seen by another counter.
    pub fn merge(&mut self, other: ReadCounter) {
        for (contig, reads) in other.on_target {
            self.on_target.entry(contig).or_default().extend(reads);
        }
    }

    /// Distinct on-target reads per store chromosome.
    pub fn on_target_counts(&self) -> BTreeMap<String, u64> {
        self.on_target
            .iter()
            .map(|(contig, reads)| (contig.clone(), reads.len() as u64))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigCoverage {
    pub name: String,
    pub mapped: u64,
    pub on_target: u64,
}

impl ContigCoverage {
    pub fn off_target(&self) -> u64 {
        self.mapped.saturating_sub(self.on_target)
    }
}

/// Whole-file read totals with on/off-target split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChromosomeCoverage {
    pub total: u64,
    pub unmapped: u64,
    pub mapped: u64,
    pub on_target: u64,
    pub contigs: Vec<ContigCoverage>,
}

impl ChromosomeCoverage {
    pub fn from_counts(index: &[ContigReadCounts], on_target: &BTreeMap<String, u64>) -> Self {
        let mut coverage = Self::default();
        for row in index {
            coverage.unmapped += row.unmapped;
            coverage.mapped += row.mapped;
            if row.name == "*" {
                continue;
            }

            let credited = on_target.get(&row.name).copied().unwrap_or(0);
            coverage.on_target += credited;
            coverage.contigs.push(ContigCoverage {
                name: row.name.clone(),
                mapped: row.mapped,
                on_target: credited,
            });
        }
        coverage.total = coverage.mapped + coverage.unmapped;
        coverage
    }

    pub fn off_target(&self) -> u64 {
        self.mapped.saturating_sub(self.on_target)
    }
}
