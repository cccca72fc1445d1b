use crate::errors::{AppError, Result};
use crate::interval::GenomicInterval;

pub const DEFAULT_CLUSTER_SIZE_LIMIT: u64 = 100_000;

/// Nearby targets on one chromosome, scanned together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cluster<'a> {
    pub intervals: &'a [GenomicInterval],
}

impl<'a> Cluster<'a> {
    pub fn chromosome(&self) -> &'a str {
        self.intervals
            .first()
            .map(|interval| interval.chromosome.as_str())
            .unwrap_or_default()
    }

    /// Smallest half-open span covering every interval of the cluster.
    pub fn span(&self) -> (u64, u64) {
        let start = self.intervals.first().map_or(0, |interval| interval.start);
        let end = self
            .intervals
            .iter()
            .map(|interval| interval.end)
            .max()
            .unwrap_or(start);
        (start, end)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Owns the sorted target list and hands out clusters and worker partitions
/// as borrowed slices of it.
#[derive(Debug, Clone)]
pub struct IntervalClusterer {
    intervals: Vec<GenomicInterval>,
    size_limit: u64,
}

impl IntervalClusterer {
    pub fn new(mut intervals: Vec<GenomicInterval>, size_limit: u64) -> Result<Self> {
        if intervals.is_empty() {
            return Err(AppError::NoRegions);
        }
        intervals.sort();
        Ok(Self {
            intervals,
            size_limit,
        })
    }

    pub fn intervals(&self) -> &[GenomicInterval] {
        &self.intervals
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    pub fn clusters(&self) -> Clusters<'_> {
        Clusters::new(&self.intervals, self.size_limit)
    }

    /// Splits the sorted targets into at most `workers` contiguous ranges of
    /// roughly equal size. A run of same-chromosome targets is never split.
    pub fn partition(&self, workers: usize) -> Vec<&[GenomicInterval]> {
        partition_by_chromosome(&self.intervals, workers)
    }
}

/// Lazy cluster iterator over a sorted interval slice.
#[derive(Debug, Clone)]
pub struct Clusters<'a> {
    remaining: &'a [GenomicInterval],
    size_limit: u64,
}

impl<'a> Clusters<'a> {
    pub fn new(sorted: &'a [GenomicInterval], size_limit: u64) -> Self {
        Self {
            remaining: sorted,
            size_limit,
        }
    }
}

impl<'a> Iterator for Clusters<'a> {
    type Item = Cluster<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.remaining.first()?;
        let mut taken = 1;
        for interval in &self.remaining[1..] {
            if interval.chromosome != first.chromosome
                || interval.end.saturating_sub(first.start) > self.size_limit
            {
                break;
            }
            taken += 1;
        }

        let (cluster, rest) = self.remaining.split_at(taken);
        self.remaining = rest;
        Some(Cluster { intervals: cluster })
    }
}

pub fn partition_by_chromosome(
    sorted: &[GenomicInterval],
    workers: usize,
) -> Vec<&[GenomicInterval]> {
    if sorted.is_empty() {
        return Vec::new();
    }

    let workers = workers.max(1);
    let target = sorted.len().div_ceil(workers);
    let mut partitions = Vec::with_capacity(workers);
    let mut partition_start = 0;
    let mut run_start = 0;

    while run_start < sorted.len() {
        let chromosome = &sorted[run_start].chromosome;
        let run_len = sorted[run_start..]
            .iter()
            .take_while(|interval| &interval.chromosome == chromosome)
            .count();
        let run_end = run_start + run_len;

        let remaining_slots = workers - partitions.len();
        if run_end - partition_start >= target && remaining_slots > 1 {
            partitions.push(&sorted[partition_start..run_end]);
            partition_start = run_end;
        }
        run_start = run_end;
    }

    if partition_start < sorted.len() {
        partitions.push(&sorted[partition_start..]);
    }
    partitions
}
