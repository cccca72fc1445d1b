//! Per-base depth and quality profiling of target intervals.
//!
//! A cluster of nearby targets is served by a single column scan over the
//! cluster span. Each column is reduced once into [`ColumnStats`] and then
//! copied into every target that contains the position, so overlapping
//! targets cost no extra I/O.

use crate::alignment::{AlignmentSource, PileupColumn, ReadObservation, resolve_contig_name};
use crate::cluster::Cluster;
use crate::errors::Result;
use crate::histogram::QualityHistogram;
use crate::interval::GenomicInterval;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PileupOptions {
    pub low_base_quality: u8,
    pub low_mapping_quality: u8,
    pub count_duplicate_reads: bool,
    pub directional: bool,
}

impl Default for PileupOptions {
    fn default() -> Self {
        Self {
            low_base_quality: 10,
            low_mapping_quality: 20,
            count_duplicate_reads: true,
            directional: false,
        }
    }
}

/// A value split by read orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stranded<T> {
    pub forward: T,
    pub reverse: T,
}

impl<T> Stranded<T> {
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Stranded<U> {
        Stranded {
            forward: f(&self.forward),
            reverse: f(&self.reverse),
        }
    }
}

/// Per-base arrays for one read orientation (or both combined).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrandProfile {
    pub coverage: Vec<u32>,
    pub quality_coverage: Vec<u32>,
    pub median_base_quality: Vec<Option<f64>>,
    pub low_base_quality_fraction: Vec<Option<f64>>,
    pub median_mapping_quality: Vec<Option<f64>>,
    pub low_mapping_quality_fraction: Vec<Option<f64>>,
}

impl StrandProfile {
    fn with_len(len: usize) -> Self {
        Self {
            coverage: vec![0; len],
            quality_coverage: vec![0; len],
            median_base_quality: vec![None; len],
            low_base_quality_fraction: vec![None; len],
            median_mapping_quality: vec![None; len],
            low_mapping_quality_fraction: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.coverage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.is_empty()
    }

    fn record(&mut self, offset: usize, column: &StrandColumn) {
        self.coverage[offset] = column.depth;
        self.quality_coverage[offset] = column.quality_depth;
        self.median_base_quality[offset] = column.median_base_quality;
        self.low_base_quality_fraction[offset] = column.low_base_quality_fraction;
        self.median_mapping_quality[offset] = column.median_mapping_quality;
        self.low_mapping_quality_fraction[offset] = column.low_mapping_quality_fraction;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerBaseProfile {
    pub interval: GenomicInterval,
    pub total: StrandProfile,
    /// Present only in directional mode.
    pub strands: Option<Stranded<StrandProfile>>,
}

impl PerBaseProfile {
    fn empty(interval: &GenomicInterval, directional: bool) -> Self {
        let len = usize::try_from(interval.len()).unwrap_or(0);
        Self {
            interval: interval.clone(),
            total: StrandProfile::with_len(len),
            strands: directional.then(|| Stranded {
                forward: StrandProfile::with_len(len),
                reverse: StrandProfile::with_len(len),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.total.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    fn record(&mut self, position: u64, stats: &ColumnStats) {
        let Some(offset) = position
            .checked_sub(self.interval.start)
            .and_then(|offset| usize::try_from(offset).ok())
            .filter(|&offset| offset < self.len())
        else {
            return;
        };

        self.total.record(offset, &stats.total);
        if let (Some(strands), Some(column)) = (self.strands.as_mut(), stats.strands.as_ref()) {
            strands.forward.record(offset, &column.forward);
            strands.reverse.record(offset, &column.reverse);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrandColumn {
    pub depth: u32,
    pub quality_depth: u32,
    pub median_base_quality: Option<f64>,
    pub low_base_quality_fraction: Option<f64>,
    pub median_mapping_quality: Option<f64>,
    pub low_mapping_quality_fraction: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColumnStats {
    pub total: StrandColumn,
    pub strands: Option<Stranded<StrandColumn>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ColumnAccumulator {
    base_qualities: QualityHistogram,
    mapping_qualities: QualityHistogram,
    depth: u32,
    quality_depth: u32,
}

impl ColumnAccumulator {
    #[inline]
    fn observe(&mut self, read: &ReadObservation, options: &PileupOptions) {
        self.depth += 1;
        let mapping_passes = read.mapping_quality >= options.low_mapping_quality;

        match read.base_quality {
            None => {
                if mapping_passes {
                    self.quality_depth += 1;
                }
            }
            Some(base_quality) => {
                self.base_qualities.add(base_quality);
                self.mapping_qualities.add(read.mapping_quality);
                if mapping_passes && base_quality >= options.low_base_quality {
                    self.quality_depth += 1;
                }
            }
        }
    }

    fn finish(&mut self, options: &PileupOptions) -> StrandColumn {
        let column = StrandColumn {
            depth: self.depth,
            quality_depth: self.quality_depth,
            median_base_quality: self.base_qualities.median(),
            low_base_quality_fraction: self
                .base_qualities
                .fraction_below(options.low_base_quality),
            median_mapping_quality: self.mapping_qualities.median(),
            low_mapping_quality_fraction: self
                .mapping_qualities
                .fraction_below(options.low_mapping_quality),
        };
        self.base_qualities.reset();
        self.mapping_qualities.reset();
        self.depth = 0;
        self.quality_depth = 0;
        column
    }
}

/// Targets of a cluster whose start has been passed but whose end has not.
struct ActiveWindow<'a> {
    intervals: &'a [GenomicInterval],
    next: usize,
    active: Vec<usize>,
}

impl<'a> ActiveWindow<'a> {
    fn new(intervals: &'a [GenomicInterval]) -> Self {
        Self {
            intervals,
            next: 0,
            active: Vec::new(),
        }
    }

    // Positions must be visited in non-decreasing order.
    fn advance(&mut self, position: u64) -> &[usize] {
        while self.next < self.intervals.len() && self.intervals[self.next].start <= position {
            self.active.push(self.next);
            self.next += 1;
        }
        let intervals = self.intervals;
        self.active.retain(|&index| intervals[index].end > position);
        &self.active
    }
}

#[derive(Debug, Clone, Default)]
pub struct PileupAccumulator {
    options: PileupOptions,
}

impl PileupAccumulator {
    pub fn new(options: PileupOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PileupOptions {
        &self.options
    }

    /// Profiles every target of `cluster`, index-aligned with
    /// `cluster.intervals`. Targets on a chromosome the store does not know
    /// come back as `None`.
    pub fn profile_cluster<S: AlignmentSource + ?Sized>(
        &self,
        source: &mut S,
        cluster: Cluster<'_>,
    ) -> Result<Vec<Option<PerBaseProfile>>> {
        let Some(contig) =
            resolve_contig_name(cluster.chromosome(), source.contig_names()).map(str::to_string)
        else {
            warn!(
                chromosome = cluster.chromosome(),
                targets = cluster.len(),
                "chromosome not present in alignment header; skipping targets"
            );
            return Ok(vec![None; cluster.len()]);
        };

        let mut profiles: Vec<PerBaseProfile> = cluster
            .intervals
            .iter()
            .map(|interval| PerBaseProfile::empty(interval, self.options.directional))
            .collect();
        let (span_start, span_end) = cluster.span();
        let mut window = ActiveWindow::new(cluster.intervals);
        let mut columns = 0_u64;

        source.for_each_column(&contig, span_start, span_end, &mut |column: &PileupColumn| {
            columns += 1;
            let stats = self.summarize_column(column);
            for &index in window.advance(column.position) {
                profiles[index].record(column.position, &stats);
            }
        })?;

        debug!(
            chromosome = %contig,
            start = span_start,
            end = span_end,
            targets = cluster.len(),
            columns,
            "profiled cluster"
        );
        Ok(profiles.into_iter().map(Some).collect())
    }

    /// Reduces one pileup column to depth counts and quality statistics.
    pub fn summarize_column(&self, column: &PileupColumn) -> ColumnStats {
        let mut total = ColumnAccumulator::default();
        let mut forward = ColumnAccumulator::default();
        let mut reverse = ColumnAccumulator::default();

        for read in &column.reads {
            if read.is_duplicate && !self.options.count_duplicate_reads {
                continue;
            }
            total.observe(read, &self.options);
            if self.options.directional {
                if read.is_reverse {
                    reverse.observe(read, &self.options);
                } else {
                    forward.observe(read, &self.options);
                }
            }
        }

        ColumnStats {
            total: total.finish(&self.options),
            strands: self.options.directional.then(|| Stranded {
                forward: forward.finish(&self.options),
                reverse: reverse.finish(&self.options),
            }),
        }
    }
}
