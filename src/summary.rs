//! Region-level reductions of a per-base profile and pass/fail evaluation.

use crate::errors::{AppError, Result};
use crate::pileup::{PerBaseProfile, StrandProfile, Stranded};
use crate::utils::{max_present, median_depth, py_round};
use std::collections::BTreeMap;
use std::fmt;

const FRACTION_DIGITS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SummaryMetric {
    MedianCoverage,
    MinCoverage,
    MedianQualityCoverage,
    MinQualityCoverage,
    MaxLowMappingQualityFraction,
    MaxLowBaseQualityFraction,
}

impl SummaryMetric {
    /// Column order of the regions output.
    pub const ALL: [Self; 6] = [
        Self::MedianCoverage,
        Self::MinCoverage,
        Self::MedianQualityCoverage,
        Self::MinQualityCoverage,
        Self::MaxLowMappingQualityFraction,
        Self::MaxLowBaseQualityFraction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::MedianCoverage => "MEDCOV",
            Self::MinCoverage => "MINCOV",
            Self::MedianQualityCoverage => "MEDQCOV",
            Self::MinQualityCoverage => "MINQCOV",
            Self::MaxLowMappingQualityFraction => "MAXFLMQ",
            Self::MaxLowBaseQualityFraction => "MAXFLBQ",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Both,
    Forward,
    Reverse,
}

impl Strand {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Both => "",
            Self::Forward => "_f",
            Self::Reverse => "_r",
        }
    }
}

/// Scalar reductions of one [`StrandProfile`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrandSummary {
    pub median_coverage: Option<f64>,
    pub min_coverage: Option<u32>,
    pub median_quality_coverage: Option<f64>,
    pub min_quality_coverage: Option<u32>,
    pub max_low_mapping_quality_fraction: Option<f64>,
    pub max_low_base_quality_fraction: Option<f64>,
}

impl StrandSummary {
    pub fn from_profile(profile: &StrandProfile) -> Self {
        Self {
            median_coverage: median_depth(&profile.coverage),
            min_coverage: profile.coverage.iter().copied().min(),
            median_quality_coverage: median_depth(&profile.quality_coverage),
            min_quality_coverage: profile.quality_coverage.iter().copied().min(),
            max_low_mapping_quality_fraction: max_present(&profile.low_mapping_quality_fraction)
                .map(|fraction| py_round(fraction, FRACTION_DIGITS)),
            max_low_base_quality_fraction: max_present(&profile.low_base_quality_fraction)
                .map(|fraction| py_round(fraction, FRACTION_DIGITS)),
        }
    }

    pub fn metric(&self, metric: SummaryMetric) -> Option<f64> {
        match metric {
            SummaryMetric::MedianCoverage => self.median_coverage,
            SummaryMetric::MinCoverage => self.min_coverage.map(f64::from),
            SummaryMetric::MedianQualityCoverage => self.median_quality_coverage,
            SummaryMetric::MinQualityCoverage => self.min_quality_coverage.map(f64::from),
            SummaryMetric::MaxLowMappingQualityFraction => self.max_low_mapping_quality_fraction,
            SummaryMetric::MaxLowBaseQualityFraction => self.max_low_base_quality_fraction,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionSummary {
    pub total: StrandSummary,
    pub strands: Option<Stranded<StrandSummary>>,
}

impl RegionSummary {
    pub fn from_profile(profile: &PerBaseProfile) -> Self {
        Self {
            total: StrandSummary::from_profile(&profile.total),
            strands: profile
                .strands
                .as_ref()
                .map(|strands| strands.map(StrandSummary::from_profile)),
        }
    }

    /// `None` for a strand variant when the summary was not computed per strand.
    pub fn metric(&self, metric: SummaryMetric, strand: Strand) -> Option<f64> {
        match strand {
            Strand::Both => self.total.metric(metric),
            Strand::Forward => self.strands.and_then(|s| s.forward.metric(metric)),
            Strand::Reverse => self.strands.and_then(|s| s.reverse.metric(metric)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criterion {
    pub metric: SummaryMetric,
    pub strand: Strand,
    pub bound: Bound,
    pub threshold: f64,
}

impl Criterion {
    /// A missing metric value never fails.
    pub fn holds(&self, summary: &RegionSummary) -> bool {
        let Some(value) = summary.metric(self.metric, self.strand) else {
            return true;
        };
        match self.bound {
            Bound::Min => value >= self.threshold,
            Bound::Max => value <= self.threshold,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = match self.bound {
            Bound::Min => "MIN",
            Bound::Max => "MAX",
        };
        write!(
            f,
            "{}{}_{bound}={}",
            self.metric.name(),
            self.strand.suffix(),
            self.threshold
        )
    }
}

/// Validated `{METRIC}[_f|_r]_{MIN|MAX}` criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassThresholds {
    criteria: Vec<Criterion>,
}

impl PassThresholds {
    pub fn parse(entries: &BTreeMap<String, f64>, directional: bool) -> Result<Self> {
        let criteria = entries
            .iter()
            .map(|(key, &threshold)| parse_criterion(key, threshold, directional))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { criteria })
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn first_failure(&self, summary: &RegionSummary) -> Option<&Criterion> {
        self.criteria
            .iter()
            .find(|criterion| !criterion.holds(summary))
    }

    pub fn passes(&self, summary: &RegionSummary) -> bool {
        self.first_failure(summary).is_none()
    }
}

fn parse_criterion(key: &str, threshold: f64, directional: bool) -> Result<Criterion> {
    let invalid = |reason: &str| AppError::InvalidThreshold {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if !threshold.is_finite() {
        return Err(invalid("threshold must be a finite number"));
    }

    let (name, bound) = key
        .rsplit_once('_')
        .ok_or_else(|| invalid("expected METRIC_MIN or METRIC_MAX"))?;
    let bound = match bound {
        "MIN" => Bound::Min,
        "MAX" => Bound::Max,
        _ => return Err(invalid("bound must be MIN or MAX")),
    };

    let (name, strand) = if let Some(name) = name.strip_suffix("_f") {
        (name, Strand::Forward)
    } else if let Some(name) = name.strip_suffix("_r") {
        (name, Strand::Reverse)
    } else {
        (name, Strand::Both)
    };
    if strand != Strand::Both && !directional {
        return Err(invalid("strand metrics require directional mode"));
    }

    let metric = SummaryMetric::from_name(name).ok_or_else(|| invalid("unknown metric"))?;
    Ok(Criterion {
        metric,
        strand,
        bound,
        threshold,
    })
}

/// Reduces per-base profiles to region summaries and applies the thresholds.
#[derive(Debug, Clone, Default)]
pub struct RegionSummarizer {
    thresholds: PassThresholds,
}

impl RegionSummarizer {
    pub fn new(thresholds: PassThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PassThresholds {
        &self.thresholds
    }

    pub fn summarize(&self, profile: &PerBaseProfile) -> (RegionSummary, bool) {
        let summary = RegionSummary::from_profile(profile);
        let passed = self.thresholds.passes(&summary);
        (summary, passed)
    }
}
