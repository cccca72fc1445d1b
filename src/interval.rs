use crate::errors::{AppError, Result};
use flate2::read::MultiGzDecoder;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Half-open, 0-based target interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicInterval {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub name: String,
}

impl GenomicInterval {
    pub fn new(
        chromosome: impl Into<String>,
        start: u64,
        end: u64,
        name: Option<String>,
    ) -> Result<Self> {
        let chromosome = chromosome.into();
        if end < start {
            return Err(AppError::ParseError {
                message: format!("interval end {end} precedes start {start} on {chromosome}"),
            });
        }
        let name = name.unwrap_or_else(|| format!("{chromosome}:{start}-{end}"));
        Ok(Self {
            chromosome,
            start,
            end,
            name,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, position: u64) -> bool {
        self.start <= position && position < self.end
    }

    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

impl Ord for GenomicInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_chromosomes(&self.chromosome, &other.chromosome)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for GenomicInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Natural contig order: numbered contigs, then X, Y, M/MT, then the rest by name.
pub fn compare_chromosomes(left: &str, right: &str) -> Ordering {
    let (left_group, left_rank) = chromosome_sort_class(left);
    let (right_group, right_rank) = chromosome_sort_class(right);
    left_group
        .cmp(&right_group)
        .then(left_rank.cmp(&right_rank))
        .then_with(|| left.cmp(right))
}

fn chromosome_sort_class(chrom: &str) -> (u8, u32) {
    let normalized = strip_chr_prefix(chrom.trim());

    if let Some(num) = parse_u32_ascii(normalized.as_bytes()) {
        return (0, num);
    }

    if normalized.eq_ignore_ascii_case("X") {
        (1, 23)
    } else if normalized.eq_ignore_ascii_case("Y") {
        (1, 24)
    } else if normalized.eq_ignore_ascii_case("M") || normalized.eq_ignore_ascii_case("MT") {
        (1, 25)
    } else {
        (2, 0)
    }
}

fn strip_chr_prefix(raw: &str) -> &str {
    match raw.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") => &raw[3..],
        _ => raw,
    }
}

fn parse_u32_ascii(raw: &[u8]) -> Option<u32> {
    if raw.is_empty() {
        return None;
    }

    let mut value: u32 = 0;
    for &byte in raw {
        if !byte.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(u32::from(byte - b'0'))?;
    }
    Some(value)
}

/// Reads a BED file (optionally gzip-compressed) and returns intervals with
/// unique names, in file order.
pub fn read_bed_file(path: impl AsRef<Path>) -> Result<Vec<GenomicInterval>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let source_name = path.display().to_string();
    let is_gz = path.extension().is_some_and(|ext| ext == "gz");

    if is_gz {
        parse_bed(BufReader::new(MultiGzDecoder::new(file)), &source_name)
    } else {
        parse_bed(BufReader::new(file), &source_name)
    }
}

pub fn parse_bed<R: BufRead>(reader: R, source_name: &str) -> Result<Vec<GenomicInterval>> {
    let mut intervals = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("track")
            || trimmed.starts_with("browser")
        {
            continue;
        }

        let columns: Vec<&str> = trimmed.split('\t').collect();
        if columns.len() < 4 {
            return Err(malformed(
                source_name,
                line_number,
                format!(
                    "expected at least 4 tab-separated columns (chrom, start, end, name), found {}",
                    columns.len()
                ),
            ));
        }

        let start = parse_coordinate(columns[1], source_name, line_number)?;
        let end = parse_coordinate(columns[2], source_name, line_number)?;
        if end < start {
            return Err(malformed(
                source_name,
                line_number,
                format!("end {end} precedes start {start}"),
            ));
        }

        let name = columns[3].trim();
        if name.is_empty() {
            return Err(malformed(source_name, line_number, "empty region name".to_string()));
        }
        intervals.push(GenomicInterval::new(
            columns[0].trim(),
            start,
            end,
            Some(name.to_string()),
        )?);
    }

    Ok(uniquify_names(intervals))
}

/// Renames intervals sharing a name to `{name}_{k}`, numbered in first-seen
/// order. A `{name}_1` without a matching `{name}_2` keeps the bare name.
pub fn uniquify_names(mut intervals: Vec<GenomicInterval>) -> Vec<GenomicInterval> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut candidates = Vec::with_capacity(intervals.len());
    for interval in &intervals {
        let counter = seen.entry(interval.name.clone()).or_insert(0);
        *counter += 1;
        candidates.push(format!("{}_{}", interval.name, counter));
    }

    let assigned: HashSet<String> = candidates.iter().cloned().collect();
    for (interval, candidate) in intervals.iter_mut().zip(candidates) {
        interval.name = match candidate.strip_suffix("_1") {
            Some(base) if !assigned.contains(&format!("{base}_2")) => base.to_string(),
            _ => candidate,
        };
    }
    intervals
}

fn parse_coordinate(raw: &str, source_name: &str, line: usize) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| malformed(source_name, line, format!("invalid coordinate: {raw}")))
}

fn malformed(source_name: &str, line: usize, reason: String) -> AppError {
    AppError::MalformedInterval {
        source_name: source_name.to_string(),
        line,
        reason,
    }
}
