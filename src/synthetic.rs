//! Deterministic synthetic reads, served from memory or written to an
//! indexed BAM file. Used by the test suite and the fixture generator.

use crate::alignment::{
    AlignedSegment, AlignmentSource, ContigReadCounts, PileupColumn, ReadObservation,
};
use crate::errors::{AppError, Result};
use rust_htslib::bam;
use rust_htslib::bam::header::HeaderRecord;
use rust_htslib::bam::record::{Cigar, CigarString};
use std::path::Path;

pub const HIGH_QUALITY: u8 = 60;

/// `count` identical, gapless reads of `length` bases starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticRead {
    pub chromosome: String,
    pub start: u64,
    pub length: u64,
    pub count: usize,
    pub base_quality: u8,
    pub mapping_quality: u8,
    pub is_reverse: bool,
    pub is_duplicate: bool,
    /// Offset of a single-base deletion, relative to `start`. Only interior
    /// offsets take effect; a CIGAR cannot start or end on a deletion.
    pub deletion_at: Option<u64>,
}

impl SyntheticRead {
    pub fn new(chromosome: impl Into<String>, start: u64, length: u64, count: usize) -> Self {
        Self {
            chromosome: chromosome.into(),
            start,
            length,
            count,
            base_quality: HIGH_QUALITY,
            mapping_quality: HIGH_QUALITY,
            is_reverse: false,
            is_duplicate: false,
            deletion_at: None,
        }
    }

    pub fn with_base_quality(mut self, quality: u8) -> Self {
        self.base_quality = quality;
        self
    }

    pub fn with_mapping_quality(mut self, quality: u8) -> Self {
        self.mapping_quality = quality;
        self
    }

    pub fn reverse(mut self) -> Self {
        self.is_reverse = true;
        self
    }

    pub fn duplicate(mut self) -> Self {
        self.is_duplicate = true;
        self
    }

    pub fn with_deletion_at(mut self, offset: u64) -> Self {
        self.deletion_at = Some(offset);
        self
    }

    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// The deletion offset that both the in-memory source and the BAM writer
    /// honour.
    fn interior_deletion(&self) -> Option<u64> {
        self.deletion_at
            .filter(|&offset| offset > 0 && offset + 1 < self.length)
    }

    fn observation_at(&self, position: u64) -> Option<ReadObservation> {
        if position < self.start || position >= self.end() {
            return None;
        }
        let is_deleted = self
            .interior_deletion()
            .is_some_and(|offset| self.start + offset == position);
        Some(ReadObservation {
            mapping_quality: self.mapping_quality,
            base_quality: (!is_deleted).then_some(self.base_quality),
            is_reverse: self.is_reverse,
            is_duplicate: self.is_duplicate,
        })
    }

    fn cigar(&self) -> CigarString {
        let length = u32::try_from(self.length).unwrap_or(u32::MAX);
        match self.interior_deletion() {
            Some(offset) => {
                let offset = u32::try_from(offset).unwrap_or(0);
                CigarString(vec![
                    Cigar::Match(offset),
                    Cigar::Del(1),
                    Cigar::Match(length - offset - 1),
                ])
            }
            None => CigarString(vec![Cigar::Match(length)]),
        }
    }

    fn query_length(&self) -> usize {
        match self.interior_deletion() {
            Some(_) => self.length as usize - 1,
            None => self.length as usize,
        }
    }
}

/// In-memory [`AlignmentSource`] over a fixed set of synthetic reads.
#[derive(Debug, Clone, Default)]
pub struct SyntheticAlignments {
    contigs: Vec<String>,
    lengths: Vec<u64>,
    reads: Vec<SyntheticRead>,
}

impl SyntheticAlignments {
    pub fn new(contigs: &[(&str, u64)], mut reads: Vec<SyntheticRead>) -> Self {
        reads.sort_by_key(|read| read.start);
        Self {
            contigs: contigs.iter().map(|(name, _)| name.to_string()).collect(),
            lengths: contigs.iter().map(|(_, length)| *length).collect(),
            reads,
        }
    }

    fn reads_on<'a>(&'a self, chromosome: &'a str) -> impl Iterator<Item = &'a SyntheticRead> {
        self.reads
            .iter()
            .filter(move |read| read.chromosome == chromosome)
    }
}

impl AlignmentSource for SyntheticAlignments {
    fn contig_names(&self) -> &[String] {
        &self.contigs
    }

    fn for_each_column(
        &mut self,
        chromosome: &str,
        start: u64,
        end: u64,
        visit: &mut dyn FnMut(&PileupColumn),
    ) -> Result<()> {
        let mut column = PileupColumn::default();
        for position in start..end {
            column.position = position;
            column.reads.clear();
            for read in self.reads_on(chromosome) {
                if let Some(observation) = read.observation_at(position) {
                    column
                        .reads
                        .extend(std::iter::repeat_n(observation, read.count));
                }
            }
            if !column.reads.is_empty() {
                visit(&column);
            }
        }
        Ok(())
    }

    fn for_each_segment(
        &mut self,
        chromosome: &str,
        start: u64,
        end: u64,
        visit: &mut dyn FnMut(&AlignedSegment<'_>),
    ) -> Result<()> {
        for (group, read) in self.reads.iter().enumerate() {
            if read.chromosome != chromosome || read.end() <= start || read.start >= end {
                continue;
            }
            for index in 0..read.count {
                let name = read_name(group, index);
                visit(&AlignedSegment {
                    name: name.as_bytes(),
                    start: read.start,
                    end: read.end(),
                    is_duplicate: read.is_duplicate,
                });
            }
        }
        Ok(())
    }

    fn contig_read_counts(&mut self) -> Result<Vec<ContigReadCounts>> {
        Ok(self
            .contigs
            .iter()
            .zip(&self.lengths)
            .map(|(name, &length)| ContigReadCounts {
                name: name.clone(),
                length,
                mapped: self.reads_on(name).map(|read| read.count as u64).sum(),
                unmapped: 0,
            })
            .collect())
    }
}

fn read_name(group: usize, index: usize) -> String {
    format!("simulated_read_{group}_{index}")
}

/// Writes `reads` to a coordinate-sorted BAM at `path` and builds its `.bai`.
/// Every base is `A`.
pub fn write_bam(path: &Path, contigs: &[(&str, u64)], reads: &[SyntheticRead]) -> Result<()> {
    let mut header = bam::Header::new();
    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", "1.6").push_tag(b"SO", "coordinate");
    header.push_record(&hd);
    for (name, length) in contigs {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", *name).push_tag(b"LN", *length);
        header.push_record(&sq);
    }

    let mut ordered: Vec<(usize, i32, &SyntheticRead)> = Vec::with_capacity(reads.len());
    for (group, read) in reads.iter().enumerate() {
        let tid = contigs
            .iter()
            .position(|(name, _)| *name == read.chromosome)
            .ok_or_else(|| AppError::InvalidValue {
                flag: "chromosome".to_string(),
                value: read.chromosome.clone(),
                reason: "not declared in the synthetic header".to_string(),
            })?;
        ordered.push((group, i32::try_from(tid).unwrap_or(i32::MAX), read));
    }
    ordered.sort_by_key(|(_, tid, read)| (*tid, read.start));

    {
        let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam)?;
        let mut record = bam::Record::new();
        for (group, tid, read) in ordered {
            let sequence = vec![b'A'; read.query_length()];
            let qualities = vec![read.base_quality; read.query_length()];
            let cigar = read.cigar();
            let mut flags = 0_u16;
            if read.is_reverse {
                flags |= 0x10;
            }
            if read.is_duplicate {
                flags |= 0x400;
            }

            for index in 0..read.count {
                let name = read_name(group, index);
                record.set(name.as_bytes(), Some(&cigar), &sequence, &qualities);
                record.set_tid(tid);
                record.set_pos(i64::try_from(read.start).unwrap_or(i64::MAX));
                record.set_mapq(read.mapping_quality);
                record.set_mtid(-1);
                record.set_mpos(-1);
                record.set_insert_size(0);
                record.set_flags(flags);
                writer.write(&record)?;
            }
        }
    }

    bam::index::build(path, None, bam::index::Type::Bai, 1)?;
    Ok(())
}
