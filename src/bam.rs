use crate::alignment::{
    AlignedSegment, AlignmentSource, ContigReadCounts, PileupColumn, ReadObservation,
};
use crate::errors::{AppError, Result};
use rust_htslib::bam;
use rust_htslib::bam::Read;
use std::path::{Path, PathBuf};

// htslib caps pileup depth at 8000 by default, which would silently truncate
// amplicon data.
const PILEUP_MAX_DEPTH: u32 = 1_000_000;

/// Indexed BAM file read through rust-htslib.
pub struct BamAlignmentSource {
    path: PathBuf,
    reader: bam::IndexedReader,
    contigs: Vec<String>,
}

impl std::fmt::Debug for BamAlignmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamAlignmentSource")
            .field("path", &self.path)
            .field("contigs", &self.contigs.len())
            .finish()
    }
}

impl BamAlignmentSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = bam::IndexedReader::from_path(&path).map_err(|err| AppError::Alignment {
            message: format!("failed to open BAM index reader for {}: {err}", path.display()),
        })?;
        let contigs = reader
            .header()
            .target_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();

        Ok(Self {
            path,
            reader,
            contigs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fetch(&mut self, chromosome: &str, start: u64, end: u64) -> Result<()> {
        let tid = self
            .reader
            .header()
            .tid(chromosome.as_bytes())
            .ok_or_else(|| AppError::Alignment {
                message: format!("chromosome not found in BAM header: {chromosome}"),
            })?;

        self.reader
            .fetch((tid, start, end))
            .map_err(|err| AppError::Alignment {
                message: format!(
                    "failed BAM fetch for {chromosome}:{}-{end}: {err}",
                    start + 1
                ),
            })
    }
}

impl AlignmentSource for BamAlignmentSource {
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
        if end <= start {
            return Ok(());
        }
        self.fetch(chromosome, start, end)?;

        let mut pileups = self.reader.pileup();
        pileups.set_max_depth(PILEUP_MAX_DEPTH);
        let mut column = PileupColumn::default();

        for pileup_result in pileups {
            let pileup = pileup_result.map_err(|err| AppError::Alignment {
                message: format!("failed pileup iteration for {chromosome}: {err}"),
            })?;

            let position = u64::from(pileup.pos());
            if position < start {
                continue;
            }
            if position >= end {
                break;
            }

            column.position = position;
            column.reads.clear();

            for alignment in pileup.alignments() {
                if alignment.is_refskip() {
                    continue;
                }

                let record = alignment.record();
                if record.is_unmapped() {
                    continue;
                }

                let base_quality = if alignment.is_del() {
                    None
                } else {
                    let Some(query_position) = alignment.qpos() else {
                        continue;
                    };
                    let Some(quality) = record.qual().get(query_position).copied() else {
                        continue;
                    };
                    Some(quality)
                };

                column.reads.push(ReadObservation {
                    mapping_quality: record.mapq(),
                    base_quality,
                    is_reverse: record.is_reverse(),
                    is_duplicate: record.is_duplicate(),
                });
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
        if end <= start {
            return Ok(());
        }
        self.fetch(chromosome, start, end)?;

        let mut record = bam::Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result.map_err(|err| AppError::Alignment {
                message: format!("failed BAM record read for {chromosome}: {err}"),
            })?;
            if record.is_unmapped() {
                continue;
            }

            let segment_start = u64::try_from(record.pos()).unwrap_or(0);
            let segment_end = u64::try_from(record.cigar().end_pos()).unwrap_or(0);
            if segment_end <= segment_start || segment_end <= start || segment_start >= end {
                continue;
            }

            visit(&AlignedSegment {
                name: record.qname(),
                start: segment_start,
                end: segment_end,
                is_duplicate: record.is_duplicate(),
            });
        }

        Ok(())
    }

    fn contig_read_counts(&mut self) -> Result<Vec<ContigReadCounts>> {
        let stats = self.reader.index_stats().map_err(|err| AppError::Alignment {
            message: format!(
                "failed to read index statistics for {}: {err}",
                self.path.display()
            ),
        })?;

        Ok(stats
            .into_iter()
            .map(|(tid, length, mapped, unmapped)| {
                let name = usize::try_from(tid)
                    .ok()
                    .and_then(|index| self.contigs.get(index))
                    .cloned()
                    .unwrap_or_else(|| "*".to_string());
                ContigReadCounts {
                    name,
                    length,
                    mapped,
                    unmapped,
                }
            })
            .collect())
    }
}
