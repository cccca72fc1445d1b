//! Transcript models read from a tabix-indexed database, and coding-sequence
//! coordinates (`c.` notation) for genomic positions.
//!
//! Database lines are tab-separated: transcript id, gene symbol, gene id, an
//! unused field, chromosome, strand (`1` or `-1`), transcript start and end,
//! 1-based coding start within the spliced transcript, 1-based genomic coding
//! start, genomic coding end, then one start/end pair per exon in
//! transcription order.

use crate::alignment::resolve_contig_name;
use crate::errors::{AppError, Result};
use rust_htslib::bgzf;
use rust_htslib::htslib;
use rust_htslib::tbx::{self, Read as _};
use std::ffi::CString;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 1-based column numbers handed to the tabix indexer.
const CHROMOSOME_COLUMN: i32 = 5;
const START_COLUMN: i32 = 7;
const END_COLUMN: i32 = 8;
const FIRST_EXON_FIELD: usize = 11;

/// Written where no transcript covers a position.
pub const NO_TRANSCRIPT: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

/// Exon as a 0-based half-open genomic interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exon {
    pub index: usize,
    pub start: i64,
    pub end: i64,
}

impl Exon {
    pub fn new(index: usize, start: i64, end: i64) -> Self {
        Self { index, start, end }
    }

    fn len(&self) -> i64 {
        self.end - self.start
    }

    fn contains(&self, position: i64) -> bool {
        self.start <= position && position < self.end
    }

    /// Signed distance to the closest exon base: negative before the exon,
    /// positive after it, zero inside.
    fn distance_from(&self, position: i64) -> i64 {
        if position < self.start {
            position - self.start
        } else if position >= self.end {
            position - (self.end - 1)
        } else {
            0
        }
    }

    /// 0-based offset of `position` when the exon is read in transcription
    /// order.
    fn offset_of(&self, position: i64, strand: Strand) -> i64 {
        match strand {
            Strand::Forward => position - self.start,
            Strand::Reverse => self.end - position - 1,
        }
    }
}

/// One transcript with 0-based half-open genomic coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub ensembl_id: String,
    pub gene_symbol: String,
    pub gene_id: String,
    pub chromosome: String,
    pub strand: Strand,
    pub start: i64,
    pub end: i64,
    /// Offset of the first coding base within the spliced transcript.
    pub coding_start: i64,
    pub coding_start_genomic: i64,
    /// First genomic position past the coding sequence, in transcription
    /// order.
    pub coding_end_genomic: i64,
    /// Exons in transcription order, so descending on the reverse strand.
    pub exons: Vec<Exon>,
}

impl Transcript {
    /// Parses one database line. Exon bounds that disagree with the
    /// transcript bounds are an error; an inconsistent coding start is only
    /// logged.
    pub fn from_database_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        let malformed = |reason: String| AppError::TranscriptDatabase {
            message: format!("{reason} in line: {}", line.trim_end()),
        };
        if fields.len() < FIRST_EXON_FIELD + 2 || (fields.len() - FIRST_EXON_FIELD) % 2 != 0 {
            return Err(malformed(format!(
                "expected {FIRST_EXON_FIELD} fields plus exon start/end pairs, found {}",
                fields.len()
            )));
        }
        let number = |index: usize| {
            fields[index].trim().parse::<i64>().map_err(|_| {
                malformed(format!(
                    "invalid number {:?} in field {}",
                    fields[index],
                    index + 1
                ))
            })
        };

        let strand = match fields[5].trim() {
            "1" | "+1" | "+" => Strand::Forward,
            "-1" | "-" => Strand::Reverse,
            other => return Err(malformed(format!("invalid strand {other:?}"))),
        };
        let coding_end = number(10)?;
        let exons = (FIRST_EXON_FIELD..fields.len())
            .step_by(2)
            .enumerate()
            .map(|(index, field)| Ok(Exon::new(index + 1, number(field)?, number(field + 1)?)))
            .collect::<Result<Vec<_>>>()?;

        let transcript = Self {
            ensembl_id: fields[0].to_string(),
            gene_symbol: fields[1].to_string(),
            gene_id: fields[2].to_string(),
            chromosome: fields[4].to_string(),
            strand,
            start: number(6)?,
            end: number(7)?,
            coding_start: number(8)? - 1,
            coding_start_genomic: number(9)? - 1,
            coding_end_genomic: match strand {
                Strand::Forward => coding_end,
                Strand::Reverse => coding_end - 2,
            },
            exons,
        };
        transcript.check_bounds().map_err(malformed)?;

        let first = &transcript.exons[0];
        let expected_coding_start = match strand {
            Strand::Forward => transcript.start + transcript.coding_start,
            Strand::Reverse => transcript.end - 1 - transcript.coding_start,
        };
        if first.len() >= transcript.coding_start
            && expected_coding_start != transcript.coding_start_genomic
        {
            warn!(
                transcript = %transcript.ensembl_id,
                coding_start_genomic = transcript.coding_start_genomic,
                expected = expected_coding_start,
                "inconsistent coding start in transcript database"
            );
        }
        Ok(transcript)
    }

    /// Renders the transcript as a database line, the inverse of
    /// [`Transcript::from_database_line`].
    pub fn to_database_line(&self) -> String {
        let strand = match self.strand {
            Strand::Forward => 1,
            Strand::Reverse => -1,
        };
        let coding_end = match self.strand {
            Strand::Forward => self.coding_end_genomic,
            Strand::Reverse => self.coding_end_genomic + 2,
        };
        let mut line = format!(
            "{}\t{}\t{}\t.\t{}\t{strand}\t{}\t{}\t{}\t{}\t{coding_end}",
            self.ensembl_id,
            self.gene_symbol,
            self.gene_id,
            self.chromosome,
            self.start,
            self.end,
            self.coding_start + 1,
            self.coding_start_genomic + 1,
        );
        for exon in &self.exons {
            let _ = write!(line, "\t{}\t{}", exon.start, exon.end);
        }
        line
    }

    fn check_bounds(&self) -> std::result::Result<(), String> {
        let (Some(first), Some(last)) = (self.exons.first(), self.exons.last()) else {
            return Err("transcript has no exons".to_string());
        };
        let (lowest, highest) = match self.strand {
            Strand::Forward => (first, last),
            Strand::Reverse => (last, first),
        };
        if lowest.start != self.start || highest.end != self.end {
            return Err(format!(
                "exons span {}-{} but the transcript spans {}-{}",
                lowest.start, highest.end, self.start, self.end
            ));
        }
        if self.exons.iter().any(|exon| exon.end <= exon.start) {
            return Err("exon with non-positive length".to_string());
        }
        Ok(())
    }

    pub fn covers(&self, position: i64) -> bool {
        self.start <= position && position < self.end
    }

    /// 1-based position in the coding sequence of the exonic base closest
    /// to `position`, and the signed distance from that base. Intronic
    /// positions are measured from the nearer flanking exon. An exact tie
    /// goes to the exon at the lower genomic position: upstream on the
    /// forward strand, downstream on the reverse strand.
    pub fn coding_position(&self, position: i64) -> Option<(i64, i64)> {
        let mut coding = 1 - self.coding_start;
        let mut previous: Option<&Exon> = None;

        for exon in &self.exons {
            if let Some(previous) = previous {
                let from_previous = previous.distance_from(position);
                let from_exon = exon.distance_from(position);
                match self.strand {
                    Strand::Forward if from_previous > 0 && from_exon < 0 => {
                        return Some(if from_previous.abs() <= from_exon.abs() {
                            (coding - 1, from_previous)
                        } else {
                            (coding, from_exon)
                        });
                    }
                    Strand::Reverse if from_previous < 0 && from_exon > 0 => {
                        return Some(if from_exon.abs() <= from_previous.abs() {
                            (coding, -from_exon)
                        } else {
                            (coding - 1, -from_previous)
                        });
                    }
                    _ => {}
                }
            }

            if exon.contains(position) {
                return Some((coding + exon.offset_of(position, self.strand), 0));
            }
            // first base of the next exon
            coding += exon.len();
            previous = Some(exon);
        }
        None
    }

    /// Number of coding bases.
    pub fn coding_length(&self) -> i64 {
        self.coding_position(self.coding_end_genomic)
            .map_or(0, |(position, _)| position - 1)
    }

    /// Coordinate such as `c.31`, `c.30+5`, `c.-10` (5' UTR) or `c.+10`
    /// (3' UTR). `None` when `position` lies outside every exon and intron.
    pub fn csn_coordinate(&self, position: i64) -> Option<String> {
        let (mut coding, distance) = self.coding_position(position)?;
        if coding <= 0 {
            coding -= 1;
        }

        let coding_length = self.coding_length();
        let mut coordinate = if coding > coding_length {
            format!("c.+{}", coding - coding_length)
        } else {
            format!("c.{coding}")
        };
        if distance != 0 {
            let _ = write!(coordinate, "{distance:+}");
        }
        Some(coordinate)
    }
}

/// `GENE:TRANSCRIPT:c.X` for every transcript covering `position`, joined
/// by `,`, or `.` when there is none.
pub fn annotate_position(transcripts: &[Transcript], position: u64) -> String {
    let position = i64::try_from(position).unwrap_or(i64::MAX);
    let mut annotation = String::new();
    for transcript in transcripts.iter().filter(|t| t.covers(position)) {
        let Some(coordinate) = transcript.csn_coordinate(position) else {
            continue;
        };
        if !annotation.is_empty() {
            annotation.push(',');
        }
        let _ = write!(
            annotation,
            "{}:{}:{coordinate}",
            transcript.gene_symbol, transcript.ensembl_id
        );
    }
    if annotation.is_empty() {
        annotation.push_str(NO_TRANSCRIPT);
    }
    annotation
}

/// Tabix-indexed transcript database. One handle per worker.
pub struct TranscriptDatabase {
    path: PathBuf,
    reader: tbx::Reader,
    contigs: Vec<String>,
}

impl std::fmt::Debug for TranscriptDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptDatabase")
            .field("path", &self.path)
            .field("contigs", &self.contigs.len())
            .finish()
    }
}

impl TranscriptDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = tbx::Reader::from_path(&path).map_err(|err| AppError::TranscriptDatabase {
            message: format!("failed to open {}: {err}", path.display()),
        })?;
        let contigs = reader.seqnames();
        debug!(path = %path.display(), contigs = contigs.len(), "opened transcript database");
        Ok(Self {
            path,
            reader,
            contigs,
        })
    }

    /// Transcripts overlapping the 0-based half-open `[start, end)`, in
    /// database order. A later line with an already seen transcript id
    /// replaces the earlier one.
    pub fn overlapping(
        &mut self,
        chromosome: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Transcript>> {
        let Some(name) = resolve_contig_name(chromosome, &self.contigs) else {
            return Ok(Vec::new());
        };
        let tid = self.reader.tid(name)?;
        // One extra base each side so databases indexed with 1-based starts
        // still return every overlapping line; exact filtering follows.
        self.reader.fetch(tid, start.saturating_sub(1), end + 1)?;

        let start = i64::try_from(start).unwrap_or(i64::MAX);
        let end = i64::try_from(end).unwrap_or(i64::MAX);
        let mut transcripts: Vec<Transcript> = Vec::new();
        let mut line = Vec::new();
        while self.reader.read(&mut line)? {
            let text = std::str::from_utf8(&line).map_err(|err| AppError::TranscriptDatabase {
                message: format!("non UTF-8 line in {}: {err}", self.path.display()),
            })?;
            if text.starts_with('#') || text.trim().is_empty() {
                continue;
            }
            let transcript = Transcript::from_database_line(text)?;
            if transcript.start >= end || transcript.end <= start {
                continue;
            }
            match transcripts
                .iter_mut()
                .find(|seen| seen.ensembl_id == transcript.ensembl_id)
            {
                Some(seen) => *seen = transcript,
                None => transcripts.push(transcript),
            }
        }
        Ok(transcripts)
    }
}

/// Writes `transcripts` as a bgzip-compressed database at `path` and builds
/// its tabix index with 0-based starts.
pub fn write_database(path: &Path, transcripts: &[Transcript]) -> Result<()> {
    let mut ordered: Vec<&Transcript> = transcripts.iter().collect();
    ordered.sort_by(|a, b| (&a.chromosome, a.start, a.end).cmp(&(&b.chromosome, b.start, b.end)));

    {
        let mut writer = bgzf::Writer::from_path(path)?;
        for transcript in ordered {
            writeln!(writer, "{}", transcript.to_database_line())?;
        }
        writer.flush()?;
    }

    let c_path = CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| {
        AppError::TranscriptDatabase {
            message: format!("path contains a NUL byte: {}", path.display()),
        }
    })?;
    let conf = htslib::tbx_conf_t {
        preset: htslib::TBX_UCSC as i32,
        sc: CHROMOSOME_COLUMN,
        bc: START_COLUMN,
        ec: END_COLUMN,
        meta_char: i32::from(b'#'),
        line_skip: 0,
    };
    // SAFETY: `c_path` is NUL-terminated and `conf` outlives the call; htslib
    // only reads both.
    let status = unsafe { htslib::tbx_index_build(c_path.as_ptr(), 0, &conf) };
    if status != 0 {
        return Err(AppError::TranscriptDatabase {
            message: format!("failed to build tabix index for {}", path.display()),
        });
    }
    Ok(())
}
