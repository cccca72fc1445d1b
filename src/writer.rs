use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::Result;
use crate::pileup::{PerBaseProfile, StrandProfile};
use crate::pipeline::TargetReport;
use crate::reads::ChromosomeCoverage;
use crate::summary::{StrandSummary, SummaryMetric};
use crate::transcript::NO_TRANSCRIPT;
use crate::utils::py_round;
use flate2::Compression;
use flate2::write::GzEncoder;

/// Written for statistics of positions without data; parses back as NaN.
const MISSING: &str = "nan";
const UNKNOWN_BASE: &str = ".";
const NOT_APPLICABLE: &str = "-";
const PROFILE_FRACTION_DIGITS: usize = 3;
const PROFILE_COLUMNS: [&str; 6] = ["COV", "QCOV", "MEDBQ", "FLBQ", "MEDMQ", "FLMQ"];

/// Output file, gzip-compressed when its path ends in `.gz`.
pub enum TextOutput {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl TextOutput {
    pub fn create(path: &Path) -> Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        if path.extension().is_some_and(|ext| ext == "gz") {
            Ok(Self::Gzip(GzEncoder::new(file, Compression::default())))
        } else {
            Ok(Self::Plain(file))
        }
    }

    /// Flushes buffered data and writes the gzip trailer.
    pub fn finish(self) -> Result<()> {
        match self {
            Self::Plain(mut file) => file.flush()?,
            Self::Gzip(encoder) => encoder.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for TextOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(file) => file.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(file) => file.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Creates `path`, runs `write_fn` against it and finishes the file.
pub fn with_text_output_writer<F>(path: &Path, write_fn: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let mut out = TextOutput::create(path)?;
    write_fn(&mut out)?;
    out.finish()
}

fn strand_suffixes(directional: bool) -> &'static [&'static str] {
    if directional { &["", "_f", "_r"] } else { &[""] }
}

pub fn regions_header(directional: bool, with_transcripts: bool) -> String {
    let mut header = String::from("#Region\tChromosome\tStart_position\tEnd_position");
    if with_transcripts {
        header.push_str("\tStart_transcript\tEnd_transcript");
    }
    header.push_str("\tPass_or_fail\tRC");
    for suffix in strand_suffixes(directional) {
        for metric in SummaryMetric::ALL {
            let _ = write!(header, "\t{}{suffix}", metric.name());
        }
    }
    header
}

pub fn profiles_header(directional: bool, with_reference: bool, with_transcripts: bool) -> String {
    let mut header = String::from("#Region\tChromosome\tPosition");
    if with_reference {
        header.push_str("\tREF");
    }
    if with_transcripts {
        header.push_str("\tTranscripts");
    }
    for suffix in strand_suffixes(directional) {
        for column in PROFILE_COLUMNS {
            let _ = write!(header, "\t{column}{suffix}");
        }
    }
    header
}

fn push_value(buffer: &mut String, value: Option<f64>) {
    buffer.push('\t');
    match value {
        Some(value) => {
            let _ = write!(buffer, "{value}");
        }
        None => buffer.push_str(MISSING),
    }
}

fn push_strand_summary(buffer: &mut String, summary: &StrandSummary) {
    for metric in SummaryMetric::ALL {
        push_value(buffer, summary.metric(metric));
    }
}

/// One regions row; start is written 1-based, end inclusive. `transcripts`
/// holds the annotations of the first and last base.
pub fn write_region_row(
    out: &mut dyn Write,
    buffer: &mut String,
    report: &TargetReport,
    transcripts: Option<(&str, &str)>,
) -> Result<()> {
    let interval = &report.profile.interval;
    buffer.clear();
    let _ = write!(
        buffer,
        "{}\t{}\t{}\t{}",
        interval.name,
        interval.chromosome,
        interval.start + 1,
        interval.end,
    );
    if let Some((first, last)) = transcripts {
        let _ = write!(buffer, "\t{first}\t{last}");
    }
    let _ = write!(
        buffer,
        "\t{}\t{}",
        if report.passed { "PASS" } else { "FAIL" },
        report.read_count
    );
    push_strand_summary(buffer, &report.summary.total);
    if let Some(strands) = &report.summary.strands {
        push_strand_summary(buffer, &strands.forward);
        push_strand_summary(buffer, &strands.reverse);
    }
    buffer.push('\n');
    out.write_all(buffer.as_bytes())?;
    Ok(())
}

fn push_strand_column(buffer: &mut String, profile: &StrandProfile, offset: usize) {
    let _ = write!(
        buffer,
        "\t{}\t{}",
        profile.coverage[offset], profile.quality_coverage[offset]
    );
    let round = |value: Option<f64>| value.map(|v| py_round(v, PROFILE_FRACTION_DIGITS));
    push_value(buffer, profile.median_base_quality[offset]);
    push_value(buffer, round(profile.low_base_quality_fraction[offset]));
    push_value(buffer, profile.median_mapping_quality[offset]);
    push_value(buffer, round(profile.low_mapping_quality_fraction[offset]));
}

/// One row per base of the target, positions 1-based. `transcripts` has one
/// annotation per base.
pub fn write_profile_rows(
    out: &mut dyn Write,
    buffer: &mut String,
    profile: &PerBaseProfile,
    reference: Option<&[u8]>,
    transcripts: Option<&[String]>,
) -> Result<()> {
    let interval = &profile.interval;
    for offset in 0..profile.len() {
        buffer.clear();
        let _ = write!(
            buffer,
            "{}\t{}\t{}",
            interval.name,
            interval.chromosome,
            interval.start + offset as u64 + 1
        );
        if let Some(bases) = reference {
            buffer.push('\t');
            match bases.get(offset) {
                Some(&base) => buffer.push(char::from(base)),
                None => buffer.push_str(UNKNOWN_BASE),
            }
        }
        if let Some(annotations) = transcripts {
            buffer.push('\t');
            buffer.push_str(
                annotations
                    .get(offset)
                    .map_or(NO_TRANSCRIPT, String::as_str),
            );
        }

        push_strand_column(buffer, &profile.total, offset);
        if let Some(strands) = &profile.strands {
            push_strand_column(buffer, &strands.forward, offset);
            push_strand_column(buffer, &strands.reverse, offset);
        }
        buffer.push('\n');
        out.write_all(buffer.as_bytes())?;
    }
    Ok(())
}

/// Whole-file read counts: `Total`, `Unmapped`, `Mapped`, then one row per
/// contig. On/off-target columns are `-` where they do not apply.
pub fn write_summary<W: Write + ?Sized>(out: &mut W, coverage: &ChromosomeCoverage) -> Result<()> {
    writeln!(out, "#CHROM\tRC\tRCIN\tRCOUT")?;
    writeln!(out, "Total\t{}\t{NOT_APPLICABLE}\t{NOT_APPLICABLE}", coverage.total)?;
    writeln!(
        out,
        "Unmapped\t{}\t{NOT_APPLICABLE}\t{NOT_APPLICABLE}",
        coverage.unmapped
    )?;
    writeln!(
        out,
        "Mapped\t{}\t{}\t{}",
        coverage.mapped,
        coverage.on_target,
        coverage.off_target()
    )?;
    for contig in &coverage.contigs {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            contig.name,
            contig.mapped,
            contig.on_target,
            contig.off_target()
        )?;
    }
    Ok(())
}
