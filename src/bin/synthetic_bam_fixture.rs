use clap::{ArgAction, Parser};
use coverview::errors::{AppError, Result};
use coverview::synthetic::{SyntheticRead, write_bam};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "synthetic_bam_fixture",
    about = "Write a deterministic, indexed BAM of gapless all-A reads"
)]
struct Cli {
    #[arg(long = "output")]
    output: PathBuf,
    /// Header contig as `NAME:LENGTH`; repeatable.
    #[arg(long = "contig", action = ArgAction::Append, value_parser = parse_contig)]
    contig: Vec<(String, u64)>,
    /// Read group as `CHROM:START:LENGTH:COUNT` with a 0-based start; repeatable.
    #[arg(long = "reads", action = ArgAction::Append, value_parser = parse_reads)]
    reads: Vec<SyntheticRead>,
    #[arg(long = "base-quality")]
    base_quality: Option<u8>,
    #[arg(long = "mapping-quality")]
    mapping_quality: Option<u8>,
}

fn parse_contig(raw: &str) -> std::result::Result<(String, u64), String> {
    let (name, length) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected NAME:LENGTH, got {raw}"))?;
    let length = length
        .parse::<u64>()
        .map_err(|_| format!("invalid contig length in {raw}"))?;
    Ok((name.to_string(), length))
}

fn parse_reads(raw: &str) -> std::result::Result<SyntheticRead, String> {
    let fields: Vec<&str> = raw.rsplitn(4, ':').collect();
    let [count, length, start, chromosome] = fields.as_slice() else {
        return Err(format!("expected CHROM:START:LENGTH:COUNT, got {raw}"));
    };
    let number = |value: &str| {
        value
            .parse::<u64>()
            .map_err(|_| format!("invalid number {value} in {raw}"))
    };
    let count = usize::try_from(number(*count)?).map_err(|err| err.to_string())?;
    Ok(SyntheticRead::new(
        *chromosome,
        number(*start)?,
        number(*length)?,
        count,
    ))
}

fn run(cli: Cli) -> Result<()> {
    if cli.contig.is_empty() {
        return Err(AppError::MissingRequired {
            field: "--contig".to_string(),
        });
    }

    let contigs: Vec<(&str, u64)> = cli
        .contig
        .iter()
        .map(|(name, length)| (name.as_str(), *length))
        .collect();
    let reads: Vec<SyntheticRead> = cli
        .reads
        .into_iter()
        .map(|read| {
            let read = match cli.base_quality {
                Some(quality) => read.with_base_quality(quality),
                None => read,
            };
            match cli.mapping_quality {
                Some(quality) => read.with_mapping_quality(quality),
                None => read,
            }
        })
        .collect();

    write_bam(&cli.output, &contigs, &reads)?;
    info!(
        output = %cli.output.display(),
        contigs = contigs.len(),
        reads = reads.iter().map(|read| read.count).sum::<usize>(),
        "wrote synthetic BAM"
    );
    Ok(())
}

fn main() -> ExitCode {
    coverview::init_tracing();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return ExitCode::from(2);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("synthetic_bam_fixture: {error}");
            ExitCode::from(1)
        }
    }
}
