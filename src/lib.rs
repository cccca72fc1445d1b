pub mod alignment;
pub mod bam;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod histogram;
pub mod interval;
pub mod pileup;
pub mod pipeline;
pub mod reads;
pub mod reference;
pub mod summary;
pub mod synthetic;
pub mod transcript;
mod utils;
pub mod writer;

use cli::CoverviewArgs;
use errors::Result;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

pub fn run_from_args(args: CoverviewArgs) -> Result<()> {
    pipeline::run(&args)
}

#[cfg(test)]
mod tests {
    use crate::cli::parse_args;
    use crate::synthetic::{SyntheticRead, write_bam};
    use std::fs;

    #[test]
    fn wiring_parses_and_runs_pipeline() {
        let dir = tempfile::tempdir().expect("expected temp dir");
        let bam = dir.path().join("sample.bam");
        write_bam(&bam, &[("1", 10_000)], &[SyntheticRead::new("1", 32, 100, 2)])
            .expect("expected synthetic bam");
        let bed = dir.path().join("targets.bed");
        fs::write(&bed, "1\t32\t132\tRegion_1\n").expect("expected bed write");
        let prefix = dir.path().join("out").to_string_lossy().to_string();
        let bam = bam.to_string_lossy().to_string();
        let bed = bed.to_string_lossy().to_string();

        let args = parse_args([
            "coverview",
            "-i",
            bam.as_str(),
            "-b",
            bed.as_str(),
            "-o",
            prefix.as_str(),
        ])
        .expect("expected valid args");
        crate::run_from_args(args).expect("expected pipeline success");

        let regions = fs::read_to_string(format!("{prefix}_regions.txt")).expect("regions");
        assert!(
            regions
                .lines()
                .nth(1)
                .is_some_and(|line| line.starts_with("Region_1\t1\t33\t132\tPASS\t2\t"))
        );
        assert!(dir.path().join("out_summary.txt").exists());
    }
}
