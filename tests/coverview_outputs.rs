use coverview::synthetic::{SyntheticRead, write_bam};
use coverview::transcript::{Exon, Strand, Transcript, write_database};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const CONTIGS: &[(&str, u64)] = &[("1", 100_000), ("2", 100_000), ("X", 100_000)];

struct Fixture {
    dir: tempfile::TempDir,
    bam: PathBuf,
}

impl Fixture {
    fn new(reads: &[SyntheticRead]) -> Self {
        let dir = tempfile::tempdir().expect("expected temp dir");
        let bam = dir.path().join("sample.bam");
        write_bam(&bam, CONTIGS, reads).expect("expected synthetic bam");
        Self { dir, bam }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).expect("expected fixture write");
        path
    }

    fn prefix(&self, name: &str) -> String {
        self.path(name).to_string_lossy().to_string()
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).expect("expected output file")
    }

    fn run(&self, extra: &[&str]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_coverview"));
        command
            .arg("-i")
            .arg(&self.bam)
            .args(extra)
            .env("RUST_LOG", "warn");
        command.output().expect("expected coverview binary to execute")
    }
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output, needle: &str) {
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(needle), "expected {needle:?} in: {stderr}");
}

fn data_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|line| !line.starts_with('#')).collect()
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("expected utf8 path")
}

#[test]
fn target_without_reads_reports_zero_depth_and_missing_fractions() {
    let fixture = Fixture::new(&[]);
    let bed = fixture.write("targets.bed", "1\t32\t132\tRegion_1\n");
    let prefix = fixture.prefix("out");

    let output = fixture.run(&["-b", path_str(&bed), "-o", &prefix]);
    assert_success(&output);

    let regions = fixture.read("out_regions.txt");
    assert_eq!(
        data_lines(&regions),
        vec!["Region_1\t1\t33\t132\tPASS\t0\t0\t0\t0\t0\tnan\tnan"]
    );

    let profiles = fixture.read("out_profiles.txt");
    let rows = data_lines(&profiles);
    assert_eq!(rows.len(), 100);
    assert_eq!(rows[0], "Region_1\t1\t33\t0\t0\tnan\tnan\tnan\tnan");
    assert_eq!(rows[99], "Region_1\t1\t132\t0\t0\tnan\tnan\tnan\tnan");

    assert_eq!(fixture.read("out_failedtargets.txt"), "");
}

#[test]
fn two_full_length_reads_give_uniform_profile_and_summary() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 32, 100, 2)]);
    let bed = fixture.write("targets.bed", "1\t32\t132\tRegion_1\n");
    let prefix = fixture.prefix("out");

    let output = fixture.run(&["-b", path_str(&bed), "-o", &prefix]);
    assert_success(&output);

    let regions = fixture.read("out_regions.txt");
    assert_eq!(
        regions.lines().next(),
        Some("#Region\tChromosome\tStart_position\tEnd_position\tPass_or_fail\tRC\tMEDCOV\tMINCOV\tMEDQCOV\tMINQCOV\tMAXFLMQ\tMAXFLBQ")
    );
    assert_eq!(
        data_lines(&regions),
        vec!["Region_1\t1\t33\t132\tPASS\t2\t2\t2\t2\t2\t0\t0"]
    );

    let profiles = fixture.read("out_profiles.txt");
    let rows = data_lines(&profiles);
    assert_eq!(rows.len(), 100);
    assert!(rows.iter().all(|row| row.ends_with("\t2\t2\t60\t0\t60\t0")));

    assert_eq!(
        fixture.read("out_summary.txt"),
        "#CHROM\tRC\tRCIN\tRCOUT\nTotal\t2\t-\t-\nUnmapped\t0\t-\t-\nMapped\t2\t2\t0\n1\t2\t2\t0\n2\t0\t0\t0\nX\t0\t0\t0\n"
    );
}

#[test]
fn base_quality_at_threshold_counts_as_high_quality() {
    let fixture = Fixture::new(&[
        SyntheticRead::new("1", 0, 50, 2).with_base_quality(10),
        SyntheticRead::new("2", 0, 50, 2).with_base_quality(9),
    ]);
    let bed = fixture.write("targets.bed", "1\t0\t50\tAtThreshold\n2\t0\t50\tBelow\n");
    let config = fixture.write("config.json", r#"{"low_bq": 10, "pass": {"MINQCOV_MIN": 2}}"#);
    let prefix = fixture.prefix("out");

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-c",
        path_str(&config),
        "-o",
        &prefix,
    ]);
    assert_success(&output);

    let regions = fixture.read("out_regions.txt");
    assert_eq!(
        data_lines(&regions),
        vec![
            "AtThreshold\t1\t1\t50\tPASS\t2\t2\t2\t2\t2\t0\t0",
            "Below\t2\t1\t50\tFAIL\t2\t2\t2\t0\t0\t0\t1",
        ]
    );
    assert_eq!(fixture.read("out_failedtargets.txt"), "Below\n");
}

#[test]
fn duplicate_names_are_uniquified_and_output_is_position_sorted() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 0, 500, 1)]);
    let bed = fixture.write(
        "targets.bed",
        "X\t0\t10\tC\n1\t100\t200\tA\n1\t10\t20\tA\n1\t300\t400\tB\n",
    );
    let prefix = fixture.prefix("out");

    let output = fixture.run(&["-b", path_str(&bed), "-o", &prefix]);
    assert_success(&output);

    let regions = fixture.read("out_regions.txt");
    let names: Vec<&str> = data_lines(&regions)
        .into_iter()
        .filter_map(|line| line.split('\t').next())
        .collect();
    assert_eq!(names, vec!["A_2", "A_1", "B", "C"]);
}

#[test]
fn directional_profile_with_deletion_duplicates_and_low_quality_reverse_reads() {
    let fixture = Fixture::new(&[
        SyntheticRead::new("1", 100, 20, 3).with_deletion_at(5),
        SyntheticRead::new("1", 100, 20, 2)
            .duplicate()
            .with_mapping_quality(0),
        SyntheticRead::new("1", 100, 20, 2)
            .reverse()
            .with_base_quality(5)
            .with_mapping_quality(40),
    ]);
    let bed = fixture.write("targets.bed", "1\t100\t120\tRegion_1\n");
    let config = fixture.write(
        "config.json",
        r#"{"direction": true, "count_duplicate_reads": false}"#,
    );
    let prefix = fixture.prefix("out");

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-c",
        path_str(&config),
        "-o",
        &prefix,
    ]);
    assert_success(&output);

    let profiles = fixture.read("out_profiles.txt");
    let rows = data_lines(&profiles);
    assert_eq!(rows.len(), 20);
    // the forward reads skip position 106, so only reverse reads carry qualities there
    assert_eq!(
        rows[5],
        "Region_1\t1\t106\t5\t3\t5\t1\t40\t0\t3\t3\tnan\tnan\tnan\tnan\t2\t0\t5\t1\t40\t0"
    );
    assert_eq!(
        rows[10],
        "Region_1\t1\t111\t5\t3\t60\t0.4\t60\t0\t3\t3\t60\t0\t60\t0\t2\t0\t5\t1\t40\t0"
    );

    let regions = fixture.read("out_regions.txt");
    assert_eq!(
        data_lines(&regions),
        vec!["Region_1\t1\t101\t120\tPASS\t5\t5\t5\t3\t3\t0\t1\t3\t3\t3\t3\t0\t0\t2\t2\t0\t0\t0\t1"]
    );
}

#[test]
fn reference_option_adds_upper_case_bases() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 0, 40, 1)]);
    let fasta = fixture.write("ref.fa", ">1\nacgtACGTacGTACGTACGTACGTACGTACGTACGTACGT\n");
    fixture.write("ref.fa.fai", "1\t40\t3\t40\t41\n");
    let bed = fixture.write("targets.bed", "1\t10\t14\tInside\n1\t38\t42\tPastEnd\n");
    let prefix = fixture.prefix("out");

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-r",
        path_str(&fasta),
        "-o",
        &prefix,
    ]);
    assert_success(&output);

    let profiles = fixture.read("out_profiles.txt");
    assert!(profiles.starts_with("#Region\tChromosome\tPosition\tREF\tCOV\t"));
    let bases: Vec<(&str, &str)> = data_lines(&profiles)
        .into_iter()
        .map(|row| {
            let fields: Vec<&str> = row.split('\t').collect();
            (fields[2], fields[3])
        })
        .collect();
    assert_eq!(
        bases,
        vec![
            ("11", "G"),
            ("12", "T"),
            ("13", "A"),
            ("14", "C"),
            ("39", "G"),
            ("40", "T"),
            ("41", "."),
            ("42", "."),
        ]
    );
}

#[test]
fn transcript_database_annotates_regions_and_profiles() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 100, 100, 2)]);
    let database = fixture.path("transcripts.txt.gz");
    write_database(
        &database,
        &[Transcript {
            ensembl_id: "ENST0001".to_string(),
            gene_symbol: "GENE1".to_string(),
            gene_id: "ENSG0001".to_string(),
            chromosome: "chr1".to_string(),
            strand: Strand::Forward,
            start: 100,
            end: 200,
            coding_start: 10,
            coding_start_genomic: 110,
            coding_end_genomic: 190,
            exons: vec![Exon::new(1, 100, 140), Exon::new(2, 150, 200)],
        }],
    )
    .expect("expected transcript database");
    let bed = fixture.write("targets.bed", "1\t138\t152\tSpliced\n1\t500\t510\tIntergenic\n");
    let config = fixture.write(
        "config.json",
        &serde_json::json!({ "transcript_db": path_str(&database) }).to_string(),
    );
    let prefix = fixture.prefix("out");

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-c",
        path_str(&config),
        "-o",
        &prefix,
    ]);
    assert_success(&output);

    let regions = fixture.read("out_regions.txt");
    assert!(regions.starts_with(
        "#Region\tChromosome\tStart_position\tEnd_position\tStart_transcript\tEnd_transcript\tPass_or_fail\t"
    ));
    let rows = data_lines(&regions);
    assert!(rows[0].starts_with("Spliced\t1\t139\t152\tGENE1:ENST0001:c.29\tGENE1:ENST0001:c.32\tPASS\t2\t"));
    assert!(rows[1].starts_with("Intergenic\t1\t501\t510\t.\t.\tPASS\t0\t"));

    let profiles = fixture.read("out_profiles.txt");
    assert!(profiles.starts_with("#Region\tChromosome\tPosition\tTranscripts\tCOV\t"));
    let annotations: Vec<&str> = data_lines(&profiles)
        .into_iter()
        .filter(|row| row.starts_with("Spliced\t"))
        .filter_map(|row| row.split('\t').nth(3))
        .map(|field| field.rsplit(':').next().unwrap_or(field))
        .collect();
    assert_eq!(
        annotations,
        vec![
            "c.29", "c.30", "c.30+1", "c.30+2", "c.30+3", "c.30+4", "c.30+5", "c.31-5", "c.31-4",
            "c.31-3", "c.31-2", "c.31-1", "c.31", "c.32",
        ]
    );
}

#[test]
fn transcript_columns_follow_the_per_output_switches() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 100, 100, 1)]);
    let database = fixture.path("transcripts.txt.gz");
    write_database(
        &database,
        &[Transcript {
            ensembl_id: "ENST0002".to_string(),
            gene_symbol: "GENE2".to_string(),
            gene_id: "ENSG0002".to_string(),
            chromosome: "1".to_string(),
            strand: Strand::Reverse,
            start: 100,
            end: 200,
            coding_start: 0,
            coding_start_genomic: 199,
            coding_end_genomic: 110,
            exons: vec![Exon::new(1, 100, 200)],
        }],
    )
    .expect("expected transcript database");
    let bed = fixture.write("targets.bed", "1\t195\t200\tTail\n");
    let config = fixture.write(
        "config.json",
        &serde_json::json!({
            "transcript_db": path_str(&database),
            "transcript": {"regions": false},
        })
        .to_string(),
    );
    let prefix = fixture.prefix("out");

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-c",
        path_str(&config),
        "-o",
        &prefix,
    ]);
    assert_success(&output);

    let regions = fixture.read("out_regions.txt");
    assert!(regions.starts_with("#Region\tChromosome\tStart_position\tEnd_position\tPass_or_fail\t"));
    let profiles = fixture.read("out_profiles.txt");
    let first = data_lines(&profiles)[0];
    assert!(first.starts_with("Tail\t1\t196\tGENE2:ENST0002:c.5\t"), "row: {first}");
}

#[test]
fn quality_coverage_threshold_decides_pass_or_fail() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 32, 100, 2)]);
    let bed = fixture.write("targets.bed", "1\t32\t132\tRegion_1\n");

    for (threshold, expected) in [(2, "PASS"), (3, "FAIL")] {
        let config = fixture.write(
            "config.json",
            &format!(r#"{{"pass": {{"MINQCOV_MIN": {threshold}}}}}"#),
        );
        let prefix = fixture.prefix(&format!("min{threshold}"));
        let output = fixture.run(&[
            "-b",
            path_str(&bed),
            "-c",
            path_str(&config),
            "-o",
            &prefix,
        ]);
        assert_success(&output);

        let regions = fixture.read(&format!("min{threshold}_regions.txt"));
        let row = data_lines(&regions)[0].to_string();
        assert_eq!(row.split('\t').nth(4), Some(expected), "row: {row}");
    }
}

#[test]
fn only_fail_profiles_keeps_failed_targets_only() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 0, 100, 3)]);
    let bed = fixture.write("targets.bed", "1\t0\t10\tCovered\n1\t500\t510\tEmpty\n");
    let config = fixture.write(
        "config.json",
        r#"{"only_fail_profiles": true, "pass": {"MINCOV_MIN": 1}}"#,
    );
    let prefix = fixture.prefix("out");

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-c",
        path_str(&config),
        "-o",
        &prefix,
    ]);
    assert_success(&output);

    let profiles = fixture.read("out_profiles.txt");
    let rows = data_lines(&profiles);
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|row| row.starts_with("Empty\t")));
    assert_eq!(data_lines(&fixture.read("out_regions.txt")).len(), 2);
    assert_eq!(fixture.read("out_failedtargets.txt"), "Empty\n");
}

#[test]
fn parallel_run_matches_sequential_output() {
    let mut reads = Vec::new();
    let mut bed = String::new();
    for (chrom, offset) in [("1", 0_u64), ("2", 7), ("X", 13)] {
        for index in 0..12_u64 {
            let start = offset + index * 1_000;
            reads.push(SyntheticRead::new(chrom, start, 150, (index % 4 + 1) as usize));
            bed.push_str(&format!("{chrom}\t{}\t{}\t{chrom}_{index}\n", start + 20, start + 90));
        }
    }
    let fixture = Fixture::new(&reads);
    let bed = fixture.write("targets.bed", &bed);
    let sequential = fixture.prefix("seq");
    let parallel = fixture.prefix("par");

    assert_success(&fixture.run(&["-b", path_str(&bed), "-o", &sequential]));
    assert_success(&fixture.run(&["-b", path_str(&bed), "-o", &parallel, "--parallel", "3"]));

    for suffix in ["regions.txt", "profiles.txt", "summary.txt", "failedtargets.txt"] {
        assert_eq!(
            fixture.read(&format!("seq_{suffix}")),
            fixture.read(&format!("par_{suffix}")),
            "{suffix} differs between sequential and parallel runs"
        );
    }
    assert_eq!(data_lines(&fixture.read("par_regions.txt")).len(), 36);
}

#[test]
fn summary_splits_on_and_off_target_reads() {
    let fixture = Fixture::new(&[
        SyntheticRead::new("1", 32, 100, 2),
        SyntheticRead::new("1", 5_000, 100, 3),
        SyntheticRead::new("2", 0, 100, 1),
    ]);
    let bed = fixture.write("targets.bed", "1\t50\t60\tRegion_1\n");
    let prefix = fixture.prefix("out");

    assert_success(&fixture.run(&["-b", path_str(&bed), "-o", &prefix]));
    assert_eq!(
        fixture.read("out_summary.txt"),
        "#CHROM\tRC\tRCIN\tRCOUT\nTotal\t6\t-\t-\nUnmapped\t0\t-\t-\nMapped\t6\t2\t4\n1\t5\t2\t3\n2\t1\t0\t1\nX\t0\t0\t0\n"
    );
}

#[test]
fn without_bed_only_the_summary_is_written() {
    let fixture = Fixture::new(&[SyntheticRead::new("1", 32, 100, 2)]);
    let prefix = fixture.prefix("out");

    assert_success(&fixture.run(&["-o", &prefix]));
    assert!(!fixture.path("out_regions.txt").exists());
    assert!(!fixture.path("out_profiles.txt").exists());
    assert_eq!(
        fixture.read("out_summary.txt"),
        "#CHROM\tRC\tRCIN\tRCOUT\nTotal\t2\t-\t-\nUnmapped\t0\t-\t-\nMapped\t2\t0\t2\n1\t2\t0\t2\n2\t0\t0\t0\nX\t0\t0\t0\n"
    );
}

#[test]
fn gzip_flag_compresses_text_outputs() {
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    let fixture = Fixture::new(&[SyntheticRead::new("1", 32, 100, 2)]);
    let bed = fixture.write("targets.bed", "1\t32\t132\tRegion_1\n");
    let prefix = fixture.prefix("out");

    assert_success(&fixture.run(&["-b", path_str(&bed), "-o", &prefix, "--gzip"]));

    let mut regions = String::new();
    MultiGzDecoder::new(fs::File::open(fixture.path("out_regions.txt.gz")).expect("gz file"))
        .read_to_string(&mut regions)
        .expect("expected gz decode");
    assert_eq!(data_lines(&regions).len(), 1);
    assert!(fixture.path("out_summary.txt.gz").exists());
}

#[test]
fn invalid_threshold_is_fatal() {
    let fixture = Fixture::new(&[]);
    let bed = fixture.write("targets.bed", "1\t32\t132\tRegion_1\n");
    let config = fixture.write("config.json", r#"{"pass": {"MIN_MINQCOV": 50}}"#);

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-c",
        path_str(&config),
        "-o",
        &fixture.prefix("out"),
    ]);
    assert_failure(&output, "invalid pass threshold");
    assert!(!fixture.path("out_regions.txt").exists());
}

#[test]
fn unknown_config_key_is_fatal() {
    let fixture = Fixture::new(&[]);
    let bed = fixture.write("targets.bed", "1\t32\t132\tRegion_1\n");
    let config = fixture.write("config.json", r#"{"fail": {"MINQCOV_MIN": 50}}"#);

    let output = fixture.run(&[
        "-b",
        path_str(&bed),
        "-c",
        path_str(&config),
        "-o",
        &fixture.prefix("out"),
    ]);
    assert_failure(&output, "unknown field");
}

#[test]
fn empty_bed_is_fatal() {
    let fixture = Fixture::new(&[]);
    let bed = fixture.write("targets.bed", "# nothing here\n");

    let output = fixture.run(&["-b", path_str(&bed), "-o", &fixture.prefix("out")]);
    assert_failure(&output, "no target regions");
}
