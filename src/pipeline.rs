use crate::alignment::AlignmentSource;
use crate::bam::BamAlignmentSource;
use crate::cli::CoverviewArgs;
use crate::cluster::{Clusters, IntervalClusterer};
use crate::config::ProfilingConfig;
use crate::errors::{AppError, Result};
use crate::interval::{GenomicInterval, read_bed_file};
use crate::pileup::{PerBaseProfile, PileupAccumulator};
use crate::reads::{ChromosomeCoverage, ReadCounter};
use crate::reference::ReferenceSequence;
use crate::summary::{RegionSummarizer, RegionSummary};
use crate::transcript::{Transcript, TranscriptDatabase, annotate_position};
use crate::writer::{self, TextOutput};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, warn};

const PARALLEL_CHUNK_CHANNEL_FACTOR: usize = 2;
const PARALLEL_CHUNK_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Finished target: its profile, region summary, read count and verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetReport {
    pub profile: PerBaseProfile,
    pub summary: RegionSummary,
    pub read_count: u64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetRecord {
    Profiled(Box<TargetReport>),
    /// The target's chromosome is not in the alignment header.
    Skipped(GenomicInterval),
}

/// Profiling components shared by every target of one worker.
#[derive(Debug, Clone)]
pub struct ProfilingEngine {
    accumulator: PileupAccumulator,
    summarizer: RegionSummarizer,
    counter: ReadCounter,
    cluster_size_limit: u64,
}

impl ProfilingEngine {
    pub fn new(config: &ProfilingConfig) -> Self {
        Self {
            accumulator: PileupAccumulator::new(config.pileup_options()),
            summarizer: RegionSummarizer::new(config.thresholds().clone()),
            counter: ReadCounter::new(config.count_duplicate_reads),
            cluster_size_limit: config.cluster_size_limit,
        }
    }

    /// Pull-style iteration over `sorted` targets: each cluster is scanned
    /// when its first record is requested.
    pub fn records<'a, S: AlignmentSource + ?Sized>(
        &'a mut self,
        source: &'a mut S,
        sorted: &'a [GenomicInterval],
    ) -> TargetRecords<'a, S> {
        TargetRecords {
            clusters: Clusters::new(sorted, self.cluster_size_limit),
            engine: self,
            source,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    pub fn read_counter(&self) -> &ReadCounter {
        &self.counter
    }

    pub fn into_read_counter(self) -> ReadCounter {
        self.counter
    }
}

pub struct TargetRecords<'a, S: AlignmentSource + ?Sized> {
    engine: &'a mut ProfilingEngine,
    source: &'a mut S,
    clusters: Clusters<'a>,
    pending: VecDeque<TargetRecord>,
    failed: bool,
}

impl<S: AlignmentSource + ?Sized> TargetRecords<'_, S> {
    fn fill(&mut self) -> Result<bool> {
        let Some(cluster) = self.clusters.next() else {
            return Ok(false);
        };

        let engine = &mut *self.engine;
        let profiles = engine.accumulator.profile_cluster(&mut *self.source, cluster)?;
        let counts = engine.counter.count_cluster(&mut *self.source, cluster)?;

        for ((interval, profile), count) in cluster.intervals.iter().zip(profiles).zip(counts) {
            let record = match (profile, count) {
                (Some(profile), Some(read_count)) => {
                    let (summary, passed) = engine.summarizer.summarize(&profile);
                    TargetRecord::Profiled(Box::new(TargetReport {
                        profile,
                        summary,
                        read_count,
                        passed,
                    }))
                }
                _ => TargetRecord::Skipped(interval.clone()),
            };
            self.pending.push_back(record);
        }
        Ok(true)
    }
}

impl<S: AlignmentSource + ?Sized> Iterator for TargetRecords<'_, S> {
    type Item = Result<TargetRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.pending.is_empty() {
            match self.fill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
        self.pending.pop_front().map(Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub regions: PathBuf,
    pub profiles: PathBuf,
    pub summary: PathBuf,
    pub failed_targets: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: &str, gzip: bool) -> Self {
        let extension = if gzip { "txt.gz" } else { "txt" };
        Self {
            regions: PathBuf::from(format!("{prefix}_regions.{extension}")),
            profiles: PathBuf::from(format!("{prefix}_profiles.{extension}")),
            summary: PathBuf::from(format!("{prefix}_summary.{extension}")),
            failed_targets: PathBuf::from(format!("{prefix}_failedtargets.txt")),
        }
    }

    fn scratch_dir(&self) -> PathBuf {
        match self.summary.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[derive(Debug, Default)]
struct TargetTally {
    profiled: usize,
    skipped: usize,
    failed: Vec<String>,
}

impl TargetTally {
    fn absorb(&mut self, other: TargetTally) {
        self.profiled += other.profiled;
        self.skipped += other.skipped;
        self.failed.extend(other.failed);
    }

    /// Distinct identifiers of failed targets. A target named `BRCA1_3`
    /// belongs to `BRCA1`; names without `_` are their own identifier.
    fn failed_ids(&self) -> BTreeSet<&str> {
        self.failed
            .iter()
            .map(|name| name.split_once('_').map_or(name.as_str(), |(id, _)| id))
            .collect()
    }
}

/// Writes regions and profile rows for one stream of target records.
struct TargetSink<'a, W: Write> {
    regions: Option<W>,
    profiles: Option<W>,
    reference: Option<&'a mut ReferenceSequence>,
    transcripts: Option<&'a mut TranscriptDatabase>,
    annotate_regions: bool,
    annotate_profiles: bool,
    write_all_profiles: bool,
    buffer: String,
    tally: TargetTally,
}

impl<'a, W: Write> TargetSink<'a, W> {
    fn new(
        config: &ProfilingConfig,
        regions: Option<W>,
        profiles: Option<W>,
        handles: WorkerHandles<'a>,
    ) -> Self {
        Self {
            regions,
            profiles,
            reference: handles.reference,
            transcripts: handles.transcripts,
            annotate_regions: config.region_transcript_db().is_some(),
            annotate_profiles: config.profile_transcript_db().is_some(),
            write_all_profiles: !config.only_fail_profiles || !config.has_pass_criteria(),
            buffer: String::with_capacity(256),
            tally: TargetTally::default(),
        }
    }

    fn accept(&mut self, record: TargetRecord) -> Result<()> {
        let report = match record {
            TargetRecord::Profiled(report) => report,
            TargetRecord::Skipped(interval) => {
                debug!(target_name = %interval.name, interval = %interval, "skipped target");
                self.tally.skipped += 1;
                return Ok(());
            }
        };

        self.tally.profiled += 1;
        if !report.passed {
            self.tally.failed.push(report.profile.interval.name.clone());
        }

        let interval = &report.profile.interval;
        let annotate_regions = self.annotate_regions && self.regions.is_some();
        let write_profile =
            self.profiles.is_some() && (self.write_all_profiles || !report.passed);
        let annotate_profiles = self.annotate_profiles && write_profile;
        let transcripts: Vec<Transcript> = match self.transcripts.as_deref_mut() {
            Some(database) if annotate_regions || annotate_profiles => {
                database.overlapping(&interval.chromosome, interval.start, interval.end)?
            }
            _ => Vec::new(),
        };

        if let Some(out) = self.regions.as_mut() {
            let ends = annotate_regions.then(|| {
                (
                    annotate_position(&transcripts, interval.start),
                    annotate_position(&transcripts, interval.end - 1),
                )
            });
            let ends = ends.as_ref().map(|(first, last)| (first.as_str(), last.as_str()));
            writer::write_region_row(out, &mut self.buffer, &report, ends)?;
        }

        if let Some(out) = self.profiles.as_mut()
            && write_profile
        {
            let bases = match self.reference.as_deref_mut() {
                Some(reference) => {
                    reference.fetch(&interval.chromosome, interval.start, interval.end)?
                }
                None => None,
            };
            let with_reference = self.reference.is_some();
            let bases = match (&bases, with_reference) {
                (Some(bases), _) => Some(bases.as_slice()),
                (None, true) => Some(&[][..]),
                (None, false) => None,
            };
            let annotations: Option<Vec<String>> = annotate_profiles.then(|| {
                (interval.start..interval.end)
                    .map(|position| annotate_position(&transcripts, position))
                    .collect()
            });
            writer::write_profile_rows(
                out,
                &mut self.buffer,
                &report.profile,
                bases,
                annotations.as_deref(),
            )?;
        }
        Ok(())
    }

    fn finish(self) -> (Option<W>, Option<W>, TargetTally) {
        (self.regions, self.profiles, self.tally)
    }
}

/// Lookup handles borrowed from a [`WorkerContext`] by its sink.
struct WorkerHandles<'a> {
    reference: Option<&'a mut ReferenceSequence>,
    transcripts: Option<&'a mut TranscriptDatabase>,
}

/// Lazily opened per-worker handles; read-store handles are never shared.
struct WorkerContext {
    input: PathBuf,
    reference_path: Option<PathBuf>,
    transcripts_path: Option<PathBuf>,
    source: Option<BamAlignmentSource>,
    reference: Option<ReferenceSequence>,
    transcripts: Option<TranscriptDatabase>,
}

impl WorkerContext {
    fn new(input: &Path, reference_path: Option<&Path>, config: &ProfilingConfig) -> Self {
        let transcripts_path = config
            .region_transcript_db()
            .or_else(|| config.profile_transcript_db());
        Self {
            input: input.to_path_buf(),
            reference_path: reference_path.map(Path::to_path_buf),
            transcripts_path: transcripts_path.map(Path::to_path_buf),
            source: None,
            reference: None,
            transcripts: None,
        }
    }

    fn handles(&mut self) -> Result<(&mut BamAlignmentSource, WorkerHandles<'_>)> {
        if self.source.is_none() {
            self.source = Some(BamAlignmentSource::open(&self.input)?);
        }
        if self.reference.is_none()
            && let Some(path) = &self.reference_path
        {
            self.reference = Some(ReferenceSequence::open(path)?);
        }
        if self.transcripts.is_none()
            && let Some(path) = &self.transcripts_path
        {
            self.transcripts = Some(TranscriptDatabase::open(path)?);
        }

        let source = self.source.as_mut().ok_or_else(|| AppError::Alignment {
            message: format!("alignment source not open for {}", self.input.display()),
        })?;
        let handles = WorkerHandles {
            reference: self.reference.as_mut(),
            transcripts: self.transcripts.as_mut(),
        };
        Ok((source, handles))
    }
}

#[derive(Debug)]
struct PartitionChunk {
    rank: usize,
    first_target: String,
    regions: Option<NamedTempFile>,
    profiles: Option<NamedTempFile>,
    tally: TargetTally,
    counter: ReadCounter,
    elapsed: Duration,
}

#[derive(Debug)]
enum ParallelChunkMessage {
    Ready(Box<PartitionChunk>),
}

#[derive(Debug)]
struct PipelineProgress {
    progress_bar: Option<ProgressBar>,
    total_targets: usize,
    processed_targets: usize,
    finished: bool,
}

impl PipelineProgress {
    const UPDATE_EVERY: usize = 100;

    fn new(enabled: bool, output: &str, total_targets: usize) -> Self {
        let progress_bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(4));
            let style = ProgressStyle::with_template("{spinner:.green} {elapsed_precise} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(200));
            bar.set_message(format!("starting output={output} targets={total_targets}"));
            Some(bar)
        } else {
            None
        };

        Self {
            progress_bar,
            total_targets,
            processed_targets: 0,
            finished: false,
        }
    }

    fn on_targets(&mut self, count: usize, locus: &str) {
        let before = self.processed_targets / Self::UPDATE_EVERY;
        self.processed_targets += count;
        if self.processed_targets == count || self.processed_targets / Self::UPDATE_EVERY != before
        {
            self.set_message(locus);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = &self.progress_bar {
            bar.finish_with_message(format!(
                "done targets={}/{}",
                self.processed_targets, self.total_targets
            ));
        }
        self.finished = true;
    }

    fn set_message(&self, locus: &str) {
        if let Some(bar) = &self.progress_bar {
            bar.set_message(format!(
                "targets={}/{} locus={locus}",
                self.processed_targets, self.total_targets
            ));
        }
    }
}

impl Drop for PipelineProgress {
    fn drop(&mut self) {
        if !self.finished
            && let Some(bar) = &self.progress_bar
        {
            bar.finish_and_clear();
        }
    }
}

pub fn run(args: &CoverviewArgs) -> Result<()> {
    let started = Instant::now();
    let config = ProfilingConfig::load(args.config.as_deref())?;
    let reference = args
        .reference
        .clone()
        .or_else(|| config.reference_file.clone());
    let paths = OutputPaths::from_prefix(&args.output, args.gzip);
    info!(
        input = %args.input.display(),
        bed = ?args.bed,
        output = %args.output,
        parallel = args.parallel,
        ?config,
        "starting coverview"
    );

    let on_target = match &args.bed {
        Some(bed) => {
            let counter = profile_targets(args, &config, bed, reference.as_deref(), &paths)?;
            counter.on_target_counts()
        }
        None => {
            info!("no BED file given; computing read counts only");
            BTreeMap::new()
        }
    };

    let mut source = BamAlignmentSource::open(&args.input)?;
    let coverage = ChromosomeCoverage::from_counts(&source.contig_read_counts()?, &on_target);
    writer::with_text_output_writer(&paths.summary, |out| writer::write_summary(out, &coverage))?;

    info!(
        summary = %paths.summary.display(),
        mapped = coverage.mapped,
        on_target = coverage.on_target,
        off_target = coverage.off_target(),
        unmapped = coverage.unmapped,
        elapsed_ms = started.elapsed().as_millis(),
        "coverview finished"
    );
    Ok(())
}

fn profile_targets(
    args: &CoverviewArgs,
    config: &ProfilingConfig,
    bed: &Path,
    reference: Option<&Path>,
    paths: &OutputPaths,
) -> Result<ReadCounter> {
    let clusterer = IntervalClusterer::new(read_bed_file(bed)?, config.cluster_size_limit)?;
    let partitions = clusterer.partition(args.parallel);
    info!(
        targets = clusterer.intervals().len(),
        clusters = clusterer.clusters().count(),
        partitions = partitions.len(),
        "loaded target regions"
    );
    if let Some(path) = &config.transcript_db {
        info!(
            path = %path.display(),
            regions = config.transcript.regions,
            profiles = config.transcript.profiles,
            "annotating targets with transcript coordinates"
        );
    }

    let mut progress = PipelineProgress::new(
        args.progress,
        &args.output,
        clusterer.intervals().len(),
    );
    let mut regions = open_output(config.outputs.regions, &paths.regions)?;
    let mut profiles = open_output(config.outputs.profiles, &paths.profiles)?;
    if let Some(out) = regions.as_mut() {
        writeln!(
            out,
            "{}",
            writer::regions_header(config.direction, config.region_transcript_db().is_some())
        )?;
    }
    if let Some(out) = profiles.as_mut() {
        writeln!(
            out,
            "{}",
            writer::profiles_header(
                config.direction,
                reference.is_some(),
                config.profile_transcript_db().is_some()
            )
        )?;
    }

    let (counter, tally) = if partitions.len() > 1 {
        run_parallel(
            args,
            config,
            reference,
            paths,
            &partitions,
            (regions.as_mut(), profiles.as_mut()),
            &mut progress,
        )?
    } else {
        let mut context = WorkerContext::new(&args.input, reference, config);
        let (source, handles) = context.handles()?;
        let mut engine = ProfilingEngine::new(config);
        let mut sink = TargetSink::new(config, regions.as_mut(), profiles.as_mut(), handles);
        for record in engine.records(source, clusterer.intervals()) {
            let record = record?;
            if let TargetRecord::Profiled(report) = &record {
                let interval = &report.profile.interval;
                progress.on_targets(1, &format!("{}:{}", interval.chromosome, interval.start + 1));
            } else {
                progress.on_targets(1, "skipped");
            }
            sink.accept(record)?;
        }
        let (_, _, tally) = sink.finish();
        (engine.into_read_counter(), tally)
    };
    progress.finish();

    if let Some(out) = regions {
        out.finish()?;
    }
    if let Some(out) = profiles {
        out.finish()?;
    }
    writer::with_text_output_writer(&paths.failed_targets, |out| {
        for name in &tally.failed {
            writeln!(out, "{name}")?;
        }
        Ok(())
    })?;

    if tally.skipped > 0 {
        warn!(
            skipped = tally.skipped,
            "targets on chromosomes missing from the alignment header were skipped"
        );
    }
    let failed_ids = tally.failed_ids();
    if !failed_ids.is_empty() {
        info!(
            failed_ids = failed_ids.len(),
            "distinct target identifiers with failed regions"
        );
    }
    info!(
        profiled = tally.profiled,
        failed = tally.failed.len(),
        regions = %paths.regions.display(),
        profiles = %paths.profiles.display(),
        "finished target profiling"
    );
    Ok(counter)
}

fn open_output(enabled: bool, path: &Path) -> Result<Option<TextOutput>> {
    if enabled {
        TextOutput::create(path).map(Some)
    } else {
        Ok(None)
    }
}

fn run_parallel(
    args: &CoverviewArgs,
    config: &ProfilingConfig,
    reference: Option<&Path>,
    paths: &OutputPaths,
    partitions: &[&[GenomicInterval]],
    outputs: (Option<&mut TextOutput>, Option<&mut TextOutput>),
    progress: &mut PipelineProgress,
) -> Result<(ReadCounter, TargetTally)> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(args.parallel)
        .build()
        .map_err(|err| AppError::ParseError {
            message: format!("failed to initialize rayon thread pool: {err}"),
        })?;
    info!(
        partitions = partitions.len(),
        requested_threads = args.parallel,
        "starting parallel profiling"
    );

    let channel_capacity = (args.parallel * PARALLEL_CHUNK_CHANNEL_FACTOR).max(4);
    let (chunk_sender, chunk_receiver) = bounded::<ParallelChunkMessage>(channel_capacity);
    let scratch = paths.scratch_dir();
    let expected_chunks = partitions.len();
    let writer_started = Instant::now();

    let (worker_result, writer_result) = thread::scope(|scope| {
        let writer_handle = scope.spawn(|| {
            write_ordered_partition_chunks(outputs, expected_chunks, &chunk_receiver, progress)
        });

        let worker_result = pool.install(|| {
            partitions.par_iter().enumerate().try_for_each_init(
                || {
                    (
                        WorkerContext::new(&args.input, reference, config),
                        chunk_sender.clone(),
                    )
                },
                |(context, tx), (rank, targets)| -> Result<()> {
                    let chunk = process_partition(config, &scratch, context, rank, targets)?;
                    tx.send(ParallelChunkMessage::Ready(Box::new(chunk)))
                        .map_err(|err| AppError::ParseError {
                            message: format!("failed to send partition chunk {rank}: {err}"),
                        })
                },
            )
        });
        drop(chunk_sender);

        let writer_result = writer_handle.join().map_err(|_| AppError::ParseError {
            message: "partition writer thread panicked".to_string(),
        });
        (worker_result, writer_result)
    });

    let writer_result = writer_result?;
    if let Err(error) = worker_result {
        if let Err(writer_error) = &writer_result {
            info!(
                worker_error = %error,
                writer_error = %writer_error,
                "parallel run failed in both worker and writer"
            );
        }
        return Err(error);
    }

    let merged = writer_result?;
    info!(
        partitions = expected_chunks,
        writer_elapsed_ms = writer_started.elapsed().as_millis(),
        "completed ordered partition merge"
    );
    Ok(merged)
}

fn process_partition(
    config: &ProfilingConfig,
    scratch: &Path,
    context: &mut WorkerContext,
    rank: usize,
    targets: &[GenomicInterval],
) -> Result<PartitionChunk> {
    let started = Instant::now();
    let (source, handles) = context.handles()?;
    let mut regions = scratch_chunk(config.outputs.regions, scratch, "coverview_regions_")?;
    let mut profiles = scratch_chunk(config.outputs.profiles, scratch, "coverview_profiles_")?;

    let mut engine = ProfilingEngine::new(config);
    let tally = {
        let mut sink = TargetSink::new(
            config,
            regions.as_mut().map(|file| BufWriter::new(file.as_file_mut())),
            profiles.as_mut().map(|file| BufWriter::new(file.as_file_mut())),
            handles,
        );
        for record in engine.records(source, targets) {
            sink.accept(record?)?;
        }
        let (regions_out, profiles_out, tally) = sink.finish();
        for out in [regions_out, profiles_out].into_iter().flatten() {
            out.into_inner().map_err(|err| err.into_error())?;
        }
        tally
    };

    let first_target = targets
        .first()
        .map(ToString::to_string)
        .unwrap_or_default();
    debug!(
        rank,
        first_target = %first_target,
        targets = targets.len(),
        failed = tally.failed.len(),
        "partition finished"
    );
    Ok(PartitionChunk {
        rank,
        first_target,
        regions,
        profiles,
        tally,
        counter: engine.into_read_counter(),
        elapsed: started.elapsed(),
    })
}

fn scratch_chunk(enabled: bool, dir: &Path, prefix: &str) -> Result<Option<NamedTempFile>> {
    if !enabled {
        return Ok(None);
    }
    let file = Builder::new()
        .prefix(prefix)
        .suffix(".txt")
        .tempfile_in(dir)?;
    Ok(Some(file))
}

fn write_ordered_partition_chunks(
    (mut regions, mut profiles): (Option<&mut TextOutput>, Option<&mut TextOutput>),
    expected_chunks: usize,
    chunk_receiver: &Receiver<ParallelChunkMessage>,
    progress: &mut PipelineProgress,
) -> Result<(ReadCounter, TargetTally)> {
    let mut next_expected = 0usize;
    let mut pending = HashMap::new();
    let mut wait_cycles = 0u64;
    let mut counter = ReadCounter::default();
    let mut tally = TargetTally::default();

    while next_expected < expected_chunks {
        let message = match chunk_receiver.recv_timeout(PARALLEL_CHUNK_RECV_TIMEOUT) {
            Ok(message) => {
                wait_cycles = 0;
                message
            }
            Err(RecvTimeoutError::Timeout) => {
                wait_cycles += 1;
                warn!(
                    next_expected,
                    expected_chunks,
                    pending_chunks = pending.len(),
                    waited_seconds = wait_cycles * PARALLEL_CHUNK_RECV_TIMEOUT.as_secs(),
                    "writer still waiting for next partition"
                );
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(AppError::ParseError {
                    message: format!(
                        "partition channel closed before all chunks were received (next={next_expected}, expected={expected_chunks})"
                    ),
                });
            }
        };

        let ParallelChunkMessage::Ready(chunk) = message;
        let _ = pending.insert(chunk.rank, chunk);

        while let Some(chunk) = pending.remove(&next_expected) {
            let PartitionChunk {
                rank,
                first_target,
                regions: regions_chunk,
                profiles: profiles_chunk,
                tally: chunk_tally,
                counter: chunk_counter,
                elapsed,
            } = *chunk;
            info!(
                rank,
                first_target = %first_target,
                targets = chunk_tally.profiled + chunk_tally.skipped,
                worker_elapsed_ms = elapsed.as_millis(),
                "merging ordered partition chunk"
            );

            if let (Some(out), Some(chunk_file)) = (regions.as_deref_mut(), regions_chunk) {
                append_chunk(chunk_file, out)?;
            }
            if let (Some(out), Some(chunk_file)) = (profiles.as_deref_mut(), profiles_chunk) {
                append_chunk(chunk_file, out)?;
            }

            progress.on_targets(chunk_tally.profiled + chunk_tally.skipped, &first_target);
            tally.absorb(chunk_tally);
            counter.merge(chunk_counter);
            next_expected += 1;
        }
    }

    Ok((counter, tally))
}

fn append_chunk(mut chunk: NamedTempFile, out: &mut dyn Write) -> Result<()> {
    let file: &mut File = chunk.as_file_mut();
    file.seek(SeekFrom::Start(0))?;
    std::io::copy(file, out)?;
    Ok(())
}
