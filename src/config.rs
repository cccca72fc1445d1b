use crate::cluster::DEFAULT_CLUSTER_SIZE_LIMIT;
use crate::errors::{AppError, Result};
use crate::histogram::MAX_QUALITY;
use crate::pileup::PileupOptions;
use crate::summary::PassThresholds;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Which per-target output files to write. The summary file is always written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputSelection {
    pub regions: bool,
    pub profiles: bool,
    /// Accepted for compatibility with older configuration files; no GUI
    /// output is produced.
    pub gui: bool,
}

impl Default for OutputSelection {
    fn default() -> Self {
        Self {
            regions: true,
            profiles: true,
            gui: false,
        }
    }
}

/// Which outputs carry transcript coordinates when a transcript database is
/// configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TranscriptOutputs {
    pub regions: bool,
    pub profiles: bool,
}

impl Default for TranscriptOutputs {
    fn default() -> Self {
        Self {
            regions: true,
            profiles: true,
        }
    }
}

/// Profiling options read from the JSON file passed with `-c`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProfilingConfig {
    #[serde(alias = "low_base_quality")]
    pub low_bq: u8,
    #[serde(alias = "low_mapping_quality")]
    pub low_mq: u8,
    #[serde(alias = "duplicates")]
    pub count_duplicate_reads: bool,
    #[serde(alias = "directional")]
    pub direction: bool,
    pub cluster_size_limit: u64,
    #[serde(alias = "pass_thresholds")]
    pub pass: Option<BTreeMap<String, f64>>,
    pub only_fail_profiles: bool,
    pub outputs: OutputSelection,
    pub reference_file: Option<PathBuf>,
    /// Tabix-indexed transcript database used to annotate positions.
    pub transcript_db: Option<PathBuf>,
    #[serde(alias = "transcripts")]
    pub transcript: TranscriptOutputs,
    #[serde(skip)]
    thresholds: PassThresholds,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            low_bq: 10,
            low_mq: 20,
            count_duplicate_reads: true,
            direction: false,
            cluster_size_limit: DEFAULT_CLUSTER_SIZE_LIMIT,
            pass: None,
            only_fail_profiles: false,
            outputs: OutputSelection::default(),
            reference_file: None,
            transcript_db: None,
            transcript: TranscriptOutputs::default(),
            thresholds: PassThresholds::default(),
        }
    }
}

impl ProfilingConfig {
    /// Loads and validates the file at `path`, or returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(BufReader::new(File::open(path)?)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_reader(json.as_bytes())
    }

    /// Checks value ranges and parses the pass criteria; called on load.
    pub fn validate(&mut self) -> Result<()> {
        for (key, value) in [("low_bq", self.low_bq), ("low_mq", self.low_mq)] {
            if value > MAX_QUALITY {
                return Err(AppError::InvalidConfig {
                    message: format!("{key} must be between 0 and {MAX_QUALITY}, got {value}"),
                });
            }
        }
        if self.cluster_size_limit == 0 {
            return Err(AppError::InvalidConfig {
                message: "cluster_size_limit must be positive".to_string(),
            });
        }
        if self.outputs.gui {
            warn!("GUI output is not supported; ignoring outputs.gui");
        }

        self.thresholds = match &self.pass {
            Some(entries) => PassThresholds::parse(entries, self.direction)?,
            None => PassThresholds::default(),
        };
        Ok(())
    }

    pub fn thresholds(&self) -> &PassThresholds {
        &self.thresholds
    }

    /// Whether any pass criterion is configured. Without one, every target
    /// passes and `only_fail_profiles` has no effect.
    pub fn has_pass_criteria(&self) -> bool {
        !self.thresholds.is_empty()
    }

    /// Transcript database for the regions output, when enabled.
    pub fn region_transcript_db(&self) -> Option<&Path> {
        self.transcript_db
            .as_deref()
            .filter(|_| self.transcript.regions)
    }

    /// Transcript database for the profiles output, when enabled.
    pub fn profile_transcript_db(&self) -> Option<&Path> {
        self.transcript_db
            .as_deref()
            .filter(|_| self.transcript.profiles)
    }

    pub fn pileup_options(&self) -> PileupOptions {
        PileupOptions {
            low_base_quality: self.low_bq,
            low_mapping_quality: self.low_mq,
            count_duplicate_reads: self.count_duplicate_reads,
            directional: self.direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProfilingConfig;
    use crate::errors::AppError;
    use crate::summary::{Bound, Strand, SummaryMetric};
    use std::path::Path;

    #[test]
    fn empty_object_yields_defaults() {
        let config = ProfilingConfig::from_json_str("{}").expect("expected valid config");
        assert_eq!(config, ProfilingConfig::default());
        assert!(config.outputs.regions);
        assert!(config.outputs.profiles);
        assert!(!config.has_pass_criteria());

        let options = config.pileup_options();
        assert_eq!(options.low_base_quality, 10);
        assert_eq!(options.low_mapping_quality, 20);
        assert!(options.count_duplicate_reads);
        assert!(!options.directional);
    }

    #[test]
    fn parses_full_configuration() {
        let config = ProfilingConfig::from_json_str(
            r#"{
                "outputs": {"profiles": false},
                "low_bq": 15,
                "low_mq": 30,
                "duplicates": false,
                "direction": true,
                "cluster_size_limit": 5000,
                "only_fail_profiles": true,
                "pass": {"MINQCOV_MIN": 1, "MAXFLBQ_f_MAX": 0.15}
            }"#,
        )
        .expect("expected valid config");

        assert!(config.outputs.regions);
        assert!(!config.outputs.profiles);
        assert_eq!(config.cluster_size_limit, 5_000);
        assert!(config.only_fail_profiles);

        let options = config.pileup_options();
        assert_eq!(options.low_base_quality, 15);
        assert_eq!(options.low_mapping_quality, 30);
        assert!(!options.count_duplicate_reads);
        assert!(options.directional);

        let criteria = config.thresholds().criteria();
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].metric, SummaryMetric::MaxLowBaseQualityFraction);
        assert_eq!(criteria[0].strand, Strand::Forward);
        assert_eq!(criteria[0].bound, Bound::Max);
        assert_eq!(criteria[1].metric, SummaryMetric::MinQualityCoverage);
    }

    #[test]
    fn accepts_long_option_names() {
        let config = ProfilingConfig::from_json_str(
            r#"{"low_base_quality": 12, "low_mapping_quality": 25,
                "count_duplicate_reads": false, "directional": true,
                "pass_thresholds": {"MEDCOV_MIN": 20}}"#,
        )
        .expect("expected valid config");
        assert_eq!(config.low_bq, 12);
        assert_eq!(config.low_mq, 25);
        assert!(!config.count_duplicate_reads);
        assert!(config.direction);
        assert!(config.has_pass_criteria());
    }

    #[test]
    fn invalid_threshold_is_fatal_at_load() {
        let result = ProfilingConfig::from_json_str(r#"{"pass": {"MIN_MINQCOV": 50}}"#);
        assert!(matches!(result, Err(AppError::InvalidThreshold { .. })));

        let result = ProfilingConfig::from_json_str(r#"{"pass": {"MINQCOV_r_MIN": 5}}"#);
        assert!(matches!(result, Err(AppError::InvalidThreshold { .. })));
    }

    #[test]
    fn unknown_keys_and_bad_ranges_are_rejected() {
        let result = ProfilingConfig::from_json_str(r#"{"fail": {"MINQCOV_MIN": 50}}"#);
        assert!(matches!(result, Err(AppError::Json(_))));

        let result = ProfilingConfig::from_json_str(r#"{"low_bq": 101}"#);
        assert!(matches!(result, Err(AppError::InvalidConfig { .. })));

        let result = ProfilingConfig::from_json_str(r#"{"cluster_size_limit": 0}"#);
        assert!(matches!(result, Err(AppError::InvalidConfig { .. })));
    }

    #[test]
    fn transcript_settings_follow_the_database() {
        let config = ProfilingConfig::default();
        assert!(config.transcript.regions && config.transcript.profiles);
        assert!(config.region_transcript_db().is_none());
        assert!(config.profile_transcript_db().is_none());

        let config = ProfilingConfig::from_json_str(
            r#"{"transcript_db": "refseq.gz", "transcripts": {"profiles": false}}"#,
        )
        .expect("expected valid config");
        assert_eq!(config.region_transcript_db(), Some(Path::new("refseq.gz")));
        assert!(config.profile_transcript_db().is_none());
    }

    #[test]
    fn loads_configuration_with_every_default_spelled_out() {
        let config = ProfilingConfig::from_json_str(
            r#"{
                "duplicates": true,
                "outputs": {"regions": true, "profiles": true, "gui": false},
                "low_bq": 10,
                "low_mq": 20,
                "only_fail_profiles": false,
                "transcript": {"regions": true, "profiles": true},
                "direction": false,
                "pass": null,
                "transcript_db": null
            }"#,
        )
        .expect("expected valid config");
        assert_eq!(config, ProfilingConfig::default());
    }

    #[test]
    fn empty_pass_map_always_passes() {
        let config =
            ProfilingConfig::from_json_str(r#"{"pass": {}}"#).expect("expected valid config");
        assert!(!config.has_pass_criteria());
    }
}
