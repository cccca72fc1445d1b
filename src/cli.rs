use crate::errors::{AppError, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "coverview",
    about = "Per-base and per-region coverage and quality profiling of BAM files",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct CliArgs {
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,
    #[arg(short = 'b', long = "bed")]
    bed: Option<PathBuf>,
    #[arg(short = 'o', long = "output", default_value = "output")]
    output: String,
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    #[arg(short = 'r', long = "reference")]
    reference: Option<PathBuf>,
    #[arg(long = "parallel")]
    parallel: Option<String>,
    #[arg(long = "gzip", action = ArgAction::SetTrue)]
    gzip: bool,
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverviewArgs {
    pub input: PathBuf,
    pub bed: Option<PathBuf>,
    pub output: String,
    pub config: Option<PathBuf>,
    pub reference: Option<PathBuf>,
    pub parallel: usize,
    pub gzip: bool,
    pub progress: bool,
}

impl Default for CoverviewArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            bed: None,
            output: "output".to_string(),
            config: None,
            reference: None,
            parallel: 1,
            gzip: false,
            progress: false,
        }
    }
}

impl CoverviewArgs {
    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(AppError::MissingRequired {
                field: "--input".to_string(),
            });
        }
        if self.output.is_empty() || self.output == "-" {
            return Err(AppError::InvalidValue {
                flag: "--output".to_string(),
                value: self.output.clone(),
                reason: "must be a file name prefix".to_string(),
            });
        }
        if self.parallel == 0 {
            return Err(AppError::InvalidValue {
                flag: "--parallel".to_string(),
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(())
    }
}

pub fn parse_from_env() -> Result<CoverviewArgs> {
    parse_args(std::env::args())
}

pub fn parse_args<I, S>(args: I) -> Result<CoverviewArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    if tokens.is_empty() {
        tokens.push("coverview".to_string());
    }

    let cli = CliArgs::try_parse_from(tokens).map_err(map_clap_error)?;
    let parsed = CoverviewArgs {
        input: cli.input.unwrap_or_default(),
        bed: cli.bed,
        output: cli.output,
        config: cli.config,
        reference: cli.reference,
        parallel: cli
            .parallel
            .as_deref()
            .map_or(Ok(1), |value| parse_usize("--parallel", value))?,
        gzip: cli.gzip,
        progress: cli.progress,
    };

    parsed.validate()?;
    Ok(parsed)
}

fn map_clap_error(error: clap::Error) -> AppError {
    let kind = error.kind();
    let rendered = error.to_string();
    match kind {
        ErrorKind::UnknownArgument => AppError::UnsupportedArgument {
            arg: first_quoted_token(&rendered).unwrap_or(rendered),
        },
        ErrorKind::TooFewValues | ErrorKind::WrongNumberOfValues => AppError::MissingValue {
            flag: first_quoted_token(&rendered).unwrap_or_else(|| "argument".to_string()),
        },
        ErrorKind::InvalidValue if rendered.contains("a value is required") => {
            AppError::MissingValue {
                flag: first_quoted_token(&rendered).unwrap_or_else(|| "argument".to_string()),
            }
        }
        _ => AppError::ParseError {
            message: clap_error_message(&rendered),
        },
    }
}

fn first_quoted_token(message: &str) -> Option<String> {
    let start = message.find('\'')?;
    let end = message[start + 1..].find('\'')?;
    Some(message[start + 1..start + 1 + end].to_string())
}

fn clap_error_message(message: &str) -> String {
    message
        .lines()
        .find_map(|line| line.strip_prefix("error: "))
        .or_else(|| message.lines().next())
        .unwrap_or("failed to parse arguments")
        .to_string()
}

fn parse_usize(flag: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| AppError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "must be a positive integer".to_string(),
    })
}
