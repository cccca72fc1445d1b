use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing value for argument: {flag}")]
    MissingValue { flag: String },
    #[error("missing required argument: {field}")]
    MissingRequired { field: String },
    #[error("invalid value for {flag}={value}: {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },
    #[error("unsupported argument: {arg}")]
    UnsupportedArgument { arg: String },
    #[error("malformed interval at {source_name}:{line}: {reason}")]
    MalformedInterval {
        source_name: String,
        line: usize,
        reason: String,
    },
    #[error("no target regions to process")]
    NoRegions,
    #[error("invalid pass threshold {key}: {reason}")]
    InvalidThreshold { key: String, reason: String },
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
    #[error("alignment error: {message}")]
    Alignment { message: String },
    #[error("transcript database error: {message}")]
    TranscriptDatabase { message: String },
    #[error("parse error: {message}")]
    ParseError { message: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
