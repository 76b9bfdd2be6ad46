use indicatif::style::TemplateError;
use thiserror::Error;

pub type StockcastResult<T> = Result<T, StockcastError>;

#[derive(Debug, Error)]
pub enum StockcastError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors in the run configuration. Always fatal, raised before any data is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Split fractions must sum to 1.0, got {sum} (train={train}, validation={validation}, test={test})")]
    SplitFractionsSum {
        train: f64,
        validation: f64,
        test: f64,
        sum: f64,
    },

    #[error("Invalid split fraction '{name}': {value} ({msg})")]
    InvalidSplitFraction {
        name: &'static str,
        value: f64,
        msg: &'static str,
    },

    #[error("Rolling window must be at least 3 closes, got {0}")]
    InvalidWindow(usize),

    #[error("Invalid parameter '{name}': {msg}")]
    InvalidParameter { name: &'static str, msg: String },

    #[error("No model types configured")]
    NoModels,

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to encode configuration")]
    Encoding(#[from] postcard::Error),
}

/// Errors related to loading, parsing and availability of price data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Missing required column '{column}' in {source_name}")]
    MissingColumn {
        column: &'static str,
        source_name: String,
    },

    #[error("No input files found at '{0}'")]
    NoInputFiles(String),

    #[error("No valid data: {0}")]
    NoValidData(String),

    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Invariant violation in series '{index}': {msg}")]
    SeriesInvariant { index: String, msg: String },
}

/// Errors raised while fitting or applying a classifier.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("Training data is empty")]
    EmptyTrainingData,

    #[error("Training labels contain a single class ({0})")]
    SingleClass(String),

    #[error("Non-finite value in feature matrix at row {row}, column {column}")]
    NonFiniteFeature { row: usize, column: usize },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),
}

/// Errors related to internal invariants and the runtime environment.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error("Progress bar error")]
    ProgressBar(#[from] TemplateError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
