use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A missing-data cell reached a path neither filtering policy resolves.
    #[error("Missing-data policy violation: {0}")]
    MissingDataPolicyViolation(String),

    /// A source accession has no identifier in the target namespace.
    #[error("Identifier mapping failure: {0}")]
    IdentifierMappingFailure(String),

    /// A filter or threshold step removed every row.
    #[error("Empty result set: {0}")]
    EmptyResultSet(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
