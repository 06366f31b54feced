use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinancialHealthError {
    #[error("Unrecognized document format: {document}")]
    UnrecognizedFormat { document: String },

    #[error("Malformed row {row} in {document}: {details}")]
    MalformedRow {
        document: String,
        row: usize,
        details: String,
    },

    #[error("Missing required field '{field}' in {document} (row {row})")]
    MissingRequiredField {
        document: String,
        row: usize,
        field: String,
    },

    #[error("Period conflict in {document_type} for '{key}' at {period}: {first} ({first_source}) vs {second} ({second_source})")]
    PeriodConflict {
        document_type: String,
        key: String,
        period: String,
        first: f64,
        first_source: String,
        second: f64,
        second_source: String,
    },

    #[error("No scorable metrics: every configured scoring rule is missing its input")]
    NoScorableMetrics,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FinancialHealthError>;
