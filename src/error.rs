use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("at least one age group must stay selected")]
    EmptyAgeSelection,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
