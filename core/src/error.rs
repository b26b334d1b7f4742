use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeakageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No input data: {0}")]
    NoInputData(String),

    #[error("Detector '{detector}' needs column '{column}' which the joined table does not provide")]
    MissingColumn {
        detector: &'static str,
        column:   String,
    },

    #[error("Invalid severity table '{table}': {reason}")]
    InvalidSeverityTable { table: String, reason: String },

    #[error("Invalid value for {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("Outlier model error: {0}")]
    Model(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type LeakageResult<T> = Result<T, LeakageError>;
