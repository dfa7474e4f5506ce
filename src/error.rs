use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A plan-tree node whose stage tag is not in the known set. Fatal for
    /// the record being classified; the rest of the stream continues.
    #[error("unknown plan stage {stage:?} in record: {record}")]
    UnknownStage { stage: String, record: String },

    /// An index-use stage without an index name or key pattern to derive one.
    #[error("stage {stage} carries no index name in record: {record}")]
    MissingIndexName { stage: String, record: String },
}

/// Convenience Result type using our Error
pub type Result<T> = std::result::Result<T, Error>;
