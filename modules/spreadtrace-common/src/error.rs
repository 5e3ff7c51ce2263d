use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpreadTraceError {
    #[error("No data collected from any source")]
    EmptyInput,

    #[error("Propagation graph has no nodes after construction")]
    EmptyGraph,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error ({platform}): {message}")]
    Source { platform: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SpreadTraceError>;
