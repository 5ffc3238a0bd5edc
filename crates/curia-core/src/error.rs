use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No hierarchy has been committed for the document yet.
    #[error("Summary index unavailable for document '{0}'")]
    IndexUnavailable(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Answer synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    /// Summarization aborted; nothing was committed for the document.
    #[error("Hierarchy build failed for document '{document_id}': {reason}")]
    BuildFailed { document_id: String, reason: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Document store failure: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            Self::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            Self::SynthesisUnavailable(_) => "SYNTHESIS_UNAVAILABLE",
            Self::BuildFailed { .. } => "BUILD_FAILED",
            Self::Cancelled(_) => "CANCELLED",
            Self::Conflict(_) => "CONFLICT",
            Self::Store(_) => "STORE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    pub fn build_failed(document_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BuildFailed { document_id: document_id.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
