use std::time::Duration;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for the transcript-to-knowledge pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("Caption provider rejected the access token")]
    Auth,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Caption provider error {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Summary provider error: {0}")]
    SummaryProvider(String),

    #[error("Failed to structure transcription: {0}")]
    Structuring(String),

    #[error("AI service unavailable: {0}")]
    AiService(String),

    #[error("Transcription not ready: {0}")]
    NotReady(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// HTTP status code the API layer answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::InvalidUrl(_) | PipelineError::BadRequest(_) => 400,
            PipelineError::Auth => 401,
            PipelineError::NotFound(_) => 404,
            PipelineError::NotReady(_) => 409,
            PipelineError::Provider { .. }
            | PipelineError::SummaryProvider(_)
            | PipelineError::Http(_) => 502,
            PipelineError::AiService(_) => 503,
            PipelineError::Timeout(_) => 504,
            PipelineError::Structuring(_)
            | PipelineError::Store(_)
            | PipelineError::Config(_)
            | PipelineError::Json(_)
            | PipelineError::Io(_) => 500,
        }
    }
}
