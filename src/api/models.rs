//! API request and response bodies

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Error body returned with every non-2xx status
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl From<&PipelineError> for ErrorBody {
    fn from(error: &PipelineError) -> Self {
        Self {
            error: error.to_string(),
            status: error.status_code(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub cache: String,
    pub timestamp: String,
}

/// Body of a course processing request; the configured token is used when absent
#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    pub access_token: Option<String>,
}

/// Acknowledgement for work started in the background
#[derive(Debug, Serialize, Deserialize)]
pub struct Accepted {
    pub message: String,
    pub course_id: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTranscriptRequest {
    pub transcript: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub course_id: String,
    pub video_url: String,
    pub transcript: String,
}
