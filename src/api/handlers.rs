//! API request handlers

use tracing::{error, info};

use super::models::{Accepted, HealthResponse, TranscriptResponse};
use super::server::AppState;
use crate::error::{PipelineError, Result};
use crate::pipeline::normalize_url;
use crate::transcription::CourseTranscriptionStatus;

pub async fn health_check(state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: format!("{:?}", state.cache.state()).to_lowercase(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

pub async fn get_mindmap(state: &AppState, course_id: &str, video_url: &str) -> Result<String> {
    state.pipeline.generate_mindmap(course_id, video_url).await
}

/// Start transcribing a course in the background
pub async fn start_course_processing(
    state: &AppState,
    course_id: &str,
    access_token: Option<String>,
) -> Result<Accepted> {
    let token = access_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| state.config.captions.access_token.clone())
        .ok_or(PipelineError::Auth)?;

    if state.store.get_course(course_id).await?.is_none() {
        return Err(PipelineError::NotFound(format!("course {}", course_id)));
    }

    let transcripts = state.transcripts.clone();
    let id = course_id.to_string();
    tokio::spawn(async move {
        match transcripts.process_course_videos(&id, &token).await {
            Ok(report) => info!(
                "📊 Background run for {}: {} completed, {} failed",
                id, report.completed, report.failed
            ),
            Err(e) => error!("Background run for {} failed: {}", id, e),
        }
    });

    Ok(accepted("Transcription started", course_id))
}

pub async fn get_course_status(state: &AppState, course_id: &str) -> Result<CourseTranscriptionStatus> {
    state.transcripts.course_status(course_id).await
}

pub async fn get_transcript(
    state: &AppState,
    course_id: &str,
    video_url: &str,
) -> Result<TranscriptResponse> {
    let video_url = normalize_url(video_url);
    let transcript = state
        .transcripts
        .get_transcription(course_id, &video_url)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("transcript for {}", video_url)))?;

    Ok(TranscriptResponse {
        course_id: course_id.to_string(),
        video_url,
        transcript,
    })
}

pub async fn put_transcript(
    state: &AppState,
    course_id: &str,
    video_url: &str,
    transcript: &str,
) -> Result<TranscriptResponse> {
    let video_url = normalize_url(video_url);
    let record = state
        .transcripts
        .update_transcription(course_id, &video_url, transcript)
        .await?;

    Ok(TranscriptResponse {
        course_id: record.course_id,
        video_url: record.video_url,
        transcript: record.transcript,
    })
}

/// Start the summary rollup for a course in the background
pub async fn start_summaries(state: &AppState, course_id: &str) -> Result<Accepted> {
    let summaries = state.summaries.clone().ok_or_else(|| {
        PipelineError::Config("summaries are disabled: no chat-completion API key".to_string())
    })?;

    if state.store.get_course(course_id).await?.is_none() {
        return Err(PipelineError::NotFound(format!("course {}", course_id)));
    }

    let id = course_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = summaries.process_course_for_summaries(&id).await {
            error!("Summary run for {} failed: {}", id, e);
        }
    });

    Ok(accepted("Summary generation started", course_id))
}

fn accepted(message: &str, course_id: &str) -> Accepted {
    Accepted {
        message: message.to_string(),
        course_id: course_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}
