//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::handlers;
use super::models::{ErrorBody, ProcessRequest, UpdateTranscriptRequest};
use crate::cache::CacheClient;
use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::MindmapPipeline;
use crate::store::DocumentStore;
use crate::summary::SummaryService;
use crate::transcription::TranscriptionService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: MindmapPipeline,
    pub transcripts: TranscriptionService,
    pub summaries: Option<Arc<SummaryService>>,
    pub store: Arc<dyn DocumentStore>,
    pub cache: CacheClient,
    pub config: Arc<Config>,
}

/// Pipeline error rendered as `{"error": ...}` with its mapped status
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed ({}): {}", status, self.0);
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/mindmaps/courses/:course_id/videos/*video_url",
            get(mindmap_handler),
        )
        .route(
            "/transcriptions/courses/:course_id/process",
            post(process_course_handler),
        )
        .route(
            "/transcriptions/courses/:course_id/status",
            get(course_status_handler),
        )
        .route(
            "/transcriptions/courses/:course_id/videos/*video_url",
            get(get_transcript_handler).put(put_transcript_handler),
        )
        .route(
            "/summaries/courses/:course_id/process",
            post(process_summaries_handler),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Bind and serve until the process exits
pub async fn start_http_server(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    info!("🌐 API server listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(handlers::health_check(&state).await)
}

async fn mindmap_handler(
    State(state): State<AppState>,
    Path((course_id, video_url)): Path<(String, String)>,
) -> ApiResult<Response> {
    let markdown = handlers::get_mindmap(&state, &course_id, &video_url).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown,
    )
        .into_response())
}

async fn process_course_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    body: Option<Json<ProcessRequest>>,
) -> ApiResult<Response> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let accepted = handlers::start_course_processing(&state, &course_id, request.access_token).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

async fn course_status_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Response> {
    let status = handlers::get_course_status(&state, &course_id).await?;
    Ok(Json(status).into_response())
}

async fn get_transcript_handler(
    State(state): State<AppState>,
    Path((course_id, video_url)): Path<(String, String)>,
) -> ApiResult<Response> {
    let transcript = handlers::get_transcript(&state, &course_id, &video_url).await?;
    Ok(Json(transcript).into_response())
}

async fn put_transcript_handler(
    State(state): State<AppState>,
    Path((course_id, video_url)): Path<(String, String)>,
    Json(request): Json<UpdateTranscriptRequest>,
) -> ApiResult<Response> {
    let transcript =
        handlers::put_transcript(&state, &course_id, &video_url, &request.transcript).await?;
    Ok(Json(transcript).into_response())
}

async fn process_summaries_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Response> {
    let accepted = handlers::start_summaries(&state, &course_id).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}
