use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cache::{keys, CacheClient};
use crate::captions::{TranscriptFetcher, NO_TRANSCRIPTION};
use crate::config::PipelineConfig;
use crate::course::course_video_urls;
use crate::error::{PipelineError, Result};
use crate::pipeline::response_cache_urls;
use crate::store::{
    DocumentStore, TranscriptFilter, TranscriptPatch, TranscriptStatus, VideoTranscript,
};
use crate::summary::{SummaryReport, SummaryService};

/// What a single `process_video` call did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum VideoOutcome {
    Completed,
    AlreadyCompleted,
    RetriesExhausted,
    BackingOff,
    Failed(String),
}

/// Aggregate result of a course run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRunReport {
    pub course_id: String,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub summaries: Option<SummaryReport>,
}

/// Per-video row of a status query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStatusRow {
    pub video_url: String,
    pub status: TranscriptStatus,
    pub retry_count: u32,
    pub last_attempt: Option<chrono::DateTime<Utc>>,
    pub error: Option<String>,
    pub transcript_chars: usize,
}

/// Transcription progress for one course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseTranscriptionStatus {
    pub course_id: String,
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub videos: Vec<VideoStatusRow>,
}

/// Coordinates transcript fetching for course videos
#[derive(Clone)]
pub struct TranscriptionService {
    store: Arc<dyn DocumentStore>,
    cache: CacheClient,
    fetcher: TranscriptFetcher,
    summaries: Option<Arc<SummaryService>>,
    settings: PipelineConfig,
}

impl TranscriptionService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: CacheClient,
        fetcher: TranscriptFetcher,
        mut settings: PipelineConfig,
    ) -> Self {
        settings.batch_size = settings.batch_size.max(1);
        Self {
            store,
            cache,
            fetcher,
            summaries: None,
            settings,
        }
    }

    /// Run summaries after every course transcription run
    pub fn with_summaries(mut self, summaries: Arc<SummaryService>) -> Self {
        self.summaries = Some(summaries);
        self
    }

    /// Transcribe every video of a course in throttled batches
    pub async fn process_course_videos(
        &self,
        course_id: &str,
        access_token: &str,
    ) -> Result<CourseRunReport> {
        let start_time = Instant::now();
        let course = self
            .store
            .get_course(course_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("course {}", course_id)))?;

        let video_urls = course_video_urls(&course);
        info!(
            "🚀 Transcribing {} videos for course {} in batches of {}",
            video_urls.len(),
            course_id,
            self.settings.batch_size
        );

        let mut report = CourseRunReport {
            course_id: course_id.to_string(),
            total: video_urls.len(),
            completed: 0,
            skipped: 0,
            failed: 0,
            elapsed: Duration::ZERO,
            summaries: None,
        };

        for (index, batch) in video_urls.chunks(self.settings.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_pause()).await;
            }
            debug!("📦 Batch {} ({} videos)", index + 1, batch.len());

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|url| self.process_video(course_id, url, access_token)),
            )
            .await;

            for (url, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(VideoOutcome::Completed) => report.completed += 1,
                    Ok(VideoOutcome::Failed(message)) => {
                        warn!("❌ Transcription failed for {}: {}", url, message);
                        report.failed += 1;
                    }
                    Ok(_) => report.skipped += 1,
                    Err(e) => {
                        error!("Processing error for {}: {}", url, e);
                        report.failed += 1;
                    }
                }
            }
        }

        if let Some(ref summaries) = self.summaries {
            match summaries.process_course_for_summaries(course_id).await {
                Ok(summary_report) => report.summaries = Some(summary_report),
                Err(e) => error!("Summary generation failed for course {}: {}", course_id, e),
            }
        }

        report.elapsed = start_time.elapsed();
        info!(
            "🎉 Course {} done in {:.2}s: {} completed, {} skipped, {} failed",
            course_id,
            report.elapsed.as_secs_f64(),
            report.completed,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Fetch one video's transcript unless it is done, exhausted or backing off
    pub async fn process_video(
        &self,
        course_id: &str,
        video_url: &str,
        access_token: &str,
    ) -> Result<VideoOutcome> {
        let record = match self.store.find_transcript(course_id, video_url).await? {
            Some(record) => record,
            None => {
                self.store
                    .upsert_transcript(course_id, video_url, TranscriptPatch::default())
                    .await?
            }
        };

        if let Some(skip) = self.skip_reason(&record) {
            debug!("Skipping {}: {:?}", video_url, skip);
            return Ok(skip);
        }

        let attempt = record.retry_count + 1;
        self.store
            .upsert_transcript(
                course_id,
                video_url,
                TranscriptPatch {
                    status: Some(TranscriptStatus::Pending),
                    last_attempt: Some(Utc::now()),
                    retry_count: Some(attempt),
                    ..Default::default()
                },
            )
            .await?;

        match self.fetcher.fetch_captions(video_url, access_token).await {
            Ok(text) => {
                let text = if text.trim().is_empty() {
                    NO_TRANSCRIPTION.to_string()
                } else {
                    text
                };

                self.store
                    .upsert_transcript(
                        course_id,
                        video_url,
                        TranscriptPatch {
                            transcript: Some(text.clone()),
                            status: Some(TranscriptStatus::Completed),
                            error: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;

                self.cache
                    .set_text(
                        &keys::transcription(course_id, video_url),
                        self.settings.transcript_ttl_seconds,
                        &text,
                    )
                    .await;

                info!("✅ Transcribed {} ({} chars, attempt {})", video_url, text.len(), attempt);
                Ok(VideoOutcome::Completed)
            }
            Err(e) => {
                let message = e.to_string();
                self.store
                    .upsert_transcript(
                        course_id,
                        video_url,
                        TranscriptPatch {
                            status: Some(TranscriptStatus::Failed),
                            error: Some(Some(message.clone())),
                            last_attempt: Some(Utc::now()),
                            retry_count: Some(attempt),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(VideoOutcome::Failed(message))
            }
        }
    }

    fn skip_reason(&self, record: &VideoTranscript) -> Option<VideoOutcome> {
        if record.effective_status() == TranscriptStatus::Completed {
            return Some(VideoOutcome::AlreadyCompleted);
        }
        if record.retry_count >= self.settings.max_retries {
            return Some(VideoOutcome::RetriesExhausted);
        }
        if record.status == TranscriptStatus::Failed {
            if let Some(last_attempt) = record.last_attempt {
                if Utc::now() - last_attempt < self.settings.retry_delay() {
                    return Some(VideoOutcome::BackingOff);
                }
            }
        }
        None
    }

    /// Read-through transcript lookup
    pub async fn get_transcription(&self, course_id: &str, video_url: &str) -> Result<Option<String>> {
        let key = keys::transcription(course_id, video_url);
        if let Some(text) = self.cache.get_text(&key).await {
            return Ok(Some(text));
        }

        let text = self
            .store
            .find_transcript(course_id, video_url)
            .await?
            .map(|record| record.transcript)
            .filter(|text| !text.trim().is_empty());

        if let Some(ref text) = text {
            self.cache
                .set_text(&key, self.settings.transcript_ttl_seconds, text)
                .await;
        }
        Ok(text)
    }

    /// Administrative overwrite of a transcript
    pub async fn update_transcription(
        &self,
        course_id: &str,
        video_url: &str,
        text: &str,
    ) -> Result<VideoTranscript> {
        if text.trim().is_empty() {
            return Err(PipelineError::BadRequest(
                "transcript text must not be empty".to_string(),
            ));
        }

        let record = self
            .store
            .upsert_transcript(
                course_id,
                video_url,
                TranscriptPatch {
                    transcript: Some(text.to_string()),
                    status: Some(TranscriptStatus::Completed),
                    error: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        self.cache
            .set_text(
                &keys::transcription(course_id, video_url),
                self.settings.transcript_ttl_seconds,
                text,
            )
            .await;

        // Mind maps built from the old text are stale now, under whichever
        // spelling they were requested
        for url in response_cache_urls(video_url) {
            self.cache.delete(&keys::mindmap_response(course_id, &url)).await;
        }
        self.cache.delete(&keys::mindmap_structure(course_id, video_url)).await;
        self.cache.delete(&keys::mindmap_markdown(course_id, video_url)).await;

        info!("✏️ Transcript for {} updated manually", video_url);
        Ok(record)
    }

    /// Status counts and rows for every known video of a course
    pub async fn course_status(&self, course_id: &str) -> Result<CourseTranscriptionStatus> {
        let records = self
            .store
            .find_transcripts(&TranscriptFilter::course(course_id))
            .await?;

        let count = |status: TranscriptStatus| {
            records
                .iter()
                .filter(|r| r.effective_status() == status)
                .count()
        };
        let videos = records
            .iter()
            .map(|r| VideoStatusRow {
                video_url: r.video_url.clone(),
                status: r.effective_status(),
                retry_count: r.retry_count,
                last_attempt: r.last_attempt,
                error: r.error.clone(),
                transcript_chars: r.transcript.len(),
            })
            .collect();

        Ok(CourseTranscriptionStatus {
            course_id: course_id.to_string(),
            total: records.len(),
            pending: count(TranscriptStatus::Pending),
            completed: count(TranscriptStatus::Completed),
            failed: count(TranscriptStatus::Failed),
            videos,
        })
    }

    /// Put unfinished records back to pending with a zero retry count.
    /// Completed records are never touched.
    pub async fn reset_course(&self, course_id: &str, only_failed: bool) -> Result<usize> {
        let records = self
            .store
            .find_transcripts(&TranscriptFilter::course(course_id))
            .await?;

        let mut reset = 0;
        for record in records {
            let eligible = match record.effective_status() {
                TranscriptStatus::Completed => false,
                TranscriptStatus::Failed => true,
                TranscriptStatus::Pending => !only_failed,
            };
            if !eligible {
                continue;
            }

            self.store
                .update_transcript(
                    &record.id,
                    TranscriptPatch {
                        status: Some(TranscriptStatus::Pending),
                        retry_count: Some(0),
                        error: Some(None),
                        ..Default::default()
                    },
                )
                .await?;
            reset += 1;
        }

        info!("🔄 Reset {} transcript records for course {}", reset, course_id);
        Ok(reset)
    }
}
