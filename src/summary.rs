//! Three-tier summary rollup: video → section → course

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::course::{is_provider_url, section_video_urls};
use crate::error::{PipelineError, Result};
use crate::llm::{ChatMessage, LLM};
use crate::store::{
    Course, DocumentStore, SummaryStatus, TranscriptFilter, TranscriptPatch, TranscriptStatus,
};

const SYSTEM_PROMPT: &str =
    "You are an assistant that writes concise, accurate summaries of educational video content.";

/// Counts from one summary run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub videos_summarized: usize,
    pub videos_failed: usize,
    pub sections_summarized: usize,
    pub sections_skipped: usize,
    pub sections_failed: usize,
    pub course_summarized: bool,
}

/// Generates video, section and course summaries through a chat model
#[derive(Clone)]
pub struct SummaryService {
    store: Arc<dyn DocumentStore>,
    llm: Arc<dyn LLM>,
}

impl SummaryService {
    pub fn new(store: Arc<dyn DocumentStore>, llm: Arc<dyn LLM>) -> Self {
        Self { store, llm }
    }

    /// Summarize every pending video, then each section, then the course.
    /// Individual failures are logged and skipped; only a missing course
    /// aborts the run.
    pub async fn process_course_for_summaries(&self, course_id: &str) -> Result<SummaryReport> {
        let course = self.load_course(course_id).await?;
        let mut report = SummaryReport::default();

        let pending = self
            .store
            .find_transcripts(
                &TranscriptFilter::course(course_id)
                    .with_status(TranscriptStatus::Completed)
                    .summary_status_not(SummaryStatus::Completed),
            )
            .await?;
        info!("📝 Summarizing {} videos for course {}", pending.len(), course_id);

        for record in &pending {
            match self.generate_video_summary(&record.id).await {
                Ok(SummaryStatus::Completed) => report.videos_summarized += 1,
                Ok(_) => report.videos_failed += 1,
                Err(e) => {
                    warn!("Video summary failed for {}: {}", record.video_url, e);
                    report.videos_failed += 1;
                }
            }
        }

        for section in &course.sections {
            match self.generate_section_summary(course_id, &section.title).await {
                Ok(true) => report.sections_summarized += 1,
                Ok(false) => report.sections_skipped += 1,
                Err(e) => {
                    warn!("Section summary failed for '{}': {}", section.title, e);
                    report.sections_failed += 1;
                }
            }
        }

        match self.generate_course_summary(course_id).await {
            Ok(done) => report.course_summarized = done,
            Err(e) => warn!("Course summary failed for {}: {}", course_id, e),
        }

        info!(
            "✅ Summaries for course {}: {} videos, {} sections, course: {}",
            course_id, report.videos_summarized, report.sections_summarized, report.course_summarized
        );
        Ok(report)
    }

    /// Summarize one transcript. Provider failures are recorded on the record
    /// and reported through the returned status.
    pub async fn generate_video_summary(&self, transcript_id: &str) -> Result<SummaryStatus> {
        let record = self
            .store
            .get_transcript(transcript_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("transcript {}", transcript_id)))?;

        self.store
            .update_transcript(
                transcript_id,
                TranscriptPatch {
                    summary_status: Some(SummaryStatus::Pending),
                    ..Default::default()
                },
            )
            .await?;

        let prompt = format!(
            "Summarize the following video transcript in a few short paragraphs. \
             Focus on the key concepts a student should remember.\n\nTranscript:\n{}",
            record.transcript
        );

        let patch = match self.call_openai(&prompt).await {
            Ok(summary) => TranscriptPatch {
                video_summary: Some(Some(summary)),
                summary_status: Some(SummaryStatus::Completed),
                ..Default::default()
            },
            Err(e) => {
                warn!("❌ Video summary failed for {}: {}", record.video_url, e);
                TranscriptPatch {
                    summary_status: Some(SummaryStatus::Failed),
                    error: Some(Some(e.to_string())),
                    ..Default::default()
                }
            }
        };

        let status = patch.summary_status.unwrap_or(SummaryStatus::Failed);
        self.store.update_transcript(transcript_id, patch).await?;
        Ok(status)
    }

    /// Summarize a section from its videos' summaries. Returns `false` when
    /// there is nothing to summarize yet.
    pub async fn generate_section_summary(&self, course_id: &str, section_title: &str) -> Result<bool> {
        let course = self.load_course(course_id).await?;
        let Some(section) = course.sections.iter().find(|s| s.title == section_title) else {
            warn!("Section '{}' not found in course {}", section_title, course_id);
            return Ok(false);
        };

        let video_urls: Vec<String> = section_video_urls(section)
            .into_iter()
            .filter(|url| is_provider_url(url))
            .collect();
        if video_urls.is_empty() {
            debug!("Section '{}' has no provider videos", section_title);
            return Ok(false);
        }

        let transcripts = self
            .store
            .find_transcripts(
                &TranscriptFilter::course(course_id)
                    .with_status(TranscriptStatus::Completed)
                    .with_video_urls(video_urls.clone()),
            )
            .await?;

        let summaries: Vec<&str> = transcripts
            .iter()
            .filter_map(|t| t.video_summary.as_deref())
            .filter(|s| !s.trim().is_empty())
            .collect();
        if summaries.is_empty() {
            debug!("Section '{}' has no video summaries yet", section_title);
            return Ok(false);
        }

        let prompt = format!(
            "The following are summaries of the videos in the course section \"{}\". \
             Write one cohesive summary of the whole section.\n\n{}",
            section_title,
            summaries.join("\n\n")
        );
        let section_summary = self.call_openai(&prompt).await?;

        let updated = self
            .store
            .update_transcripts(
                &TranscriptFilter::course(course_id).with_video_urls(video_urls),
                TranscriptPatch {
                    section_summary: Some(Some(section_summary)),
                    ..Default::default()
                },
            )
            .await?;
        debug!("Section '{}' summary stored on {} records", section_title, updated);
        Ok(true)
    }

    /// Summarize the course from its distinct section summaries. Returns
    /// `false` when no section summary exists yet.
    pub async fn generate_course_summary(&self, course_id: &str) -> Result<bool> {
        let course = self.load_course(course_id).await?;
        let transcripts = self
            .store
            .find_transcripts(&TranscriptFilter::course(course_id))
            .await?;

        let mut seen = HashSet::new();
        let section_summaries: Vec<&str> = transcripts
            .iter()
            .filter_map(|t| t.section_summary.as_deref())
            .filter(|s| !s.trim().is_empty() && seen.insert(*s))
            .collect();
        if section_summaries.is_empty() {
            debug!("Course {} has no section summaries yet", course_id);
            return Ok(false);
        }

        let prompt = course_prompt(&course, &section_summaries);
        let course_summary = self.call_openai(&prompt).await?;

        self.store
            .update_transcripts(
                &TranscriptFilter::course(course_id),
                TranscriptPatch {
                    course_summary: Some(Some(course_summary)),
                    ..Default::default()
                },
            )
            .await?;
        Ok(true)
    }

    async fn call_openai(&self, prompt: &str) -> Result<String> {
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let response = self
            .llm
            .chat(messages)
            .await
            .map_err(|e| PipelineError::SummaryProvider(e.to_string()))?;

        debug!("Summary generated (tokens: {:?})", response.tokens_used);
        Ok(response.content.trim().to_string())
    }

    async fn load_course(&self, course_id: &str) -> Result<Course> {
        self.store
            .get_course(course_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("course {}", course_id)))
    }
}

fn course_prompt(course: &Course, section_summaries: &[&str]) -> String {
    format!(
        "Course title: {}\nCourse description: {}\n\n\
         The following are summaries of the course sections. Write an overall \
         summary of the course that explains what a student will learn.\n\n{}",
        course.title,
        course.description,
        section_summaries.join("\n\n")
    )
}
