use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transcript fetch status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStatus::Pending => "pending",
            TranscriptStatus::Completed => "completed",
            TranscriptStatus::Failed => "failed",
        }
    }
}

/// Summary generation status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    #[default]
    Unset,
    Pending,
    Completed,
    Failed,
}

/// One transcript per (course, video URL) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoTranscript {
    pub id: String,
    pub course_id: String,
    pub video_url: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub status: TranscriptStatus,
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    pub error: Option<String>,
    pub video_summary: Option<String>,
    pub section_summary: Option<String>,
    pub course_summary: Option<String>,
    #[serde(default)]
    pub summary_status: SummaryStatus,
}

impl VideoTranscript {
    pub fn new(course_id: &str, video_url: &str) -> Self {
        Self {
            id: transcript_id(course_id, video_url),
            course_id: course_id.to_string(),
            video_url: video_url.to_string(),
            transcript: String::new(),
            status: TranscriptStatus::Pending,
            last_attempt: None,
            retry_count: 0,
            error: None,
            video_summary: None,
            section_summary: None,
            course_summary: None,
            summary_status: SummaryStatus::Unset,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.transcript.trim().is_empty()
    }

    /// Status as implied by the stored text: a record holding transcript text
    /// is completed whatever its status field says
    pub fn effective_status(&self) -> TranscriptStatus {
        if self.has_text() {
            TranscriptStatus::Completed
        } else {
            self.status
        }
    }

    /// Apply a field-level patch
    pub fn apply(&mut self, patch: &TranscriptPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref transcript) = patch.transcript {
            self.transcript = transcript.clone();
        }
        if let Some(last_attempt) = patch.last_attempt {
            self.last_attempt = Some(last_attempt);
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(ref error) = patch.error {
            self.error = error.clone();
        }
        if let Some(ref summary) = patch.video_summary {
            self.video_summary = summary.clone();
        }
        if let Some(ref summary) = patch.section_summary {
            self.section_summary = summary.clone();
        }
        if let Some(ref summary) = patch.course_summary {
            self.course_summary = summary.clone();
        }
        if let Some(summary_status) = patch.summary_status {
            self.summary_status = summary_status;
        }
    }
}

/// Stable record id for a (course, video) pair
pub fn transcript_id(course_id: &str, video_url: &str) -> String {
    format!("{:x}", md5::compute(format!("{}\n{}", course_id, video_url)))
}

/// Partial update of a transcript record. `None` leaves a field untouched;
/// nullable fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptPatch {
    pub status: Option<TranscriptStatus>,
    pub transcript: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub retry_count: Option<u32>,
    pub error: Option<Option<String>>,
    pub video_summary: Option<Option<String>>,
    pub section_summary: Option<Option<String>>,
    pub course_summary: Option<Option<String>>,
    pub summary_status: Option<SummaryStatus>,
}

/// Criteria for transcript queries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct TranscriptFilter {
    pub course_id: Option<String>,
    pub status: Option<TranscriptStatus>,
    pub summary_status_not: Option<SummaryStatus>,
    pub video_urls: Option<Vec<String>>,
}

impl TranscriptFilter {
    pub fn course(course_id: &str) -> Self {
        Self {
            course_id: Some(course_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TranscriptStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn summary_status_not(mut self, status: SummaryStatus) -> Self {
        self.summary_status_not = Some(status);
        self
    }

    pub fn with_video_urls(mut self, urls: Vec<String>) -> Self {
        self.video_urls = Some(urls);
        self
    }

    pub fn matches(&self, record: &VideoTranscript) -> bool {
        if let Some(ref course_id) = self.course_id {
            if &record.course_id != course_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(excluded) = self.summary_status_not {
            if record.summary_status == excluded {
                return false;
            }
        }
        if let Some(ref urls) = self.video_urls {
            if !urls.iter().any(|u| u == &record.video_url) {
                return false;
            }
        }
        true
    }
}

/// Course as read from the platform (read-only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<CourseSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseSection {
    pub title: String,
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

/// Content tree node, discriminated by its `type` field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Video {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    Lesson {
        title: String,
        /// Lesson body; may embed a provider player URL
        #[serde(default)]
        media_content: Option<String>,
    },
    Section {
        title: String,
        #[serde(default)]
        content: Vec<ContentItem>,
    },
    #[serde(other)]
    Other,
}
