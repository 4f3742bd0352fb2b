//! Document store access for courses and video transcripts

pub mod memory;
pub mod models;

pub use memory::MemoryStore;
pub use models::{
    transcript_id, ContentItem, Course, CourseSection, SummaryStatus, TranscriptFilter,
    TranscriptPatch, TranscriptStatus, VideoTranscript,
};

use async_trait::async_trait;

use crate::error::Result;

/// Operations the pipeline needs from the platform's document store.
///
/// Updates are field-level patches; concurrent writers touching the same
/// record resolve last-write-wins per field.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>>;

    async fn find_transcript(&self, course_id: &str, video_url: &str)
        -> Result<Option<VideoTranscript>>;

    async fn get_transcript(&self, id: &str) -> Result<Option<VideoTranscript>>;

    async fn find_transcripts(&self, filter: &TranscriptFilter) -> Result<Vec<VideoTranscript>>;

    /// Patch the record for the pair, creating it first when absent
    async fn upsert_transcript(
        &self,
        course_id: &str,
        video_url: &str,
        patch: TranscriptPatch,
    ) -> Result<VideoTranscript>;

    /// Patch an existing record by id; `None` when it does not exist
    async fn update_transcript(&self, id: &str, patch: TranscriptPatch)
        -> Result<Option<VideoTranscript>>;

    /// Patch every record matching `filter`, returning how many matched
    async fn update_transcripts(&self, filter: &TranscriptFilter, patch: TranscriptPatch)
        -> Result<usize>;
}
