use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::models::{transcript_id, Course, TranscriptFilter, TranscriptPatch, VideoTranscript};
use super::DocumentStore;
use crate::error::Result;

/// In-process document store with optional JSON persistence.
///
/// With a state directory, every course lives in `courses/{digest}.json` and
/// every transcript in `transcripts/{id}.json`. Files are written while the
/// map's write lock is held, so disk order matches memory order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state_dir: Option<PathBuf>,
    courses: Arc<RwLock<HashMap<String, Course>>>,
    transcripts: Arc<RwLock<HashMap<String, VideoTranscript>>>,
}

impl MemoryStore {
    /// Volatile store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted under `state_dir`, loading existing records
    pub async fn open(state_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(state_dir.join("courses")).await?;
        fs::create_dir_all(state_dir.join("transcripts")).await?;

        let store = Self {
            state_dir: Some(state_dir.clone()),
            ..Default::default()
        };

        let courses: Vec<Course> = load_records(&state_dir.join("courses")).await?;
        let transcripts: Vec<VideoTranscript> = load_records(&state_dir.join("transcripts")).await?;
        {
            let mut course_map = store.courses.write().await;
            for course in courses {
                course_map.insert(course.id.clone(), course);
            }
            let mut transcript_map = store.transcripts.write().await;
            for record in transcripts {
                transcript_map.insert(record.id.clone(), record);
            }
        }

        info!(
            "📊 Document store opened at {} ({} courses, {} transcripts)",
            state_dir.display(),
            store.courses.read().await.len(),
            store.transcripts.read().await.len()
        );
        Ok(store)
    }

    /// Add or replace a course
    pub async fn insert_course(&self, course: Course) -> Result<()> {
        let mut courses = self.courses.write().await;
        if let Some(ref dir) = self.state_dir {
            let path = dir.join("courses").join(format!("{}.json", course_file_stem(&course.id)));
            fs::write(path, serde_json::to_string_pretty(&course)?).await?;
        }
        courses.insert(course.id.clone(), course);
        Ok(())
    }

    /// Import courses from a JSON array file
    pub async fn import_courses(&self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path).await?;
        let courses: Vec<Course> = serde_json::from_str(&content)?;
        let count = courses.len();
        for course in courses {
            self.insert_course(course).await?;
        }
        info!("📥 Imported {} courses from {}", count, path.display());
        Ok(count)
    }

    async fn persist_transcript(&self, record: &VideoTranscript) -> Result<()> {
        if let Some(ref dir) = self.state_dir {
            let path = dir.join("transcripts").join(format!("{}.json", record.id));
            fs::write(path, serde_json::to_string_pretty(record)?).await?;
        }
        Ok(())
    }
}

fn course_file_stem(id: &str) -> String {
    format!("{:x}", md5::compute(id.as_bytes()))
}

async fn load_records<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Failed to load record {}: {}", path.display(), e),
            }
        }
    }

    Ok(records)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        Ok(self.courses.read().await.get(course_id).cloned())
    }

    async fn find_transcript(
        &self,
        course_id: &str,
        video_url: &str,
    ) -> Result<Option<VideoTranscript>> {
        let id = transcript_id(course_id, video_url);
        Ok(self.transcripts.read().await.get(&id).cloned())
    }

    async fn get_transcript(&self, id: &str) -> Result<Option<VideoTranscript>> {
        Ok(self.transcripts.read().await.get(id).cloned())
    }

    async fn find_transcripts(&self, filter: &TranscriptFilter) -> Result<Vec<VideoTranscript>> {
        let transcripts = self.transcripts.read().await;
        let mut found: Vec<VideoTranscript> = transcripts
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.video_url.cmp(&b.video_url));
        Ok(found)
    }

    async fn upsert_transcript(
        &self,
        course_id: &str,
        video_url: &str,
        patch: TranscriptPatch,
    ) -> Result<VideoTranscript> {
        let id = transcript_id(course_id, video_url);
        let mut transcripts = self.transcripts.write().await;
        let record = transcripts.entry(id).or_insert_with(|| {
            debug!("🆕 Creating transcript record for {} / {}", course_id, video_url);
            VideoTranscript::new(course_id, video_url)
        });
        record.apply(&patch);
        let record = record.clone();

        self.persist_transcript(&record).await?;
        Ok(record)
    }

    async fn update_transcript(
        &self,
        id: &str,
        patch: TranscriptPatch,
    ) -> Result<Option<VideoTranscript>> {
        let mut transcripts = self.transcripts.write().await;
        let record = match transcripts.get_mut(id) {
            Some(record) => {
                record.apply(&patch);
                record.clone()
            }
            None => return Ok(None),
        };

        self.persist_transcript(&record).await?;
        Ok(Some(record))
    }

    async fn update_transcripts(
        &self,
        filter: &TranscriptFilter,
        patch: TranscriptPatch,
    ) -> Result<usize> {
        let mut transcripts = self.transcripts.write().await;
        let updated: Vec<VideoTranscript> = transcripts
            .values_mut()
            .filter(|record| filter.matches(record))
            .map(|record| {
                record.apply(&patch);
                record.clone()
            })
            .collect();

        for record in &updated {
            self.persist_transcript(record).await?;
        }
        Ok(updated.len())
    }
}
