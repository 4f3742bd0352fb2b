use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use mindmap_pipeline::cache::{keys, CacheClient, MemoryBackend};
use mindmap_pipeline::captions::{CaptionApi, TextTrack, TranscriptFetcher};
use mindmap_pipeline::config::PipelineConfig;
use mindmap_pipeline::llm::{ChatMessage, LLMError, LLMProvider, LLMResponse, LLM};
use mindmap_pipeline::mindmap::structurer::structuring_prompt;
use mindmap_pipeline::mindmap::{
    parse_outline, render_outline_locally, MarkmapRenderer, MindmapContext, MindmapStructurer,
    OutlineNode, StructuredOutline,
};
use mindmap_pipeline::pipeline::MindmapPipeline;
use mindmap_pipeline::store::{
    ContentItem, Course, CourseSection, DocumentStore, MemoryStore, SummaryStatus,
    TranscriptFilter, TranscriptPatch, TranscriptStatus, VideoTranscript,
};
use mindmap_pipeline::summary::SummaryService;
use mindmap_pipeline::transcription::{TranscriptionService, VideoOutcome};
use mindmap_pipeline::{PipelineError, Result};

const TOKEN: &str = "valid-token";
const V1: &str = "https://vimeo.com/111";

const HELLO_WORLD_VTT: &str = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:01.000\nHello\n\n2\n00:00:01.000 --> 00:00:02.000\nworld\n";

/// Caption provider fake counting every call and the peak number of
/// concurrent track listings
struct FakeCaptions {
    vtt: String,
    fail: bool,
    failing_ids: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCaptions {
    fn serving(vtt: &str) -> Self {
        Self {
            vtt: vtt.to_string(),
            fail: false,
            failing_ids: Vec::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::serving("")
        }
    }

    /// Serves every video except the given ids, holding each listing open
    /// briefly so batch members overlap
    fn slow_failing_for(ids: &[&str]) -> Self {
        Self {
            failing_ids: ids.iter().map(|id| id.to_string()).collect(),
            delay: Some(Duration::from_millis(20)),
            ..Self::serving(HELLO_WORLD_VTT)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionApi for FakeCaptions {
    async fn list_tracks(&self, video_id: &str, access_token: &str) -> Result<Vec<TextTrack>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail || self.failing_ids.iter().any(|id| id == video_id) {
            return Err(PipelineError::Provider {
                status: 500,
                body: "upstream down".to_string(),
            });
        }
        if access_token != TOKEN {
            return Err(PipelineError::Auth);
        }
        Ok(vec![TextTrack {
            link: format!("https://captions.test/{}.vtt", video_id),
            language: Some("en".to_string()),
            kind: Some("captions".to_string()),
            active: true,
        }])
    }

    async fn download_track(&self, _link: &str, _access_token: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vtt.clone())
    }
}

/// Model fake recording prompts. Structuring prompts get a fixed outline,
/// rendering prompts a local rendering of the outline they carry, anything
/// else a canned summary.
#[derive(Default)]
struct SpyLLM {
    prompts: Mutex<Vec<String>>,
}

impl SpyLLM {
    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LLM for SpyLLM {
    async fn chat(&self, messages: Vec<ChatMessage>) -> std::result::Result<LLMResponse, LLMError> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt.clone());

        let content = if let Some((_, outline_json)) = prompt.split_once("Outline:\n") {
            let outline = parse_outline(outline_json).map_err(LLMError::Configuration)?;
            format!("```markdown\n{}```", render_outline_locally(&outline))
        } else if prompt.contains("Transcript:\n") && prompt.contains("```json") {
            "Here is the outline:\n```json\n{\"title\": \"Lecture\", \"summary\": \"About A\", \"nodes\": [{\"name\": \"A\", \"children\": [{\"name\": \"B\"}]}]}\n```".to_string()
        } else {
            format!("summary #{}", self.calls())
        };

        Ok(LLMResponse {
            content,
            tokens_used: Some(10),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }
}

/// Chat model that is always down
struct FailingLLM;

#[async_trait]
impl LLM for FailingLLM {
    async fn chat(&self, _messages: Vec<ChatMessage>) -> std::result::Result<LLMResponse, LLMError> {
        Err(LLMError::Api {
            provider: LLMProvider::OpenAI,
            status: 500,
            body: "model overloaded".to_string(),
        })
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::OpenAI
    }
}

/// Store wrapper counting every access
struct CountingStore {
    inner: MemoryStore,
    accesses: AtomicUsize,
}

impl CountingStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            accesses: AtomicUsize::new(0),
        }
    }

    fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        self.touch();
        self.inner.get_course(course_id).await
    }

    async fn find_transcript(&self, course_id: &str, video_url: &str) -> Result<Option<VideoTranscript>> {
        self.touch();
        self.inner.find_transcript(course_id, video_url).await
    }

    async fn get_transcript(&self, id: &str) -> Result<Option<VideoTranscript>> {
        self.touch();
        self.inner.get_transcript(id).await
    }

    async fn find_transcripts(&self, filter: &TranscriptFilter) -> Result<Vec<VideoTranscript>> {
        self.touch();
        self.inner.find_transcripts(filter).await
    }

    async fn upsert_transcript(
        &self,
        course_id: &str,
        video_url: &str,
        patch: TranscriptPatch,
    ) -> Result<VideoTranscript> {
        self.touch();
        self.inner.upsert_transcript(course_id, video_url, patch).await
    }

    async fn update_transcript(&self, id: &str, patch: TranscriptPatch) -> Result<Option<VideoTranscript>> {
        self.touch();
        self.inner.update_transcript(id, patch).await
    }

    async fn update_transcripts(&self, filter: &TranscriptFilter, patch: TranscriptPatch) -> Result<usize> {
        self.touch();
        self.inner.update_transcripts(filter, patch).await
    }
}

struct Harness {
    store: Arc<CountingStore>,
    cache: CacheClient,
    captions: Arc<FakeCaptions>,
    llm: Arc<SpyLLM>,
    transcripts: TranscriptionService,
    pipeline: MindmapPipeline,
}

fn fast_settings() -> PipelineConfig {
    PipelineConfig {
        batch_pause_ms: 10,
        ..PipelineConfig::default()
    }
}

async fn harness_with(captions: FakeCaptions, settings: PipelineConfig) -> Harness {
    let memory = MemoryStore::new();
    memory
        .insert_course(Course {
            id: "C1".to_string(),
            title: "Rust Foundations".to_string(),
            description: "Ownership from first principles".to_string(),
            sections: vec![CourseSection {
                title: "Intro".to_string(),
                content: vec![ContentItem::Video {
                    url: V1.to_string(),
                    title: Some("Welcome".to_string()),
                }],
            }],
        })
        .await
        .unwrap();

    let store = Arc::new(CountingStore::new(memory));
    let cache = CacheClient::connected(Arc::new(MemoryBackend::new(1_000))).await;
    let captions = Arc::new(captions);
    let llm = Arc::new(SpyLLM::default());

    let transcripts = TranscriptionService::new(
        store.clone(),
        cache.clone(),
        TranscriptFetcher::new(captions.clone()),
        settings.clone(),
    );
    let pipeline = MindmapPipeline::new(
        store.clone(),
        cache.clone(),
        transcripts.clone(),
        llm.clone(),
        &settings,
    );

    Harness {
        store,
        cache,
        captions,
        llm,
        transcripts,
        pipeline,
    }
}

/// Adds course C2 with one section holding `https://vimeo.com/{id}` per id
async fn insert_multi_video_course(h: &Harness, ids: &[&str]) -> Vec<String> {
    let urls: Vec<String> = ids.iter().map(|id| format!("https://vimeo.com/{}", id)).collect();
    h.store
        .inner
        .insert_course(Course {
            id: "C2".to_string(),
            title: "Async Rust".to_string(),
            description: "Futures and executors".to_string(),
            sections: vec![CourseSection {
                title: "Runtime".to_string(),
                content: urls
                    .iter()
                    .map(|url| ContentItem::Video {
                        url: url.clone(),
                        title: None,
                    })
                    .collect(),
            }],
        })
        .await
        .unwrap();
    urls
}

async fn harness() -> Harness {
    harness_with(FakeCaptions::serving(HELLO_WORLD_VTT), fast_settings()).await
}

async fn record(h: &Harness, video_url: &str) -> VideoTranscript {
    h.store
        .inner
        .find_transcript("C1", video_url)
        .await
        .unwrap()
        .expect("record exists")
}

#[tokio::test]
async fn test_process_video_end_to_end() {
    let h = harness().await;
    assert!(h.store.inner.find_transcript("C1", V1).await.unwrap().is_none());

    let outcome = h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    assert_eq!(outcome, VideoOutcome::Completed);

    let saved = record(&h, V1).await;
    assert_eq!(saved.status, TranscriptStatus::Completed);
    assert_eq!(saved.transcript, "Hello world");
    assert_eq!(saved.retry_count, 1);
    assert!(saved.error.is_none());

    let key = keys::transcription("C1", V1);
    assert_eq!(key, "transcription:C1:https%3A%2F%2Fvimeo.com%2F111");
    assert_eq!(h.cache.get_text(&key).await.as_deref(), Some("Hello world"));
}

#[tokio::test]
async fn test_get_transcription_reads_through_cache() {
    let h = harness().await;
    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();

    // Cache was just populated by the run
    let before = h.store.accesses();
    let first = h.transcripts.get_transcription("C1", V1).await.unwrap();
    assert_eq!(first.as_deref(), Some("Hello world"));
    assert_eq!(h.store.accesses(), before);

    // Cold cache: the store answers once, then the cache takes over
    h.cache.delete(&keys::transcription("C1", V1)).await;
    let cold = h.transcripts.get_transcription("C1", V1).await.unwrap();
    assert_eq!(cold.as_deref(), Some("Hello world"));
    let after_cold = h.store.accesses();
    assert_eq!(after_cold, before + 1);

    let warm = h.transcripts.get_transcription("C1", V1).await.unwrap();
    assert_eq!(warm.as_deref(), Some("Hello world"));
    assert_eq!(h.store.accesses(), after_cold);
}

#[tokio::test]
async fn test_process_video_is_idempotent_when_completed() {
    let h = harness().await;
    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    let calls = h.captions.calls();
    let before = record(&h, V1).await;

    let outcome = h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    assert_eq!(outcome, VideoOutcome::AlreadyCompleted);
    assert_eq!(h.captions.calls(), calls);
    assert_eq!(record(&h, V1).await, before);
}

#[tokio::test]
async fn test_retry_count_increases_until_cap() {
    let settings = PipelineConfig {
        retry_delay_seconds: 0,
        ..fast_settings()
    };
    let h = harness_with(FakeCaptions::failing(), settings).await;

    let mut last = 0;
    for _ in 0..3 {
        let outcome = h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
        assert!(matches!(outcome, VideoOutcome::Failed(_)));

        let saved = record(&h, V1).await;
        assert_eq!(saved.status, TranscriptStatus::Failed);
        assert!(saved.retry_count > last);
        assert!(saved.error.as_deref().unwrap_or_default().contains("upstream down"));
        last = saved.retry_count;
    }
    assert_eq!(last, 3);

    let calls = h.captions.calls();
    let outcome = h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    assert_eq!(outcome, VideoOutcome::RetriesExhausted);
    assert_eq!(h.captions.calls(), calls);
    assert_eq!(record(&h, V1).await.retry_count, 3);
}

#[tokio::test]
async fn test_failed_record_backs_off_for_ten_minutes() {
    let h = harness_with(FakeCaptions::failing(), fast_settings()).await;

    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    let calls = h.captions.calls();

    let outcome = h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    assert_eq!(outcome, VideoOutcome::BackingOff);
    assert_eq!(h.captions.calls(), calls);

    let saved = record(&h, V1).await;
    h.store
        .update_transcript(
            &saved.id,
            TranscriptPatch {
                last_attempt: Some(Utc::now() - ChronoDuration::minutes(11)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    assert!(matches!(outcome, VideoOutcome::Failed(_)));
    assert!(h.captions.calls() > calls);
    assert_eq!(record(&h, V1).await.retry_count, 2);
}

#[tokio::test]
async fn test_course_run_and_reset() {
    let h = harness().await;
    let report = h.transcripts.process_course_videos("C1", TOKEN).await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.completed, 1);
    assert!(report.summaries.is_none());

    let status = h.transcripts.course_status("C1").await.unwrap();
    assert_eq!(status.completed, 1);
    assert_eq!(status.videos[0].transcript_chars, "Hello world".len());

    // Completed records are never reset
    assert_eq!(h.transcripts.reset_course("C1", false).await.unwrap(), 0);

    let missing = h.transcripts.process_course_videos("nope", TOKEN).await;
    assert!(matches!(missing, Err(PipelineError::NotFound(_))));
}

#[tokio::test]
async fn test_structuring_empty_text_makes_no_calls() {
    let h = harness().await;
    let structurer = h.pipeline.structurer();

    for context in [None, Some(MindmapContext::new("C1", V1)), Some(MindmapContext::new("X", "y"))] {
        let outline = structurer.structure_transcription("   ", context).await.unwrap();
        assert_eq!(outline, StructuredOutline::empty());
    }
    assert_eq!(h.llm.calls(), 0);
    assert!(h.cache.get(&keys::mindmap_structure("C1", V1)).await.is_none());
}

#[tokio::test]
async fn test_structuring_truncates_to_limit() {
    let h = harness().await;
    let text = format!("{}{}", "x".repeat(15_000), "Ω".repeat(50));

    h.pipeline
        .structurer()
        .structure_transcription(&text, None)
        .await
        .unwrap();

    let prompt = h.llm.last_prompt();
    assert!(!prompt.contains('Ω'));
    assert!(prompt.contains(&"x".repeat(15_000)));
    assert_eq!(
        prompt.chars().count(),
        structuring_prompt("").chars().count() + 15_000
    );
}

#[tokio::test]
async fn test_structuring_caches_by_content_digest() {
    let h = harness().await;
    let structurer = MindmapStructurer::new(h.llm.clone(), h.cache.clone(), 15_000, 60);

    let first = structurer.structure_transcription("ownership rules", None).await.unwrap();
    let second = structurer.structure_transcription("ownership rules", None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.llm.calls(), 1);

    structurer.structure_transcription("ownership rulez", None).await.unwrap();
    assert_eq!(h.llm.calls(), 2);
}

#[tokio::test]
async fn test_markmap_heading_levels() {
    let h = harness().await;
    let renderer = MarkmapRenderer::new(h.llm.clone(), h.cache.clone(), 60);
    let outline = StructuredOutline {
        title: "Lecture".to_string(),
        summary: String::new(),
        nodes: vec![
            OutlineNode::branch("A", vec![OutlineNode::leaf("B")]),
            OutlineNode::leaf("C"),
        ],
    };

    let markdown = renderer.convert_to_markmap(&outline, None).await.unwrap();
    let lines: Vec<&str> = markdown.lines().collect();
    assert_eq!(lines[0], "# Lecture");
    assert!(lines[1].starts_with("## A"));
    assert!(lines[2].starts_with("### B"));

    let empty = renderer
        .convert_to_markmap(&StructuredOutline::empty(), None)
        .await
        .unwrap();
    assert_eq!(empty, "# No content available\n");
    assert_eq!(h.llm.calls(), 1);
}

#[tokio::test]
async fn test_facade_not_ready_until_completed() {
    let h = harness().await;
    h.store
        .upsert_transcript("C1", V1, TranscriptPatch::default())
        .await
        .unwrap();

    let err = h.pipeline.generate_mindmap("C1", V1).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotReady(_)));
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.llm.calls(), 0);

    h.store
        .upsert_transcript(
            "C1",
            V1,
            TranscriptPatch {
                transcript: Some("Ownership moves values".to_string()),
                status: Some(TranscriptStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let markdown = h.pipeline.generate_mindmap("C1", V1).await.unwrap();
    assert!(markdown.starts_with("# Lecture\n## A\n### B"));
    assert!(h.llm.calls() >= 1);
}

#[tokio::test]
async fn test_facade_second_call_is_cached() {
    let h = harness().await;
    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();

    let first = h.pipeline.generate_mindmap("C1", V1).await.unwrap();
    let calls = h.llm.calls();
    assert_eq!(calls, 2);

    let second = h.pipeline.generate_mindmap("C1", V1).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.llm.calls(), calls);
}

#[tokio::test]
async fn test_facade_matches_alternative_urls_and_heals_status() {
    let h = harness().await;
    let player_url = "https://player.vimeo.com/video/222";
    h.store
        .upsert_transcript(
            "C1",
            player_url,
            TranscriptPatch {
                transcript: Some("Borrowing is temporary access".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let markdown = h.pipeline.generate_mindmap("C1", "222").await.unwrap();
    assert!(markdown.starts_with("# Lecture"));
    assert_eq!(record(&h, player_url).await.status, TranscriptStatus::Completed);

    let err = h.pipeline.generate_mindmap("C1", "999").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    let err = h.pipeline.generate_mindmap("", V1).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_update_transcription_invalidates_mindmap() {
    let h = harness().await;
    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    h.pipeline.generate_mindmap("C1", V1).await.unwrap();
    assert!(h.cache.get_text(&keys::mindmap_response("C1", V1)).await.is_some());

    h.transcripts
        .update_transcription("C1", V1, "Corrected text")
        .await
        .unwrap();
    assert!(h.cache.get_text(&keys::mindmap_response("C1", V1)).await.is_none());
    assert_eq!(
        h.transcripts.get_transcription("C1", V1).await.unwrap().as_deref(),
        Some("Corrected text")
    );

    let err = h.transcripts.update_transcription("C1", V1, "  ").await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_summary_rollup() {
    let h = harness().await;
    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();

    let summaries = SummaryService::new(h.store.clone(), h.llm.clone());
    let report = summaries.process_course_for_summaries("C1").await.unwrap();
    assert_eq!(report.videos_summarized, 1);
    assert_eq!(report.sections_summarized, 1);
    assert!(report.course_summarized);

    let saved = record(&h, V1).await;
    assert_eq!(saved.summary_status, SummaryStatus::Completed);
    assert!(saved.video_summary.is_some());
    assert!(saved.section_summary.is_some());
    assert!(saved.course_summary.is_some());
    assert_eq!(saved.status, TranscriptStatus::Completed);

    let err = summaries.process_course_for_summaries("missing").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_persistent_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let store = MemoryStore::open(temp_dir.path().to_path_buf()).await.unwrap();
    store
        .upsert_transcript(
            "C1",
            V1,
            TranscriptPatch {
                transcript: Some("Hello world".to_string()),
                status: Some(TranscriptStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reopened = MemoryStore::open(temp_dir.path().to_path_buf()).await.unwrap();
    let saved = reopened.find_transcript("C1", V1).await.unwrap().unwrap();
    assert_eq!(saved.transcript, "Hello world");
    assert_eq!(saved.status, TranscriptStatus::Completed);
}

#[tokio::test]
async fn test_course_run_isolates_failures_across_batches() {
    let h = harness_with(FakeCaptions::slow_failing_for(&["203"]), fast_settings()).await;
    let urls = insert_multi_video_course(&h, &["201", "202", "203", "204", "205"]).await;

    let report = h.transcripts.process_course_videos("C2", TOKEN).await.unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.completed, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(h.captions.max_in_flight(), 3);

    for url in &urls {
        let saved = h.store.inner.find_transcript("C2", url).await.unwrap().unwrap();
        if url.ends_with("203") {
            assert_eq!(saved.status, TranscriptStatus::Failed);
            assert!(saved.transcript.is_empty());
        } else {
            assert_eq!(saved.status, TranscriptStatus::Completed);
            assert_eq!(saved.transcript, "Hello world");
        }
    }

    let status = h.transcripts.course_status("C2").await.unwrap();
    assert_eq!((status.completed, status.failed, status.pending), (4, 1, 0));
}

#[tokio::test]
async fn test_zero_batch_size_runs_one_video_at_a_time() {
    let settings = PipelineConfig {
        batch_size: 0,
        ..fast_settings()
    };
    let h = harness_with(FakeCaptions::slow_failing_for(&[]), settings).await;
    insert_multi_video_course(&h, &["301", "302"]).await;

    let report = h.transcripts.process_course_videos("C2", TOKEN).await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(h.captions.max_in_flight(), 1);
}

#[tokio::test]
async fn test_record_with_text_counts_as_completed() {
    let h = harness().await;
    h.store
        .upsert_transcript(
            "C1",
            V1,
            TranscriptPatch {
                transcript: Some("Imported by hand".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    assert_eq!(outcome, VideoOutcome::AlreadyCompleted);
    assert_eq!(h.captions.calls(), 0);

    let status = h.transcripts.course_status("C1").await.unwrap();
    assert_eq!((status.completed, status.pending), (1, 0));
    assert_eq!(h.transcripts.reset_course("C1", false).await.unwrap(), 0);
}

#[tokio::test]
async fn test_video_summary_failure_is_recorded_not_raised() {
    let h = harness().await;
    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();
    let id = record(&h, V1).await.id;

    let summaries = SummaryService::new(h.store.clone(), Arc::new(FailingLLM));
    let status = summaries.generate_video_summary(&id).await.unwrap();
    assert_eq!(status, SummaryStatus::Failed);

    let saved = record(&h, V1).await;
    assert_eq!(saved.summary_status, SummaryStatus::Failed);
    assert!(saved.video_summary.is_none());
    assert_eq!(saved.status, TranscriptStatus::Completed);
    assert_eq!(saved.transcript, "Hello world");
}

#[tokio::test]
async fn test_section_without_video_summaries_skips_the_model() {
    let h = harness().await;
    h.transcripts.process_video("C1", V1, TOKEN).await.unwrap();

    let summaries = SummaryService::new(h.store.clone(), h.llm.clone());
    assert!(!summaries.generate_section_summary("C1", "Intro").await.unwrap());
    assert!(!summaries.generate_section_summary("C1", "No such section").await.unwrap());
    assert!(!summaries.generate_course_summary("C1").await.unwrap());
    assert_eq!(h.llm.calls(), 0);
    assert!(record(&h, V1).await.section_summary.is_none());
}

#[tokio::test]
async fn test_course_run_survives_failing_summaries() {
    let h = harness().await;

    let down = TranscriptionService::new(
        h.store.clone(),
        h.cache.clone(),
        TranscriptFetcher::new(h.captions.clone()),
        fast_settings(),
    )
    .with_summaries(Arc::new(SummaryService::new(h.store.clone(), Arc::new(FailingLLM))));
    let report = down.process_course_videos("C1", TOKEN).await.unwrap();
    assert_eq!(report.completed, 1);
    let summaries = report.summaries.expect("summary run reported");
    assert_eq!(summaries.videos_failed, 1);
    assert!(!summaries.course_summarized);

    // A summary engine that cannot even load the course is logged and dropped
    let unknown_course = TranscriptionService::new(
        h.store.clone(),
        h.cache.clone(),
        TranscriptFetcher::new(h.captions.clone()),
        fast_settings(),
    )
    .with_summaries(Arc::new(SummaryService::new(
        Arc::new(MemoryStore::new()),
        h.llm.clone(),
    )));
    let report = unknown_course.process_course_videos("C1", TOKEN).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(report.summaries.is_none());
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_update_transcription_invalidates_every_request_spelling() {
    let h = harness().await;
    let player_url = "https://player.vimeo.com/video/222";
    h.store
        .upsert_transcript(
            "C1",
            player_url,
            TranscriptPatch {
                transcript: Some("Borrowing is temporary access".to_string()),
                status: Some(TranscriptStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    h.pipeline.generate_mindmap("C1", "222").await.unwrap();
    h.pipeline.generate_mindmap("C1", "vimeo.com/222").await.unwrap();
    assert_eq!(h.llm.calls(), 2);

    h.transcripts
        .update_transcription("C1", player_url, "Lifetimes bound references")
        .await
        .unwrap();

    h.pipeline.generate_mindmap("C1", "222").await.unwrap();
    assert_eq!(h.llm.calls(), 4);
    let structuring_prompt = h
        .llm
        .prompts
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find(|p| p.contains("Transcript:\n"))
        .cloned()
        .unwrap_or_default();
    assert!(structuring_prompt.ends_with("Lifetimes bound references"));
}
