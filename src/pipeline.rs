//! End-to-end mind-map generation for one course video

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{keys, CacheClient};
use crate::captions::{extract_video_id, PROVIDER_DOMAIN};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::llm::LLM;
use crate::mindmap::{MarkmapRenderer, MindmapContext, MindmapStructurer};
use crate::store::{DocumentStore, TranscriptPatch, TranscriptStatus, VideoTranscript};
use crate::transcription::TranscriptionService;

/// Percent-decode a URL that arrived as one encoded segment.
///
/// Input that still carries a `/` was already decoded (the router does that
/// for path parameters) and is returned as is, so a literal `%25` survives.
fn decode_once(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains('/') || !raw.contains('%') {
        return raw.to_string();
    }
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Canonical form of a requested video URL.
///
/// Percent-encoding is decoded, a bare numeric id becomes
/// `https://vimeo.com/{id}` and a scheme-less provider URL gains `https://`.
pub fn normalize_url(raw: &str) -> String {
    let decoded = decode_once(raw);
    let decoded = decoded.trim();

    if !decoded.is_empty() && decoded.chars().all(|c| c.is_ascii_digit()) {
        return format!("https://{}/{}", PROVIDER_DOMAIN, decoded);
    }

    let is_bare_provider = ["", "www.", "player."]
        .iter()
        .any(|prefix| decoded.starts_with(&format!("{}{}", prefix, PROVIDER_DOMAIN)));
    if is_bare_provider {
        return format!("https://{}", decoded);
    }

    decoded.to_string()
}

/// URL spellings a stored record may use for the same video, in lookup order
pub fn alternative_urls(raw: &str, normalized: &str) -> Vec<String> {
    let decoded = decode_once(raw);

    let mut candidates = vec![normalized.to_string(), decoded.clone()];
    for url in [normalized, decoded.as_str()] {
        if let Some(stripped) = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
        {
            candidates.push(stripped.to_string());
        }
    }
    if let Ok(id) = extract_video_id(normalized) {
        candidates.push(format!("https://{}/{}", PROVIDER_DOMAIN, id));
        candidates.push(format!("https://player.{}/video/{}", PROVIDER_DOMAIN, id));
    }

    let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !candidate.is_empty() && !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

/// Every request spelling whose cached mind-map response may belong to the
/// record stored under `video_url`
pub fn response_cache_urls(video_url: &str) -> Vec<String> {
    let mut urls = alternative_urls(video_url, &normalize_url(video_url));
    let bare: Vec<String> = urls
        .iter()
        .map(|url| {
            url.strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .unwrap_or(url)
                .to_string()
        })
        .collect();

    for host_path in bare {
        for scheme in ["https://", "http://"] {
            let url = format!("{}{}", scheme, host_path);
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Facade tying transcripts, structuring, rendering and caching together
#[derive(Clone)]
pub struct MindmapPipeline {
    store: Arc<dyn DocumentStore>,
    cache: CacheClient,
    transcripts: TranscriptionService,
    structurer: MindmapStructurer,
    renderer: MarkmapRenderer,
    ttl_seconds: u64,
}

impl MindmapPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: CacheClient,
        transcripts: TranscriptionService,
        llm: Arc<dyn LLM>,
        settings: &PipelineConfig,
    ) -> Self {
        Self {
            structurer: MindmapStructurer::new(
                llm.clone(),
                cache.clone(),
                settings.max_structuring_chars,
                settings.mindmap_ttl_seconds,
            ),
            renderer: MarkmapRenderer::new(llm, cache.clone(), settings.mindmap_ttl_seconds),
            store,
            cache,
            transcripts,
            ttl_seconds: settings.mindmap_ttl_seconds,
        }
    }

    pub fn structurer(&self) -> &MindmapStructurer {
        &self.structurer
    }

    pub fn renderer(&self) -> &MarkmapRenderer {
        &self.renderer
    }

    /// Markmap markdown for one video of a course
    pub async fn generate_mindmap(&self, course_id: &str, raw_video_url: &str) -> Result<String> {
        let start_time = Instant::now();
        let course_id = course_id.trim();
        if course_id.is_empty() || raw_video_url.trim().is_empty() {
            return Err(PipelineError::BadRequest(
                "course id and video URL are required".to_string(),
            ));
        }

        let video_url = normalize_url(raw_video_url);
        let response_key = keys::mindmap_response(course_id, &video_url);
        if let Some(markdown) = self.cache.get_text(&response_key).await {
            debug!("🎯 Mind-map cache hit for {}", video_url);
            return Ok(markdown);
        }

        let record = self.find_record(course_id, raw_video_url, &video_url).await?;

        if record.effective_status() != TranscriptStatus::Completed {
            return Err(PipelineError::NotReady(format!(
                "transcript for {} is {}",
                record.video_url,
                record.status.as_str()
            )));
        }
        if record.status == TranscriptStatus::Pending {
            warn!("🩹 Record for {} holds text but is pending, marking completed", record.video_url);
            self.store
                .update_transcript(
                    &record.id,
                    TranscriptPatch {
                        status: Some(TranscriptStatus::Completed),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let transcript = self
            .transcripts
            .get_transcription(&record.course_id, &record.video_url)
            .await?
            .ok_or_else(|| {
                PipelineError::NotFound(format!("transcript text for {}", record.video_url))
            })?;

        let context = MindmapContext::new(&record.course_id, &record.video_url);
        let outline = self
            .structurer
            .structure_transcription(&transcript, Some(context))
            .await?;
        let markdown = self.renderer.convert_to_markmap(&outline, Some(context)).await?;

        self.cache.set_text(&response_key, self.ttl_seconds, &markdown).await;
        info!(
            "✅ Mind map for {} ready in {:.2}s",
            video_url,
            start_time.elapsed().as_secs_f64()
        );
        Ok(markdown)
    }

    async fn find_record(
        &self,
        course_id: &str,
        raw_video_url: &str,
        video_url: &str,
    ) -> Result<VideoTranscript> {
        for candidate in alternative_urls(raw_video_url, video_url) {
            if let Some(record) = self.store.find_transcript(course_id, &candidate).await? {
                if candidate != video_url {
                    debug!("Matched {} via alternative URL {}", video_url, candidate);
                }
                return Ok(record);
            }
        }
        Err(PipelineError::NotFound(format!(
            "no transcript for {} in course {}",
            video_url, course_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_id_and_encoded_urls() {
        assert_eq!(normalize_url("12345"), "https://vimeo.com/12345");
        assert_eq!(normalize_url("vimeo.com/12345"), "https://vimeo.com/12345");
        assert_eq!(
            normalize_url("https%3A%2F%2Fvimeo.com%2F12345"),
            "https://vimeo.com/12345"
        );
        assert_eq!(
            normalize_url("https://youtube.com/watch?v=1"),
            "https://youtube.com/watch?v=1"
        );
    }

    #[test]
    fn test_alternatives_cover_player_and_stripped_forms() {
        let normalized = normalize_url("player.vimeo.com/video/42");
        let alternatives = alternative_urls("player.vimeo.com/video/42", &normalized);
        assert_eq!(alternatives[0], "https://player.vimeo.com/video/42");
        assert!(alternatives.contains(&"player.vimeo.com/video/42".to_string()));
        assert!(alternatives.contains(&"https://vimeo.com/42".to_string()));
        let unique: std::collections::HashSet<_> = alternatives.iter().collect();
        assert_eq!(unique.len(), alternatives.len());
    }

    #[test]
    fn test_decoded_urls_are_not_decoded_again() {
        assert_eq!(
            normalize_url("https://vimeo.com/12345?h=%2541"),
            "https://vimeo.com/12345?h=%2541"
        );
        assert_eq!(normalize_url("vimeo.com/1?h=%25"), "https://vimeo.com/1?h=%25");
        assert_eq!(normalize_url("https%3A%2F%2Fvimeo.com%2F7%3Fh%3D%2541"), "https://vimeo.com/7?h=%41");
    }

    #[test]
    fn test_response_cache_urls_cover_every_request_spelling() {
        let urls = response_cache_urls("https://player.vimeo.com/video/222");
        for request in ["222", "vimeo.com/222", "http://vimeo.com/222", "player.vimeo.com/video/222"] {
            assert!(
                urls.contains(&normalize_url(request)),
                "missing {} in {:?}",
                normalize_url(request),
                urls
            );
        }
    }
}
