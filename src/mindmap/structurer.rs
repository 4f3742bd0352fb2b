use std::sync::Arc;
use tracing::{debug, info, warn};

use super::outline::{parse_outline, StructuredOutline};
use super::{ai_error, MindmapContext};
use crate::cache::{keys, CacheClient};
use crate::error::{PipelineError, Result};
use crate::llm::LLM;

const STRUCTURE_PROMPT: &str = r#"You are an expert at turning lecture transcripts into mind maps.

Analyze the transcript below and organize its content into a hierarchical outline.

Rules:
- Capture every concept, example and detail; go as deep as the material allows (6 levels or more).
- Node names are short phrases, not sentences.
- Leaf nodes have no "children" key at all.
- Respond with a single fenced ```json block and nothing else, shaped exactly like:

```json
{
  "title": "Main topic of the video",
  "summary": "Two or three sentence overview",
  "nodes": [
    {
      "name": "Key concept",
      "children": [
        { "name": "Detail" }
      ]
    }
  ]
}
```

Transcript:
"#;

/// Prefix of `text` holding at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

pub fn structuring_prompt(text: &str) -> String {
    format!("{}{}", STRUCTURE_PROMPT, text)
}

/// Turns transcript text into a `StructuredOutline` through a generative model
#[derive(Clone)]
pub struct MindmapStructurer {
    llm: Arc<dyn LLM>,
    cache: CacheClient,
    max_chars: usize,
    ttl_seconds: u64,
}

impl MindmapStructurer {
    pub fn new(llm: Arc<dyn LLM>, cache: CacheClient, max_chars: usize, ttl_seconds: u64) -> Self {
        Self {
            llm,
            cache,
            max_chars,
            ttl_seconds,
        }
    }

    pub async fn structure_transcription(
        &self,
        text: &str,
        context: Option<MindmapContext<'_>>,
    ) -> Result<StructuredOutline> {
        if text.trim().is_empty() {
            debug!("Empty transcript, returning placeholder outline");
            return Ok(StructuredOutline::empty());
        }

        let cache_key = match context {
            Some(ctx) => keys::mindmap_structure(ctx.course_id, ctx.video_url),
            None => keys::mindmap_structure_digest(text),
        };
        if let Some(outline) = self.cache.get_json::<StructuredOutline>(&cache_key).await {
            debug!("🎯 Structure cache hit: {}", cache_key);
            return Ok(outline);
        }

        let input = truncate_chars(text, self.max_chars);
        if input.len() < text.len() {
            warn!(
                "Transcript truncated to {} characters for structuring",
                self.max_chars
            );
        }

        let response = self
            .llm
            .generate(&structuring_prompt(input))
            .await
            .map_err(ai_error)?;

        let outline = parse_outline(&response).map_err(|e| {
            PipelineError::Structuring(format!("could not parse outline from model output: {}", e))
        })?;

        self.cache.set(&cache_key, self.ttl_seconds, &outline).await;
        info!(
            "🧠 Structured '{}' ({} top-level nodes, depth {})",
            outline.title,
            outline.nodes.len(),
            outline.depth()
        );
        Ok(outline)
    }
}
