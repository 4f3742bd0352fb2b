use std::sync::Arc;
use tracing::{debug, info};

use super::outline::{StructuredOutline, MAX_HEADING_DEPTH};
use super::{ai_error, MindmapContext};
use crate::cache::{keys, CacheClient};
use crate::error::Result;
use crate::llm::LLM;

pub const NO_CONTENT_MARKDOWN: &str = "# No content available\n";

pub fn rendering_prompt(outline_json: &str) -> String {
    format!(
        r####"Convert the JSON mind-map outline below into markmap markdown.

Rules:
- The first line is "# " followed by the outline title.
- Each node becomes a heading one level deeper than its parent: top-level nodes use "##", their children "###", and so on.
- Heading levels stop at {max}. Nodes deeper than level {max} keep the "{hashes}" prefix and start with "Level N: " where N is their depth.
- Keep node names verbatim. Output only the markdown, with no commentary and no code fences.

Outline:
{outline}"####,
        max = MAX_HEADING_DEPTH,
        hashes = "#".repeat(MAX_HEADING_DEPTH),
        outline = outline_json
    )
}

/// Remove one wrapping code fence, if the model added it
pub fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string ("markdown", "md") on the opening line
    match body.split_once('\n') {
        Some((_, content)) => content.trim_end(),
        None => body.trim(),
    }
}

/// Turns an outline into markmap markdown through a generative model
#[derive(Clone)]
pub struct MarkmapRenderer {
    llm: Arc<dyn LLM>,
    cache: CacheClient,
    ttl_seconds: u64,
}

impl MarkmapRenderer {
    pub fn new(llm: Arc<dyn LLM>, cache: CacheClient, ttl_seconds: u64) -> Self {
        Self {
            llm,
            cache,
            ttl_seconds,
        }
    }

    pub async fn convert_to_markmap(
        &self,
        outline: &StructuredOutline,
        context: Option<MindmapContext<'_>>,
    ) -> Result<String> {
        if !outline.has_content() {
            return Ok(NO_CONTENT_MARKDOWN.to_string());
        }

        let outline_json = serde_json::to_string_pretty(outline)?;
        let cache_key = match context {
            Some(ctx) => keys::mindmap_markdown(ctx.course_id, ctx.video_url),
            None => keys::mindmap_markdown_digest(&outline_json),
        };
        if let Some(markdown) = self.cache.get_text(&cache_key).await {
            debug!("🎯 Markdown cache hit: {}", cache_key);
            return Ok(markdown);
        }

        let response = self
            .llm
            .generate(&rendering_prompt(&outline_json))
            .await
            .map_err(ai_error)?;
        let markdown = strip_markdown_fence(&response).to_string();

        self.cache.set_text(&cache_key, self.ttl_seconds, &markdown).await;
        info!("🗺️ Rendered markmap for '{}' ({} lines)", outline.title, markdown.lines().count());
        Ok(markdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fence_with_info_string() {
        assert_eq!(strip_markdown_fence("```markdown\n# T\n## A\n```"), "# T\n## A");
        assert_eq!(strip_markdown_fence("# T\n## A"), "# T\n## A");
    }

    #[test]
    fn test_prompt_describes_deep_levels() {
        let prompt = rendering_prompt("{}");
        assert!(prompt.contains("Level N: "));
        assert!(prompt.contains("The first line is \"# \" followed by the outline title."));
        assert!(prompt.contains("top-level nodes use \"##\", their children \"###\""));
        assert!(prompt.contains("keep the \"######\" prefix"));
        assert!(prompt.ends_with("Outline:\n{}"));
    }
}
