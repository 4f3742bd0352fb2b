pub mod outline;
pub mod renderer;
pub mod structurer;

pub use outline::{parse_outline, render_outline_locally, OutlineNode, StructuredOutline};
pub use renderer::MarkmapRenderer;
pub use structurer::MindmapStructurer;

use crate::error::PipelineError;
use crate::llm::LLMError;

/// The (course, video) pair a mind map is built for. Selects the
/// per-video cache keys instead of content digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MindmapContext<'a> {
    pub course_id: &'a str,
    pub video_url: &'a str,
}

impl<'a> MindmapContext<'a> {
    pub fn new(course_id: &'a str, video_url: &'a str) -> Self {
        Self { course_id, video_url }
    }
}

pub(crate) fn ai_error(error: LLMError) -> PipelineError {
    match error {
        LLMError::Timeout(after) => PipelineError::Timeout(after),
        other => PipelineError::AiService(other.to_string()),
    }
}
