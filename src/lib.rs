//! Mind-map pipeline
//!
//! Turns course video captions into stored transcripts, three-tier AI
//! summaries and markmap mind maps, with a read-through cache in front of
//! every expensive step.

#[cfg(feature = "api")]
pub mod api;
pub mod cache;
pub mod captions;
pub mod config;
pub mod course;
pub mod error;
pub mod llm;
pub mod mindmap;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod summary;
pub mod transcription;

// Re-export main types for easy access
pub use crate::cache::{CacheClient, ConnectionState};
pub use crate::captions::{CaptionApi, TranscriptFetcher, VimeoApi};
pub use crate::config::Config;
pub use crate::error::{PipelineError, Result};
pub use crate::llm::{LLMConfig, LLMProvider, LLM};
pub use crate::mindmap::{render_outline_locally, OutlineNode, StructuredOutline};
pub use crate::pipeline::MindmapPipeline;
pub use crate::services::Services;
pub use crate::store::{DocumentStore, MemoryStore, VideoTranscript};
pub use crate::summary::{SummaryReport, SummaryService};
pub use crate::transcription::{CourseRunReport, TranscriptionService};
