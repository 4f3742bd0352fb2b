pub mod orchestrator;

pub use orchestrator::{
    CourseRunReport, CourseTranscriptionStatus, TranscriptionService, VideoOutcome,
    VideoStatusRow,
};
