//! Caption retrieval from the video host
//!
//! [`TranscriptFetcher`] turns a video URL into prose. The provider's HTTP
//! surface sits behind [`CaptionApi`] so the reduction logic is independent of
//! the transport.

pub mod vimeo;
pub mod vtt;

pub use vimeo::VimeoApi;
pub use vtt::vtt_to_text;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Host of the captioning provider's video pages
pub const PROVIDER_DOMAIN: &str = "vimeo.com";

/// Transcript text stored when a video has no caption tracks
pub const NO_TRANSCRIPTION: &str = "No transcription found.";

/// One caption track descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextTrack {
    pub link: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// HTTP surface of the captioning provider
#[async_trait]
pub trait CaptionApi: Send + Sync {
    /// `GET /videos/{id}/texttracks`
    async fn list_tracks(&self, video_id: &str, access_token: &str) -> Result<Vec<TextTrack>>;

    /// `GET {track.link}`, WebVTT body
    async fn download_track(&self, link: &str, access_token: &str) -> Result<String>;
}

/// Extract the provider's numeric video id from a URL.
///
/// The id is the first numeric path segment after the host, which covers
/// `vimeo.com/{id}`, `vimeo.com/{id}/{hash}` and `player.vimeo.com/video/{id}`.
pub fn extract_video_id(video_url: &str) -> Result<String> {
    let trimmed = video_url.trim();
    let parsed = url::Url::parse(trimmed)
        .or_else(|_| url::Url::parse(&format!("https://{}", trimmed)))
        .map_err(|_| PipelineError::InvalidUrl(video_url.to_string()))?;

    parsed
        .path_segments()
        .into_iter()
        .flatten()
        .find(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| PipelineError::InvalidUrl(video_url.to_string()))
}

/// Fetches captions for a single video and reduces them to prose
#[derive(Clone)]
pub struct TranscriptFetcher {
    api: Arc<dyn CaptionApi>,
}

impl TranscriptFetcher {
    pub fn new(api: Arc<dyn CaptionApi>) -> Self {
        Self { api }
    }

    pub async fn fetch_captions(&self, video_url: &str, access_token: &str) -> Result<String> {
        let video_id = extract_video_id(video_url)?;
        debug!("Listing caption tracks for video {}", video_id);

        let tracks = self.api.list_tracks(&video_id, access_token).await?;
        let Some(track) = tracks.first() else {
            info!("📭 No caption tracks for video {}", video_id);
            return Ok(NO_TRANSCRIPTION.to_string());
        };

        let vtt = self.api.download_track(&track.link, access_token).await?;
        let text = vtt_to_text(&vtt);
        debug!("Video {} transcript: {} characters", video_id, text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StaticApi {
        tracks: Vec<TextTrack>,
        vtt: String,
        downloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CaptionApi for StaticApi {
        async fn list_tracks(&self, _video_id: &str, _token: &str) -> Result<Vec<TextTrack>> {
            Ok(self.tracks.clone())
        }

        async fn download_track(&self, link: &str, _token: &str) -> Result<String> {
            self.downloads.lock().unwrap().push(link.to_string());
            Ok(self.vtt.clone())
        }
    }

    fn track(link: &str) -> TextTrack {
        TextTrack {
            link: link.to_string(),
            language: Some("en".to_string()),
            kind: Some("captions".to_string()),
            active: true,
        }
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(extract_video_id("https://vimeo.com/123456").unwrap(), "123456");
        assert_eq!(extract_video_id("https://vimeo.com/123456/abcdef").unwrap(), "123456");
        assert_eq!(extract_video_id("vimeo.com/42").unwrap(), "42");
        assert_eq!(
            extract_video_id("https://player.vimeo.com/video/987?h=x").unwrap(),
            "987"
        );
        assert!(matches!(
            extract_video_id("https://vimeo.com/channels/staff"),
            Err(PipelineError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_no_tracks_returns_sentinel() {
        let api = Arc::new(StaticApi {
            tracks: Vec::new(),
            vtt: String::new(),
            downloads: Mutex::new(Vec::new()),
        });
        let fetcher = TranscriptFetcher::new(api.clone());

        let text = fetcher.fetch_captions("https://vimeo.com/1", "token").await.unwrap();
        assert_eq!(text, NO_TRANSCRIPTION);
        assert!(api.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_downloads_first_track() {
        let api = Arc::new(StaticApi {
            tracks: vec![track("https://captions/first.vtt"), track("https://captions/second.vtt")],
            vtt: "WEBVTT\n\n1\n00:00:00.000 --> 00:00:01.000\nHello\n\n2\n00:00:01.000 --> 00:00:02.000\nworld\n".to_string(),
            downloads: Mutex::new(Vec::new()),
        });
        let fetcher = TranscriptFetcher::new(api.clone());

        let text = fetcher.fetch_captions("https://vimeo.com/1", "token").await.unwrap();
        assert_eq!(text, "Hello world");
        assert_eq!(
            api.downloads.lock().unwrap().as_slice(),
            ["https://captions/first.vtt".to_string()]
        );
    }
}
