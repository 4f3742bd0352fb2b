use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{CaptionApi, TextTrack};
use crate::error::{PipelineError, Result};

/// Vimeo text-track API client
#[derive(Debug, Clone)]
pub struct VimeoApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TextTrackList {
    #[serde(default)]
    data: Vec<TextTrack>,
}

impl VimeoApi {
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn get(&self, url: &str, access_token: &str, accept: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", accept)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        check_status(status, url, body)
    }

    fn transport_error(&self, err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            PipelineError::Timeout(self.timeout)
        } else {
            PipelineError::Http(err)
        }
    }
}

/// Map a provider response status onto the caption error kinds
pub(crate) fn check_status(status: u16, url: &str, body: String) -> Result<String> {
    match status {
        200 => Ok(body),
        401 => Err(PipelineError::Auth),
        404 => Err(PipelineError::NotFound(format!("caption resource {}", url))),
        _ => Err(PipelineError::Provider { status, body }),
    }
}

#[async_trait]
impl CaptionApi for VimeoApi {
    async fn list_tracks(&self, video_id: &str, access_token: &str) -> Result<Vec<TextTrack>> {
        let url = format!("{}/videos/{}/texttracks", self.base_url, video_id);
        debug!("GET {}", url);

        let body = self
            .get(&url, access_token, "application/vnd.vimeo.*+json;version=3.4")
            .await?;
        let list: TextTrackList = serde_json::from_str(&body)?;
        Ok(list.data)
    }

    async fn download_track(&self, link: &str, access_token: &str) -> Result<String> {
        debug!("Downloading caption track {}", link);
        self.get(link, access_token, "text/vtt").await
    }
}
