//! Wiring of stores, caches and providers from configuration

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{CacheClient, ConnectPolicy, ConnectionState, FileBackend, MemoryBackend};
use crate::captions::{TranscriptFetcher, VimeoApi};
use crate::config::{CacheBackendKind, Config};
use crate::llm::{create_llm, LLM};
use crate::pipeline::MindmapPipeline;
use crate::store::{DocumentStore, MemoryStore};
use crate::summary::SummaryService;
use crate::transcription::TranscriptionService;

/// Every long-lived component, built once per process
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub cache: CacheClient,
    pub transcripts: TranscriptionService,
    pub summaries: Option<Arc<SummaryService>>,
    mindmap_llm: Option<Arc<dyn LLM>>,
}

impl Services {
    pub async fn build(config: Config) -> Result<Self> {
        let cache = build_cache(&config).await;
        info!("💾 Cache {:?}", cache.state());

        let memory_store = match config.store.state_dir {
            Some(ref dir) => MemoryStore::open(dir.clone())
                .await
                .with_context(|| format!("opening document store at {}", dir.display()))?,
            None => MemoryStore::new(),
        };
        if let Some(ref courses_file) = config.store.courses_file {
            memory_store
                .import_courses(courses_file)
                .await
                .with_context(|| format!("importing courses from {}", courses_file.display()))?;
        }
        let store: Arc<dyn DocumentStore> = Arc::new(memory_store);

        let captions = VimeoApi::with_base_url(
            &config.captions.api_base,
            Duration::from_secs(config.captions.timeout_seconds),
        )?;
        let fetcher = TranscriptFetcher::new(Arc::new(captions));

        let summaries = if config.summaries.has_credentials() {
            let llm: Arc<dyn LLM> = Arc::from(create_llm(&config.summaries)?);
            Some(Arc::new(SummaryService::new(store.clone(), llm)))
        } else {
            warn!("No chat-completion API key, summaries disabled");
            None
        };

        let mindmap_llm: Option<Arc<dyn LLM>> = if config.mindmap.has_credentials() {
            Some(Arc::from(create_llm(&config.mindmap)?))
        } else {
            warn!("No generative-AI API key, mind maps disabled");
            None
        };

        let mut transcripts = TranscriptionService::new(
            store.clone(),
            cache.clone(),
            fetcher,
            config.pipeline.clone(),
        );
        if let Some(ref summaries) = summaries {
            transcripts = transcripts.with_summaries(summaries.clone());
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            cache,
            transcripts,
            summaries,
            mindmap_llm,
        })
    }

    /// The mind-map facade; requires a generative-AI key
    pub fn pipeline(&self) -> Result<MindmapPipeline> {
        let llm = self
            .mindmap_llm
            .clone()
            .ok_or_else(|| anyhow!("set GEMINI_API_KEY to generate mind maps"))?;

        Ok(MindmapPipeline::new(
            self.store.clone(),
            self.cache.clone(),
            self.transcripts.clone(),
            llm,
            &self.config.pipeline,
        ))
    }

    /// Caption provider token from configuration, or the given override
    pub fn access_token(&self, token: Option<&str>) -> Result<String> {
        token
            .map(str::to_string)
            .or_else(|| self.config.captions.access_token.clone())
            .ok_or_else(|| anyhow!("set VIMEO_ACCESS_TOKEN or pass --token"))
    }

    #[cfg(feature = "api")]
    pub fn app_state(&self) -> Result<crate::api::AppState> {
        Ok(crate::api::AppState {
            pipeline: self.pipeline()?,
            transcripts: self.transcripts.clone(),
            summaries: self.summaries.clone(),
            store: self.store.clone(),
            cache: self.cache.clone(),
            config: self.config.clone(),
        })
    }
}

async fn build_cache(config: &Config) -> CacheClient {
    let policy = ConnectPolicy {
        attempts: config.cache.connect_attempts,
        delay: Duration::from_millis(config.cache.connect_delay_ms),
    };

    match config.cache.backend {
        CacheBackendKind::Memory => {
            let client =
                CacheClient::new(Arc::new(MemoryBackend::new(config.cache.max_entries)), policy);
            client.connect().await;
            client
        }
        CacheBackendKind::File => {
            let backend = Arc::new(FileBackend::new(config.cache.cache_dir.clone()));
            let client = CacheClient::new(backend.clone(), policy);
            if client.connect().await == ConnectionState::Ready {
                spawn_cache_cleanup(
                    backend,
                    Duration::from_secs(config.cache.cleanup_interval_seconds.max(1)),
                );
            }
            client
        }
        CacheBackendKind::Disabled => CacheClient::disabled(),
    }
}

/// Sweep expired cache files at startup and on every interval tick
fn spawn_cache_cleanup(backend: Arc<FileBackend>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = backend.cleanup_expired().await {
                warn!("Cache cleanup failed: {}", e);
            }
        }
    });
}
