use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::llm::LLMConfig;

/// Configuration for the mind-map pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Captioning provider settings
    pub captions: CaptionsConfig,

    /// Chat-completion settings for course summaries
    pub summaries: LLMConfig,

    /// Generative settings for mind-map structuring and rendering
    pub mindmap: LLMConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Document store settings
    pub store: StoreConfig,

    /// Pipeline throttling, retry and TTL settings
    pub pipeline: PipelineConfig,

    /// HTTP server settings
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionsConfig {
    /// Bearer token for the captioning provider
    pub access_token: Option<String>,

    /// Provider API base URL
    pub api_base: String,

    /// Per-request deadline in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    File,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend used for cached provider results
    pub backend: CacheBackendKind,

    /// Directory for the file backend
    pub cache_dir: PathBuf,

    /// Entry bound for the memory backend
    pub max_entries: usize,

    /// Connection attempts at startup
    pub connect_attempts: u32,

    /// Fixed delay between connection attempts (milliseconds)
    pub connect_delay_ms: u64,

    /// Sweep interval for expired file-backend entries (seconds)
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding persisted records; volatile when unset
    pub state_dir: Option<PathBuf>,

    /// JSON array of courses imported at startup
    pub courses_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Videos transcribed in parallel per batch
    pub batch_size: usize,

    /// Pause between batches (milliseconds)
    pub batch_pause_ms: u64,

    /// Attempts per video before giving up
    pub max_retries: u32,

    /// Minimum wait after a failed attempt (seconds)
    pub retry_delay_seconds: u64,

    /// Transcript cache TTL (seconds)
    pub transcript_ttl_seconds: u64,

    /// Mind-map artifact cache TTL (seconds)
    pub mindmap_ttl_seconds: u64,

    /// Transcript characters sent to the structuring prompt
    pub max_structuring_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl PipelineConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn retry_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retry_delay_seconds as i64)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause_ms: 1_000,
            max_retries: 3,
            retry_delay_seconds: 10 * 60,
            transcript_ttl_seconds: 30 * 24 * 60 * 60,
            mindmap_ttl_seconds: 7 * 24 * 60 * 60,
            max_structuring_chars: 15_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            captions: CaptionsConfig {
                access_token: None,
                api_base: "https://api.vimeo.com".to_string(),
                timeout_seconds: 30,
            },
            summaries: LLMConfig::summaries(),
            mindmap: LLMConfig::mindmap(),
            cache: CacheConfig {
                backend: CacheBackendKind::Memory,
                cache_dir: PathBuf::from("./cache"),
                max_entries: 10_000,
                connect_attempts: 3,
                connect_delay_ms: 1_000,
                cleanup_interval_seconds: 3_600,
            },
            store: StoreConfig {
                state_dir: None,
                courses_file: None,
            },
            pipeline: PipelineConfig::default(),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                log_level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from the first readable file, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = [
            "mindmap-pipeline.toml",
            "config/mindmap-pipeline.toml",
            "/etc/mindmap-pipeline/config.toml",
        ];

        let mut config = None;
        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(parsed) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config = Some(parsed);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        let mut config = config.unwrap_or_default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file path
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;
        let mut config: Config = toml::from_str(&config_str)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Configuration from defaults plus environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup
    pub fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("VIMEO_ACCESS_TOKEN") {
            self.captions.access_token = Some(token);
        }

        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.mindmap.api_key = Some(key);
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.summaries.api_key = Some(key);
        }

        if let Some(backend) = lookup("CACHE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "memory" => self.cache.backend = CacheBackendKind::Memory,
                "file" => self.cache.backend = CacheBackendKind::File,
                "disabled" | "none" => self.cache.backend = CacheBackendKind::Disabled,
                other => tracing::warn!("Unknown CACHE_BACKEND '{}', keeping default", other),
            }
        }

        if let Some(dir) = lookup("CACHE_DIR") {
            self.cache.cache_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("STORE_DIR") {
            self.store.state_dir = Some(PathBuf::from(dir));
        }

        if let Some(port) = lookup("MINDMAP_PIPELINE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Invalid MINDMAP_PIPELINE_PORT '{}'", port),
            }
        }

        if let Some(level) = lookup("MINDMAP_PIPELINE_LOG_LEVEL") {
            self.server.log_level = level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(anyhow!("pipeline.batch_size must be greater than 0"));
        }

        if self.pipeline.max_retries == 0 {
            return Err(anyhow!("pipeline.max_retries must be greater than 0"));
        }

        if self.pipeline.max_structuring_chars == 0 {
            return Err(anyhow!("pipeline.max_structuring_chars must be greater than 0"));
        }

        if self.cache.connect_attempts == 0 {
            return Err(anyhow!("cache.connect_attempts must be greater than 0"));
        }

        if self.captions.timeout_seconds == 0
            || self.summaries.timeout_seconds == 0
            || self.mindmap.timeout_seconds == 0
        {
            return Err(anyhow!("request timeouts must be greater than 0"));
        }

        Ok(())
    }
}
