//! Response cache with per-key expiration
//!
//! The cache only memoizes expensive provider results. Every operation on
//! [`CacheClient`] degrades to a miss or a no-op when the backend is
//! unreachable, so callers never branch on cache failures.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, Result};

/// Storage behind the cache client
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Verify the backend can serve requests
    async fn ping(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    inserted_at: Instant,
    expires_at: Instant,
}

/// In-process backend bounded by entry count
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    max_entries: usize,
}

impl MemoryBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    fn evict(entries: &mut HashMap<String, MemoryEntry>, max_entries: usize) {
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);

        while entries.len() >= max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting cache entry {}", key);
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            Self::evict(&mut entries, self.max_entries);
        }

        let now = Instant::now();
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// On-disk record for one cache key
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: String,
    value: String,
    /// Unix timestamp (seconds)
    expires_at: i64,
}

/// Directory backend, one JSON file per key
#[derive(Clone)]
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{:x}.json", md5::compute(key.as_bytes())))
    }

    /// Remove expired cache files, returning how many were deleted
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let mut cleaned_count = 0;
        let mut entries = tokio::fs::read_dir(&self.cache_dir).await?;
        let now = chrono::Utc::now().timestamp();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Ok(content) = tokio::fs::read_to_string(&path).await {
                    if let Ok(cached) = serde_json::from_str::<FileEntry>(&content) {
                        if cached.expires_at <= now && tokio::fs::remove_file(&path).await.is_ok() {
                            cleaned_count += 1;
                        }
                    }
                }
            }
        }

        if cleaned_count > 0 {
            info!("🧹 Cleaned up {} expired cache files", cleaned_count);
        }

        Ok(cleaned_count)
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn ping(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let metadata = tokio::fs::metadata(&self.cache_dir).await?;
        if metadata.permissions().readonly() {
            return Err(PipelineError::Config(format!(
                "cache directory {} is read-only",
                self.cache_dir.display()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let cached: FileEntry = serde_json::from_str(&content)?;
        if cached.key != key {
            return Ok(None);
        }
        if cached.expires_at <= chrono::Utc::now().timestamp() {
            debug!("⏰ Cache expired for key: {}", key);
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(cached.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let entry = FileEntry {
            key: key.to_string(),
            value,
            expires_at: chrono::Utc::now().timestamp() + ttl.as_secs() as i64,
        };
        tokio::fs::write(self.entry_path(key), serde_json::to_string(&entry)?).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Connection state of a [`CacheClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Unavailable,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Ready,
            2 => ConnectionState::Unavailable,
            _ => ConnectionState::Connecting,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Ready => 1,
            ConnectionState::Unavailable => 2,
        }
    }
}

/// Bounded connection retry policy
#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

struct CacheInner {
    backend: Arc<dyn CacheBackend>,
    state: AtomicU8,
    policy: ConnectPolicy,
}

/// Cache handle shared by every pipeline component
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<CacheInner>,
}

impl CacheClient {
    /// Create a client that serves nothing until [`CacheClient::connect`] succeeds
    pub fn new(backend: Arc<dyn CacheBackend>, policy: ConnectPolicy) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                backend,
                state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
                policy,
            }),
        }
    }

    /// Create and connect in one step
    pub async fn connected(backend: Arc<dyn CacheBackend>) -> Self {
        let client = Self::new(backend, ConnectPolicy::default());
        client.connect().await;
        client
    }

    /// A client that behaves as a permanent miss
    pub fn disabled() -> Self {
        let client = Self::new(Arc::new(MemoryBackend::new(1)), ConnectPolicy::default());
        client.set_state(ConnectionState::Unavailable);
        client
    }

    /// Ping the backend with bounded retry. The outcome is final for the
    /// lifetime of this client.
    pub async fn connect(&self) -> ConnectionState {
        let current = self.state();
        if current != ConnectionState::Connecting {
            return current;
        }

        let backend = &self.inner.backend;
        let policy = self.inner.policy;
        for attempt in 1..=policy.attempts {
            match backend.ping().await {
                Ok(()) => {
                    info!("🗄️ Cache backend '{}' connected", backend.name());
                    self.set_state(ConnectionState::Ready);
                    return ConnectionState::Ready;
                }
                Err(e) => {
                    warn!(
                        "Cache backend '{}' connection attempt {}/{} failed: {}",
                        backend.name(),
                        attempt,
                        policy.attempts,
                        e
                    );
                    if attempt < policy.attempts {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }

        error!(
            "Cache backend '{}' unavailable, continuing without cache",
            backend.name()
        );
        self.set_state(ConnectionState::Unavailable);
        ConnectionState::Unavailable
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_available(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.store(state.as_u8(), Ordering::Release);
    }

    /// Raw stored text for a key
    pub async fn get_text(&self, key: &str) -> Option<String> {
        if !self.is_available() {
            return None;
        }

        match self.inner.backend.get(key).await {
            Ok(Some(value)) => {
                debug!("Cache hit: {}", key);
                Some(value)
            }
            Ok(None) => {
                debug!("Cache miss: {}", key);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Stored value, parsed as JSON when it holds JSON text
    pub async fn get(&self, key: &str) -> Option<Value> {
        let raw = self.get_text(key).await?;
        let parsed = serde_json::from_str::<Value>(&raw);
        Some(parsed.unwrap_or_else(|_| Value::String(raw)))
    }

    /// Stored value deserialized into `T`; undecodable entries count as a miss
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Ignoring undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Store `value` for `ttl_seconds`; strings are stored verbatim
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, ttl_seconds: u64, value: &T) {
        if !self.is_available() {
            return;
        }

        let payload = match serde_json::to_value(value) {
            Ok(Value::String(text)) => text,
            Ok(other) => other.to_string(),
            Err(e) => {
                warn!("Cache serialization failed for {}: {}", key, e);
                return;
            }
        };

        self.write(key, ttl_seconds, payload).await;
    }

    pub async fn set_text(&self, key: &str, ttl_seconds: u64, value: &str) {
        if !self.is_available() {
            return;
        }
        self.write(key, ttl_seconds, value.to_string()).await;
    }

    pub async fn delete(&self, key: &str) {
        if !self.is_available() {
            return;
        }
        if let Err(e) = self.inner.backend.delete(key).await {
            warn!("Cache delete failed for {}: {}", key, e);
        }
    }

    async fn write(&self, key: &str, ttl_seconds: u64, payload: String) {
        let ttl = Duration::from_secs(ttl_seconds);
        match self.inner.backend.set(key, payload, ttl).await {
            Ok(()) => debug!("Cached {} for {}s", key, ttl_seconds),
            Err(e) => warn!("Cache write failed for {}: {}", key, e),
        }
    }
}

/// Cache key namespace
pub mod keys {
    /// Percent-encode a video URL for use inside a key
    pub fn encode_url(video_url: &str) -> String {
        urlencoding::encode(video_url).into_owned()
    }

    pub fn transcription(course_id: &str, video_url: &str) -> String {
        format!("transcription:{}:{}", course_id, encode_url(video_url))
    }

    pub fn mindmap_response(course_id: &str, video_url: &str) -> String {
        format!("mindmap:response:{}:{}", course_id, encode_url(video_url))
    }

    pub fn mindmap_structure(course_id: &str, video_url: &str) -> String {
        format!("mindmap:structure:{}:{}", course_id, encode_url(video_url))
    }

    pub fn mindmap_structure_digest(content: &str) -> String {
        format!("mindmap:structure:hash:{:x}", md5::compute(content.as_bytes()))
    }

    pub fn mindmap_markdown(course_id: &str, video_url: &str) -> String {
        format!("mindmap:markdown:{}:{}", course_id, encode_url(video_url))
    }

    pub fn mindmap_markdown_digest(content: &str) -> String {
        format!("mindmap:markdown:hash:{:x}", md5::compute(content.as_bytes()))
    }
}
