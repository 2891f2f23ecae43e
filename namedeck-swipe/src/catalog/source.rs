//! Dataset sources
//!
//! A `DataSource` fetches the raw bytes of one named dataset resource. Parsing, caching
//! and coalescing happen above this layer, so a source may be hit concurrently for
//! different resources but is never asked for the same chunk twice at once.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

const USER_AGENT: &str = concat!("namedeck/", env!("CARGO_PKG_VERSION"));

/// A named file of the offline dataset packaging
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// `names-{chunk}.json`
    Chunk(String),
    /// `names-index.json`
    Index,
    /// `swipe-decks.json`
    Decks,
    /// `names-metadata.json`
    Manifest,
}

impl Resource {
    pub fn file_name(&self) -> String {
        match self {
            Resource::Chunk(name) => format!("names-{}.json", name),
            Resource::Index => "names-index.json".to_string(),
            Resource::Decks => "swipe-decks.json".to_string(),
            Resource::Manifest => "names-metadata.json".to_string(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Raw byte fetch of dataset resources
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch a resource; `Error::NotFound` when it does not exist
    async fn fetch(&self, resource: &Resource) -> Result<Vec<u8>>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Open a source from a configured location: `http(s)://` base URL or local directory
pub fn open_source(location: &str, fetch_timeout: Duration) -> Result<Box<dyn DataSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Box::new(HttpSource::new(location, fetch_timeout)?))
    } else {
        Ok(Box::new(DirSource::new(location)))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Dataset served as static files under a base URL
pub struct HttpSource {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, resource: &Resource) -> String {
        format!("{}/{}", self.base_url, resource.file_name())
    }
}

#[async_trait]
impl DataSource for HttpSource {
    async fn fetch(&self, resource: &Resource) -> Result<Vec<u8>> {
        let url = self.url_for(resource);
        tracing::debug!(url = %url, "Fetching dataset resource");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(resource.file_name()));
        }
        if !status.is_success() {
            return Err(Error::Fetch(format!("{}: HTTP {}", url, status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", url, e)))?;

        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

// ============================================================================
// Local directory
// ============================================================================

/// Dataset unpacked into a local directory
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DataSource for DirSource {
    async fn fetch(&self, resource: &Resource) -> Result<Vec<u8>> {
        let path = self.root.join(resource.file_name());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(path.display().to_string()))
            }
            Err(e) => Err(Error::Fetch(format!("{}: {}", path.display(), e))),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Dataset held in memory
///
/// Counts fetches per resource and can be told to fail or stall, which makes it the
/// source of choice for exercising coalescing and failure handling.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<Resource, Vec<u8>>>,
    fetches: Mutex<HashMap<Resource, usize>>,
    failing: Mutex<HashSet<Resource>>,
    latency: Mutex<Option<Duration>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: Resource, bytes: Vec<u8>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(resource, bytes);
        }
    }

    pub fn insert_json<T: serde::Serialize>(&self, resource: Resource, value: &T) -> Result<()> {
        self.insert(resource, serde_json::to_vec(value)?);
        Ok(())
    }

    /// Make every fetch of `resource` fail until `recover` is called
    pub fn fail(&self, resource: Resource) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(resource);
        }
    }

    pub fn recover(&self, resource: &Resource) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(resource);
        }
    }

    /// Delay every fetch by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    /// Number of fetches issued for `resource`, failed ones included
    pub fn fetch_count(&self, resource: &Resource) -> usize {
        self.fetches
            .lock()
            .map(|f| f.get(resource).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().map(|f| f.values().sum()).unwrap_or(0)
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch(&self, resource: &Resource) -> Result<Vec<u8>> {
        if let Ok(mut fetches) = self.fetches.lock() {
            *fetches.entry(resource.clone()).or_insert(0) += 1;
        }

        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(resource))
            .unwrap_or(false);
        if failing {
            return Err(Error::Fetch(format!("{}: injected failure", resource)));
        }

        self.files
            .lock()
            .map_err(|_| Error::Internal("memory source lock poisoned".to_string()))?
            .get(resource)
            .cloned()
            .ok_or_else(|| Error::NotFound(resource.file_name()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
