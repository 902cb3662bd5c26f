//! Image loading facade.
//!
//! Wires the three tiers: Memory -> Disk -> Network

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{Instrument, error, info, info_span, warn};

use crate::domain::entities::{CacheKey, DecodedImage, ImageSource, ImageUrl};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{HttpTransport, ImageDecoder, ImageFetchPort};
use crate::infrastructure::http::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, ReqwestTransport};

use super::codec::RasterDecoder;
use super::disk_cache::{DiskImageCache, default_cache_dir};
use super::memory_cache::{CacheStats, DEFAULT_CACHE_SIZE, MemoryImageCache};
use super::network_loader::NetworkImageLoader;

/// Default bound on decoded bytes held in memory (64 MiB).
pub const DEFAULT_MEMORY_CACHE_BYTES: usize = 64 * 1024 * 1024;

static SHARED: OnceCell<ImageLoader> = OnceCell::const_new();

/// Configuration for the image loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLoaderConfig {
    /// Name used in log spans and the default disk directory.
    #[serde(default = "default_identifier")]
    pub identifier: String,
    /// Whether the disk tier sits between memory and network.
    #[serde(default = "default_true")]
    pub disk_cache_enabled: bool,
    /// Disk tier root. Defaults to the platform cache directory.
    #[serde(default)]
    pub disk_cache_dir: Option<PathBuf>,
    /// Maximum images in memory cache.
    #[serde(default = "default_memory_cache_size")]
    pub memory_cache_size: usize,
    /// Maximum decoded bytes in memory cache.
    #[serde(default = "default_memory_cache_bytes")]
    pub memory_cache_bytes: Option<usize>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_identifier() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_memory_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

#[allow(clippy::unnecessary_wraps)]
fn default_memory_cache_bytes() -> Option<usize> {
    Some(DEFAULT_MEMORY_CACHE_BYTES)
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
            disk_cache_enabled: true,
            disk_cache_dir: None,
            memory_cache_size: DEFAULT_CACHE_SIZE,
            memory_cache_bytes: default_memory_cache_bytes(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

impl ImageLoaderConfig {
    /// Returns effective disk tier root.
    #[must_use]
    pub fn effective_disk_cache_dir(&self) -> PathBuf {
        self.disk_cache_dir
            .clone()
            .unwrap_or_else(|| default_cache_dir(&self.identifier))
    }
}

/// Single entry point for fetching images through the cache tiers.
pub struct ImageLoader {
    config: ImageLoaderConfig,
    memory: Arc<MemoryImageCache>,
    disk: Option<Arc<DiskImageCache>>,
    network: Arc<NetworkImageLoader>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader with the given configuration and transport.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be created.
    pub async fn new(
        config: ImageLoaderConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> FetchResult<Self> {
        Self::with_decoder(config, transport, Arc::new(RasterDecoder)).await
    }

    /// Creates a loader with an explicit decoder.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be created.
    pub async fn with_decoder(
        config: ImageLoaderConfig,
        transport: Arc<dyn HttpTransport>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> FetchResult<Self> {
        let network = Arc::new(NetworkImageLoader::with_decoder(transport, decoder));

        let (disk, next): (Option<Arc<DiskImageCache>>, Arc<dyn ImageFetchPort>) =
            if config.disk_cache_enabled {
                let dir = config.effective_disk_cache_dir();
                info!(identifier = %config.identifier, path = %dir.display(), "Disk cache enabled");
                let disk = Arc::new(DiskImageCache::new(dir, Arc::clone(&network)).await?);
                (Some(Arc::clone(&disk)), disk as Arc<dyn ImageFetchPort>)
            } else {
                info!(identifier = %config.identifier, "Disk cache disabled");
                (None, Arc::clone(&network) as Arc<dyn ImageFetchPort>)
            };

        let memory = Arc::new(
            MemoryImageCache::new(config.memory_cache_size, next)
                .with_max_bytes(config.memory_cache_bytes),
        );

        Ok(Self {
            config,
            memory,
            disk,
            network,
        })
    }

    /// Creates a loader over `reqwest` using `config`.
    ///
    /// # Errors
    /// Returns error if the HTTP client or disk cache cannot be created.
    pub async fn from_config(config: ImageLoaderConfig) -> FetchResult<Self> {
        let transport = ReqwestTransport::new(
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )?;
        Self::new(config, Arc::new(transport)).await
    }

    /// Creates a loader with default configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client or disk cache cannot be created.
    pub async fn with_defaults() -> FetchResult<Self> {
        Self::from_config(ImageLoaderConfig::default()).await
    }

    /// Process-wide default loader, built on first use.
    ///
    /// Nothing in this crate depends on it; prefer explicit construction.
    ///
    /// # Errors
    /// Returns error if the first initialization fails. A later call retries.
    pub async fn shared() -> FetchResult<&'static Self> {
        SHARED.get_or_try_init(Self::with_defaults).await
    }

    /// Fetches and decodes the image at `url`.
    ///
    /// # Errors
    /// Returns `InvalidResponse`, `HttpStatus`, `Decode` or `Transport` from the network tier.
    pub async fn fetch(&self, url: &ImageUrl) -> FetchResult<DecodedImage> {
        self.fetch_with_source(url).await.map(|(image, _)| image)
    }

    /// Fetches `url` and reports which tier served it.
    ///
    /// The lookup runs on its own task: if the caller stops waiting, the fetch and
    /// its cache promotion still complete.
    ///
    /// # Errors
    /// See [`ImageLoader::fetch`].
    pub async fn fetch_with_source(&self, url: &ImageUrl) -> FetchResult<(DecodedImage, ImageSource)> {
        let span = info_span!("image_loader", loader = %self.config.identifier, url = %url);
        let memory = Arc::clone(&self.memory);
        let url = url.clone();

        tokio::spawn(async move { memory.fetch_with_source(&url).await }.instrument(span))
            .await
            .map_err(|e| {
                error!(error = %e, "Fetch task failed");
                FetchError::Internal(format!("fetch task failed: {e}"))
            })?
    }

    /// Returns the configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ImageLoaderConfig {
        &self.config
    }

    /// Returns the memory tier.
    #[must_use]
    pub fn memory_cache(&self) -> &Arc<MemoryImageCache> {
        &self.memory
    }

    /// Returns the disk tier, if enabled.
    #[must_use]
    pub fn disk_cache(&self) -> Option<&Arc<DiskImageCache>> {
        self.disk.as_ref()
    }

    /// Returns the network tier.
    #[must_use]
    pub fn network(&self) -> &Arc<NetworkImageLoader> {
        &self.network
    }

    /// Checks the memory tier without touching disk or network.
    pub async fn check_memory_cache(&self, url: &ImageUrl) -> Option<DecodedImage> {
        self.memory.peek(url).await
    }

    /// Returns true if the disk tier holds an entry for `url`.
    pub async fn is_on_disk(&self, url: &ImageUrl) -> bool {
        match &self.disk {
            Some(disk) => disk.contains(&CacheKey::derive(url)).await,
            None => false,
        }
    }

    /// Returns memory cache statistics.
    pub async fn memory_cache_stats(&self) -> CacheStats {
        self.memory.stats().await
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.memory.clear().await;
        if let Some(disk) = &self.disk
            && let Err(e) = disk.clear().await
        {
            warn!(error = %e, "Failed to clear disk cache");
        }
        info!(identifier = %self.config.identifier, "Cleared all image caches");
    }
}
