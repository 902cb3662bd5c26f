//! Content-addressed disk tier for persistence across sessions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheKey, DecodedImage, ImageSource, ImageUrl};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{ImageDecoder, ImageFetchPort};

use crate::infrastructure::config::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER};

use super::codec::decode_blocking;
use super::network_loader::NetworkImageLoader;

/// Disk tier that stores raw payloads under their `CacheKey`.
///
/// Concurrent misses are not coalesced here; they converge on the network tier.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    network: Arc<NetworkImageLoader>,
    decoder: Arc<dyn ImageDecoder>,
    reads: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.cache_dir)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Counters for disk tier activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCacheStats {
    /// Attempts to read an entry, successful or not.
    pub reads: u64,
    /// Lookups served from disk.
    pub hits: u64,
    /// Lookups that fell through to the network (absent or corrupt).
    pub misses: u64,
    /// Entries written.
    pub writes: u64,
    /// Writes that failed after a successful fetch.
    pub write_failures: u64,
}

impl DiskImageCache {
    /// Creates a disk cache rooted at `cache_dir`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns `FetchError::Storage` if the directory cannot be created.
    pub async fn new(cache_dir: PathBuf, network: Arc<NetworkImageLoader>) -> FetchResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| FetchError::storage(format!("failed to create cache dir: {e}")))?;

        debug!(path = %cache_dir.display(), "Disk image cache ready");

        Ok(Self {
            cache_dir,
            decoder: network.decoder(),
            network,
            reads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path for a cached entry.
    #[must_use]
    pub fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.to_hex())
    }

    /// Fetches `url` from disk, falling back to the network tier and persisting the result.
    ///
    /// # Errors
    /// Propagates network tier errors. Storage failures never surface here.
    pub async fn fetch(&self, url: &ImageUrl) -> FetchResult<DecodedImage> {
        self.fetch_inner(url).await.map(|(image, _)| image)
    }

    async fn fetch_inner(&self, url: &ImageUrl) -> FetchResult<(DecodedImage, ImageSource)> {
        let key = CacheKey::derive(url);

        if let Some(image) = self.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((image, ImageSource::Disk));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let asset = self.network.fetch(url).await?;

        if let Err(e) = self.put_bytes(&key, &asset.bytes).await {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(url = %url, key = %key, error = %e, "Failed to cache to disk");
        }

        Ok((asset.image, ImageSource::Network))
    }

    /// Reads raw bytes for `key`.
    pub async fn get_bytes(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.cache_path(key);
        self.reads.fetch_add(1, Ordering::Relaxed);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Some(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(key = %key, "Disk cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cache file");
                None
            }
        }
    }

    /// Loads and decodes the entry for `key`. A corrupt entry reads as absent.
    pub async fn get(&self, key: &CacheKey) -> Option<DecodedImage> {
        let bytes = self.get_bytes(key).await?;

        match decode_blocking(Arc::clone(&self.decoder), bytes.into()).await {
            Ok(img) => {
                debug!(key = %key, "Decoded image from disk cache");
                Some(img)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to decode cached image");
                None
            }
        }
    }

    /// Atomically stores raw bytes under `key`, replacing any existing entry.
    ///
    /// # Errors
    /// Returns `FetchError::Storage` if the file cannot be written.
    pub async fn put_bytes(&self, key: &CacheKey, bytes: &[u8]) -> FetchResult<()> {
        let path = self.cache_path(key);
        let dir = self.cache_dir.clone();
        let target = path.clone();
        let data = bytes.to_vec();

        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &data))
            .await
            .map_err(|e| FetchError::storage(format!("write task panicked: {e}")))?
            .map_err(|e| FetchError::storage(format!("failed to write cache file: {e}")))?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, path = %path.display(), size = bytes.len(), "Stored image in disk cache");
        Ok(())
    }

    /// Checks if an entry exists for `key`.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        fs::try_exists(self.cache_path(key)).await.unwrap_or(false)
    }

    /// Removes the entry for `key`, if any.
    pub async fn evict(&self, key: &CacheKey) {
        match fs::remove_file(self.cache_path(key)).await {
            Ok(()) => debug!(key = %key, "Evicted from disk cache"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to evict from disk cache"),
        }
    }

    /// Removes every entry in the store.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear(&self) -> FetchResult<()> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| FetchError::storage(format!("failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FetchError::storage(format!("failed to read entry: {e}")))?
        {
            let path = entry.path();
            if is_cache_file(&path) && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns activity counters.
    #[must_use]
    pub fn stats(&self) -> DiskCacheStats {
        DiskCacheStats {
            reads: self.reads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl ImageFetchPort for DiskImageCache {
    async fn fetch_with_source(&self, url: &ImageUrl) -> FetchResult<(DecodedImage, ImageSource)> {
        self.fetch_inner(url).await
    }
}

fn write_atomic(dir: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.flush()?;
    temp_file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Returns the default cache directory for a loader identifier.
#[must_use]
pub fn default_cache_dir(identifier: &str) -> PathBuf {
    let leaf = format!("images-{identifier}");
    directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
        || std::env::temp_dir().join(APP_NAME).join(&leaf),
        |dirs| dirs.cache_dir().join(&leaf),
    )
}

fn is_cache_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.len() == CacheKey::HEX_LEN && name.bytes().all(|b| b.is_ascii_hexdigit())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::{MockHttpTransport, png_bytes};
    use tempfile::TempDir;

    async fn create_test_cache(
        transport: &Arc<MockHttpTransport>,
    ) -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let network = Arc::new(NetworkImageLoader::new(transport.clone()));
        let cache = DiskImageCache::new(temp_dir.path().join("images"), network)
            .await
            .unwrap();
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get_bytes() {
        let transport = Arc::new(MockHttpTransport::ok(png_bytes(1, 1)));
        let (cache, _temp) = create_test_cache(&transport).await;
        let key = CacheKey::derive(&ImageUrl::new("test1"));

        cache.put_bytes(&key, b"test image data").await.unwrap();

        assert_eq!(cache.get_bytes(&key).await.unwrap(), b"test image data");
        assert!(cache.cache_path(&key).ends_with(key.to_hex()));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let transport = Arc::new(MockHttpTransport::ok(png_bytes(1, 1)));
        let (cache, _temp) = create_test_cache(&transport).await;

        let key = CacheKey::derive(&ImageUrl::new("nonexistent"));
        assert!(cache.get_bytes(&key).await.is_none());
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_cold_fetch_persists_raw_bytes() {
        let payload = png_bytes(5, 5);
        let transport = Arc::new(MockHttpTransport::ok(payload.clone()));
        let (cache, _temp) = create_test_cache(&transport).await;
        let url = ImageUrl::new("https://example.com/a.png");
        let key = CacheKey::derive(&url);

        let image = cache.fetch(&url).await.unwrap();

        assert_eq!(image.width(), 5);
        assert_eq!(transport.calls(), 1);
        assert!(cache.contains(&key).await);
        assert_eq!(cache.get_bytes(&key).await.unwrap(), payload.to_vec());
    }

    #[tokio::test]
    async fn test_warm_fetch_skips_network() {
        let transport = Arc::new(MockHttpTransport::ok(png_bytes(5, 5)));
        let (cache, _temp) = create_test_cache(&transport).await;
        let url = ImageUrl::new("https://example.com/a.png");

        cache.fetch(&url).await.unwrap();
        let (image, source) = cache.fetch_with_source(&url).await.unwrap();

        assert_eq!(source, ImageSource::Disk);
        assert_eq!(image.height(), 5);
        assert_eq!(transport.calls(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_existing_entry_survives_new_instance() {
        let transport = Arc::new(MockHttpTransport::ok(png_bytes(2, 2)));
        let (cache, temp) = create_test_cache(&transport).await;
        let url = ImageUrl::new("https://example.com/persist.png");
        cache.fetch(&url).await.unwrap();

        let network = Arc::new(NetworkImageLoader::new(transport.clone()));
        let reopened = DiskImageCache::new(temp.path().join("images"), network)
            .await
            .unwrap();
        let (_, source) = reopened.fetch_with_source(&url).await.unwrap();

        assert_eq!(source, ImageSource::Disk);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_refetched_and_overwritten() {
        let payload = png_bytes(6, 4);
        let transport = Arc::new(MockHttpTransport::ok(payload.clone()));
        let (cache, _temp) = create_test_cache(&transport).await;
        let url = ImageUrl::new("https://example.com/corrupt.png");
        let key = CacheKey::derive(&url);

        cache.put_bytes(&key, b"garbage garbage garbage").await.unwrap();

        let (image, source) = cache.fetch_with_source(&url).await.unwrap();

        assert_eq!(source, ImageSource::Network);
        assert_eq!((image.width(), image.height()), (6, 4));
        assert_eq!(transport.calls(), 1);
        assert_eq!(cache.get_bytes(&key).await.unwrap(), payload.to_vec());
    }

    #[tokio::test]
    async fn test_network_error_propagates_and_writes_nothing() {
        let transport = Arc::new(MockHttpTransport::status(404, "missing"));
        let (cache, _temp) = create_test_cache(&transport).await;
        let url = ImageUrl::new("https://example.com/missing.png");

        let result = cache.fetch(&url).await;

        assert_eq!(result.unwrap_err(), FetchError::HttpStatus(404));
        assert!(!cache.contains(&CacheKey::derive(&url)).await);
        assert_eq!(cache.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_write_failure_still_returns_image() {
        let transport = Arc::new(MockHttpTransport::ok(png_bytes(3, 3)));
        let (cache, _temp) = create_test_cache(&transport).await;
        let url = ImageUrl::new("https://example.com/unwritable.png");

        // A directory at the target path makes the final rename fail.
        std::fs::create_dir_all(cache.cache_path(&CacheKey::derive(&url)).join("blocker")).unwrap();

        let image = cache.fetch(&url).await.unwrap();

        assert_eq!(image.width(), 3);
        assert_eq!(cache.stats().write_failures, 1);
        assert_eq!(cache.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_evict() {
        let transport = Arc::new(MockHttpTransport::ok(png_bytes(1, 1)));
        let (cache, _temp) = create_test_cache(&transport).await;
        let key = CacheKey::derive(&ImageUrl::new("test1"));

        cache.put_bytes(&key, b"test").await.unwrap();
        assert!(cache.contains(&key).await);

        cache.evict(&key).await;
        assert!(!cache.contains(&key).await);

        // Evicting a missing entry is a no-op.
        cache.evict(&key).await;
    }

    #[tokio::test]
    async fn test_clear_only_removes_cache_files() {
        let transport = Arc::new(MockHttpTransport::ok(png_bytes(1, 1)));
        let (cache, _temp) = create_test_cache(&transport).await;
        let k1 = CacheKey::derive(&ImageUrl::new("test1"));
        let k2 = CacheKey::derive(&ImageUrl::new("test2"));
        let unrelated = cache.cache_dir().join("notes.txt");

        cache.put_bytes(&k1, b"data1").await.unwrap();
        cache.put_bytes(&k2, b"data2").await.unwrap();
        std::fs::write(&unrelated, "keep").unwrap();

        cache.clear().await.unwrap();

        assert!(!cache.contains(&k1).await);
        assert!(!cache.contains(&k2).await);
        assert!(unrelated.exists());
    }
}
