//! In-memory LRU image cache implementation.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::{DecodedImage, ImageSource, ImageUrl};
use crate::domain::errors::FetchResult;
use crate::domain::ports::ImageFetchPort;

/// Default maximum number of images to cache in memory.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// LRU table plus the decoded byte size it currently holds.
struct Table {
    entries: LruCache<ImageUrl, DecodedImage>,
    bytes: usize,
}

/// In-memory LRU cache for decoded images, in front of a slower tier.
/// Thread-safe and optimized for frequent reads.
pub struct MemoryImageCache {
    table: RwLock<Table>,
    next: Arc<dyn ImageFetchPort>,
    max_bytes: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl MemoryImageCache {
    /// Creates a cache holding at most `capacity` images (minimum 1).
    #[must_use]
    pub fn new(capacity: usize, next: Arc<dyn ImageFetchPort>) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            table: RwLock::new(Table {
                entries: LruCache::new(cap),
                bytes: 0,
            }),
            next,
            max_bytes: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Additionally bounds the total decoded size of cached images.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: Option<usize>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Returns the cached image for `url`, or loads it from the next tier and stores it.
    ///
    /// # Errors
    /// Propagates errors from the next tier. Nothing is cached on failure.
    pub async fn fetch(&self, url: &ImageUrl) -> FetchResult<DecodedImage> {
        self.fetch_inner(url).await.map(|(image, _)| image)
    }

    async fn fetch_inner(&self, url: &ImageUrl) -> FetchResult<(DecodedImage, ImageSource)> {
        if let Some(img) = self.get(url).await {
            return Ok((img, ImageSource::Memory));
        }

        let (img, source) = self.next.fetch_with_source(url).await?;
        self.put(url.clone(), Arc::clone(&img)).await;
        Ok((img, source))
    }

    /// Looks up `url`, promoting it in the LRU.
    pub async fn get(&self, url: &ImageUrl) -> Option<DecodedImage> {
        let mut table = self.table.write().await;
        if let Some(img) = table.entries.get(url) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(url = %url, "Memory cache hit");
            Some(Arc::clone(img))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(url = %url, "Memory cache miss");
            None
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    /// Use this in read-only contexts to avoid write locks.
    pub async fn peek(&self, url: &ImageUrl) -> Option<DecodedImage> {
        let table = self.table.read().await;
        table.entries.peek(url).cloned()
    }

    /// Stores an image, replacing any existing entry for `url`.
    ///
    /// Images larger than the byte bound are not stored.
    pub async fn put(&self, url: ImageUrl, image: DecodedImage) {
        let size = image_size(&image);
        if self.max_bytes.is_some_and(|max| size > max) {
            debug!(url = %url, size, "Image exceeds memory cache byte bound, not storing");
            return;
        }

        let mut table = self.table.write().await;
        debug!(url = %url, size, "Storing image in memory cache");
        if let Some((_, displaced)) = table.entries.push(url, image) {
            table.bytes -= image_size(&displaced);
        }
        table.bytes += size;

        if let Some(max) = self.max_bytes {
            while table.bytes > max {
                let Some((evicted, img)) = table.entries.pop_lru() else {
                    break;
                };
                table.bytes -= image_size(&img);
                trace!(url = %evicted, "Evicted image to fit byte bound");
            }
        }
    }

    /// Removes an image from the cache.
    pub async fn evict(&self, url: &ImageUrl) {
        let mut table = self.table.write().await;
        if let Some(img) = table.entries.pop(url) {
            table.bytes -= image_size(&img);
            debug!(url = %url, "Evicted image from memory cache");
        }
    }

    /// Clears all images from the cache.
    pub async fn clear(&self) {
        let mut table = self.table.write().await;
        table.entries.clear();
        table.bytes = 0;
        debug!("Cleared memory image cache");
    }

    /// Returns the current number of cached images.
    pub async fn len(&self) -> usize {
        self.table.read().await.entries.len()
    }

    /// Returns true if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns cache statistics.
    #[allow(clippy::cast_precision_loss)]
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let table = self.table.read().await;
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: table.entries.len(),
            bytes: table.bytes,
        }
    }
}

fn image_size(image: &DecodedImage) -> usize {
    image.as_bytes().len()
}

#[async_trait::async_trait]
impl ImageFetchPort for MemoryImageCache {
    async fn fetch_with_source(&self, url: &ImageUrl) -> FetchResult<(DecodedImage, ImageSource)> {
        self.fetch_inner(url).await
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Decoded bytes currently held.
    pub bytes: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.bytes, self.hit_rate, self.hits, self.misses
        )
    }
}
