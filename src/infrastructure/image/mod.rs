//! Image loading infrastructure.
//!
//! This module provides:
//! - Network loading with per-URL request coalescing
//! - Content-addressed disk caching for persistence
//! - Memory caching with LRU eviction
//! - A facade wiring the tiers together

pub mod codec;
pub mod disk_cache;
pub mod loader;
pub mod memory_cache;
pub mod network_loader;

pub use codec::RasterDecoder;
pub use disk_cache::{DiskCacheStats, DiskImageCache, default_cache_dir};
pub use loader::{ImageLoader, ImageLoaderConfig};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use network_loader::NetworkImageLoader;
