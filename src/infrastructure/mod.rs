//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// HTTP transport adapters.
pub mod http;
/// Image loading (caching tiers, decoding, facade).
pub mod image;

pub use config::{
    AppConfig, CliArgs, ConfigError, ConfigSource, ConfigStore, LoadedConfig, LogLevel,
};
pub use http::ReqwestTransport;
pub use self::image::{
    CacheStats, DiskCacheStats, DiskImageCache, ImageLoader, ImageLoaderConfig, MemoryImageCache,
    NetworkImageLoader, RasterDecoder,
};
