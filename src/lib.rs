//! remote-image - Fetch images by URL through memory, disk and network tiers.
//!
//! Concurrent requests for the same URL are coalesced into one download, and
//! results are promoted back into every faster tier they passed through.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

pub use domain::{CacheKey, DecodedImage, FetchError, FetchResult, ImageSource, ImageUrl};
pub use infrastructure::{ImageLoader, ImageLoaderConfig};

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "remote-image";
