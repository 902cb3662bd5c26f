//! Domain types for image loading and caching.

use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Decoded image shared between cache tiers.
pub type DecodedImage = Arc<image::DynamicImage>;

/// Identifier of a remote image.
///
/// Treated as an opaque equality/hash key; only the HTTP transport looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageUrl(String);

impl ImageUrl {
    /// Creates a new `ImageUrl` from any string-like input.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical byte form used for key derivation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for ImageUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageUrl {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageUrl {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Content address of a cached payload: SHA-256 of the URL bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 64;

    /// Derives the key for a URL. Stable across process restarts.
    #[must_use]
    pub fn derive(url: &ImageUrl) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase fixed-width hex string, safe to use as a file name.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<&ImageUrl> for CacheKey {
    fn from(url: &ImageUrl) -> Self {
        Self::derive(url)
    }
}

/// Result of a network fetch: the decoded image plus the bytes it came from.
///
/// The raw payload is kept so the disk tier can persist it without re-encoding.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    /// Decoded image.
    pub image: DecodedImage,
    /// Original encoded payload.
    pub bytes: Bytes,
}

impl LoadedAsset {
    /// Creates a new asset.
    #[must_use]
    pub const fn new(image: DecodedImage, bytes: Bytes) -> Self {
        Self { image, bytes }
    }

    /// Size of the encoded payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the encoded payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from in-memory LRU cache.
    Memory,
    /// Loaded from disk cache.
    Disk,
    /// Downloaded from network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_cache_key_is_fixed_width_hex() {
        let key = CacheKey::derive(&ImageUrl::new(
            "https://cdn.example.com/attachments/123/456/image.png",
        ));
        let hex = key.to_hex();

        assert_eq!(hex.len(), CacheKey::HEX_LEN);
        assert!(
            hex.chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_cache_key_consistency() {
        let url = ImageUrl::new("https://example.com/image.png");
        assert_eq!(CacheKey::derive(&url), CacheKey::derive(&url.clone()));
        assert_eq!(CacheKey::derive(&url).to_hex(), CacheKey::from(&url).to_hex());
    }

    #[test]
    fn test_cache_key_known_digest() {
        // sha256("") is a well-known constant.
        let key = CacheKey::derive(&ImageUrl::new(""));
        assert_eq!(
            key.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_cache_key_distinct_urls() {
        let urls: Vec<ImageUrl> = (0..500)
            .map(|i| ImageUrl::new(format!("https://example.com/img/{i}.png")))
            .chain([
                ImageUrl::new("https://example.com/a.png"),
                ImageUrl::new("https://example.com/a.png?"),
                ImageUrl::new("http://example.com/a.png"),
            ])
            .collect();

        let keys: HashSet<CacheKey> = urls.iter().map(CacheKey::derive).collect();
        assert_eq!(keys.len(), urls.len());
    }

    #[test]
    fn test_image_source_display() {
        assert_eq!(ImageSource::Memory.to_string(), "memory");
        assert_eq!(ImageSource::Disk.to_string(), "disk");
        assert_eq!(ImageSource::Network.to_string(), "network");
    }
}
