//! Port definition for image decoding.

/// Turns encoded bytes into a decoded image.
///
/// Called from the blocking pool, so implementations may be CPU-heavy.
pub trait ImageDecoder: Send + Sync {
    /// Decodes `bytes`.
    ///
    /// # Errors
    /// Returns a human-readable reason if the bytes are not a supported image.
    fn decode(&self, bytes: &[u8]) -> Result<image::DynamicImage, String>;
}
