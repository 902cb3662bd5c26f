//! Image decoding backed by the `image` crate.

use std::sync::Arc;

use bytes::Bytes;
use tracing::error;

use crate::domain::entities::DecodedImage;
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::ImageDecoder;

/// Decodes PNG, JPEG and WebP payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<image::DynamicImage, String> {
        image::load_from_memory(bytes).map_err(|e| e.to_string())
    }
}

/// Runs `decoder` on the blocking pool.
///
/// # Errors
/// Returns `FetchError::Decode` if the bytes are not a valid image or the decode task panicked.
pub async fn decode_blocking(
    decoder: Arc<dyn ImageDecoder>,
    bytes: Bytes,
) -> FetchResult<DecodedImage> {
    let decoded = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
        .await
        .map_err(|e| {
            error!(error = %e, "Decode task panicked");
            FetchError::decode(format!("decode task panicked: {e}"))
        })?
        .map_err(FetchError::Decode)?;

    Ok(Arc::new(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::png_bytes;

    #[tokio::test]
    async fn test_decode_png() {
        let img = decode_blocking(Arc::new(RasterDecoder), png_bytes(7, 3))
            .await
            .unwrap();
        assert_eq!((img.width(), img.height()), (7, 3));
    }

    #[tokio::test]
    async fn test_decode_garbage() {
        let result = decode_blocking(Arc::new(RasterDecoder), Bytes::from_static(b"not an image")).await;
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_decode_empty() {
        let result = decode_blocking(Arc::new(RasterDecoder), Bytes::new()).await;
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }
}
