//! Port definition for a cache tier.

use crate::domain::entities::{DecodedImage, ImageSource, ImageUrl};
use crate::domain::errors::FetchResult;

/// One layer of the memory -> disk -> network chain.
/// Implementations must be thread-safe.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageFetchPort: Send + Sync {
    /// Returns the decoded image for `url` along with the tier that produced it,
    /// delegating to lower tiers on a miss.
    async fn fetch_with_source(&self, url: &ImageUrl) -> FetchResult<(DecodedImage, ImageSource)>;

    /// Returns the decoded image for `url`.
    async fn fetch(&self, url: &ImageUrl) -> FetchResult<DecodedImage> {
        self.fetch_with_source(url).await.map(|(image, _)| image)
    }
}
