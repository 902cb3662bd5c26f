//! Domain entity definitions.

mod image;

pub use self::image::{CacheKey, DecodedImage, ImageSource, ImageUrl, LoadedAsset};
