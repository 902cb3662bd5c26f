mod http_transport_port;
mod image_codec_port;
mod image_fetch_port;

pub use http_transport_port::{HttpResponse, HttpTransport, TransportError};
pub use image_codec_port::ImageDecoder;
pub use image_fetch_port::ImageFetchPort;

#[cfg(test)]
pub mod mocks {
    pub use super::http_transport_port::mock::{MockHttpTransport, png_bytes};
    pub use super::image_fetch_port::MockImageFetchPort;
}
