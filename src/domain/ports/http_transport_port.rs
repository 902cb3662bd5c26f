//! HTTP transport port definition.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::entities::ImageUrl;
use crate::domain::errors::FetchError;

/// Raw response returned by a transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code as received. Not validated by the transport.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns the first header value matching `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-level failures.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to read body: {0}")]
    Body(String),
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Port for issuing HTTP GET requests.
/// Implementations must be thread-safe.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs a GET request for `url`.
    async fn get(&self, url: &ImageUrl) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Responder = Box<dyn Fn(usize, &ImageUrl) -> Result<HttpResponse, TransportError> + Send + Sync>;

    /// Scriptable transport that counts invocations.
    pub struct MockHttpTransport {
        calls: AtomicUsize,
        delay: Option<Duration>,
        responder: Responder,
    }

    impl MockHttpTransport {
        /// Always answers 200 with `body`.
        pub fn ok(body: impl Into<Bytes>) -> Self {
            let body = body.into();
            Self::with_responder(move |_, _| Ok(HttpResponse::new(200, body.clone())))
        }

        /// Always answers with `status` and `body`.
        pub fn status(status: u16, body: impl Into<Bytes>) -> Self {
            let body = body.into();
            Self::with_responder(move |_, _| Ok(HttpResponse::new(status, body.clone())))
        }

        /// Always fails at the transport level.
        pub fn failing() -> Self {
            Self::with_responder(|_, _| Err(TransportError::Request("connection refused".into())))
        }

        /// Answers with the result of `f(call_index, url)`.
        pub fn with_responder<F>(f: F) -> Self
        where
            F: Fn(usize, &ImageUrl) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
        {
            Self {
                calls: AtomicUsize::new(0),
                delay: None,
                responder: Box::new(f),
            }
        }

        /// Sleeps for `delay` before answering.
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of `get` invocations so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for MockHttpTransport {
        async fn get(&self, url: &ImageUrl) -> Result<HttpResponse, TransportError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.responder)(index, url)
        }
    }

    /// Encodes a solid `width`x`height` PNG.
    pub fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("encode test png");
        Bytes::from(out.into_inner())
    }
}
