//! Network tier with per-URL request coalescing.
//!
//! Every miss for a URL joins the one download already running for it. Downloads run
//! on their own task, so callers that go away do not cancel work other callers share.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::domain::entities::{DecodedImage, ImageSource, ImageUrl, LoadedAsset};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{HttpTransport, ImageDecoder, ImageFetchPort};

use super::codec::{RasterDecoder, decode_blocking};

type SharedDownload = Shared<BoxFuture<'static, FetchResult<LoadedAsset>>>;
type InFlightRegistry = Arc<Mutex<HashMap<ImageUrl, InFlightEntry>>>;

/// An outstanding download and the generation it was registered under.
#[derive(Clone)]
struct InFlightEntry {
    generation: u64,
    download: SharedDownload,
}

/// Downloads, validates and decodes images; at most one download per URL at a time.
pub struct NetworkImageLoader {
    transport: Arc<dyn HttpTransport>,
    decoder: Arc<dyn ImageDecoder>,
    in_flight: InFlightRegistry,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for NetworkImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkImageLoader")
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl NetworkImageLoader {
    /// Creates a loader using the default raster decoder.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_decoder(transport, Arc::new(RasterDecoder))
    }

    /// Creates a loader with an explicit decoder.
    #[must_use]
    pub fn with_decoder(transport: Arc<dyn HttpTransport>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            transport,
            decoder,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Returns the decoder shared with the disk tier.
    #[must_use]
    pub fn decoder(&self) -> Arc<dyn ImageDecoder> {
        Arc::clone(&self.decoder)
    }

    /// Fetches `url`, joining an outstanding download for it if there is one.
    ///
    /// # Errors
    /// Fails with `InvalidResponse`, `HttpStatus` or `Decode`, checked in that order,
    /// or `Transport` if the request never produced a response. Fails with `Internal`
    /// if the runtime could not run the download.
    pub async fn fetch(&self, url: &ImageUrl) -> FetchResult<LoadedAsset> {
        let existing = self.in_flight.lock().get(url).cloned();
        if let Some(entry) = existing {
            debug!(url = %url, "Joining in-flight download");
            return entry.download.await;
        }

        // Spawned outside the lock: a runtime that refuses the task drops it right here.
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (start, pending) = self.spawn_download(url.clone(), generation);

        let download = {
            let mut in_flight = self.in_flight.lock();
            if let Some(existing) = in_flight.get(url) {
                debug!(url = %url, "Joining in-flight download");
                existing.download.clone()
            } else {
                in_flight.insert(
                    url.clone(),
                    InFlightEntry {
                        generation,
                        download: pending.clone(),
                    },
                );
                // Sent with the entry in place, so the task's removal always follows the insert.
                let _ = start.send(());
                pending
            }
        };

        download.await
    }

    /// Returns true if a download for `url` is outstanding.
    #[must_use]
    pub fn is_loading(&self, url: &ImageUrl) -> bool {
        self.in_flight.lock().contains_key(url)
    }

    /// Returns the number of outstanding downloads.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    // The task waits for `start` and exits untouched if it is dropped, which is how a
    // caller that lost the registration race discards its spare task.
    fn spawn_download(
        &self,
        url: ImageUrl,
        generation: u64,
    ) -> (oneshot::Sender<()>, SharedDownload) {
        let (start, started) = oneshot::channel();
        let registry = Arc::clone(&self.in_flight);
        let transport = Arc::clone(&self.transport);
        let decoder = Arc::clone(&self.decoder);
        let task_url = url.clone();

        let handle = tokio::spawn(async move {
            if started.await.is_err() {
                return Err(FetchError::Internal("download superseded".to_string()));
            }
            let _guard = InFlightGuard {
                registry,
                url: task_url.clone(),
                generation,
            };
            download(transport.as_ref(), decoder, &task_url).await
        });

        let registry = Arc::clone(&self.in_flight);
        let pending = async move {
            handle.await.map_err(|e| {
                // The task never ran or died mid-flight; its guard may not have cleared the entry.
                remove_entry(&registry, &url, generation);
                error!(url = %url, error = %e, "Download task failed");
                FetchError::Internal(format!("download task failed: {e}"))
            })?
        }
        .boxed()
        .shared();

        (start, pending)
    }
}

fn remove_entry(registry: &InFlightRegistry, url: &ImageUrl, generation: u64) {
    let mut in_flight = registry.lock();
    if in_flight.get(url).is_some_and(|entry| entry.generation == generation) {
        in_flight.remove(url);
    }
}

/// Removes its own registry entry on every exit path of a running download task.
struct InFlightGuard {
    registry: InFlightRegistry,
    url: ImageUrl,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        remove_entry(&self.registry, &self.url, self.generation);
    }
}

async fn download(
    transport: &dyn HttpTransport,
    decoder: Arc<dyn ImageDecoder>,
    url: &ImageUrl,
) -> FetchResult<LoadedAsset> {
    debug!(url = %url, "Downloading image from network");
    let start = Instant::now();

    let response = transport.get(url).await.map_err(|e| {
        error!(url = %url, error = %e, "Request failed");
        FetchError::from(e)
    })?;

    info!(
        url = %url,
        bytes = response.body.len(),
        content_type = response.header("content-type").unwrap_or("unknown"),
        elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Downloaded image"
    );

    if !(100..=599).contains(&response.status) {
        error!(url = %url, status = response.status, "Response is not an HTTP response");
        return Err(FetchError::InvalidResponse);
    }

    if !(200..=299).contains(&response.status) {
        error!(url = %url, status = response.status, "Invalid status code");
        return Err(FetchError::HttpStatus(response.status));
    }

    let image = decode_blocking(decoder, response.body.clone())
        .await
        .inspect_err(|e| error!(url = %url, error = %e, "Unable to read image"))?;

    Ok(LoadedAsset::new(image, response.body))
}

#[async_trait::async_trait]
impl ImageFetchPort for NetworkImageLoader {
    async fn fetch_with_source(&self, url: &ImageUrl) -> FetchResult<(DecodedImage, ImageSource)> {
        let asset = NetworkImageLoader::fetch(self, url).await?;
        Ok((asset.image, ImageSource::Network))
    }
}
