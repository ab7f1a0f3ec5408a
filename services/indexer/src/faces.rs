//! Pre-flight checks for custom face enrollment.
//!
//! The indexer rejects whole enrollment batches for a single bad picture, and
//! only after it has downloaded them. [`FacePreValidator`] runs the same rules
//! locally first: batch size, https only, and picture dimensions.

use crate::config::HttpConfig;
use crate::error::{IndexerError, Result};
use crate::gateway::{classify_failure, reason_phrase, redact};
use async_trait::async_trait;
use reqwest::Url;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Most pictures accepted in one enrollment request
pub const MAX_FACES_PER_REQUEST: usize = 20;
/// Smallest accepted width and height, in pixels
pub const MIN_FACE_DIMENSION: u32 = 36;
/// Largest accepted width and height, in pixels
pub const MAX_FACE_DIMENSION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both axes within the accepted range
    pub fn is_acceptable(&self) -> bool {
        let range = MIN_FACE_DIMENSION..=MAX_FACE_DIMENSION;
        range.contains(&self.width) && range.contains(&self.height)
    }
}

/// Looks up the pixel dimensions of a remote picture
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn dimensions(&self, url: &Url, cancel: &CancellationToken) -> Result<ImageDimensions>;
}

#[async_trait]
impl<P: ImageProbe + ?Sized> ImageProbe for Arc<P> {
    async fn dimensions(&self, url: &Url, cancel: &CancellationToken) -> Result<ImageDimensions> {
        (**self).dimensions(url, cancel).await
    }
}

/// Downloads pictures with a plain client. The account subscription key is
/// never sent to picture hosts.
pub struct RemoteImageProbe {
    http: reqwest::Client,
}

impl RemoteImageProbe {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|source| IndexerError::Transport {
                endpoint: "image probe".to_string(),
                source,
            })?;

        Ok(Self { http })
    }

    async fn download(&self, url: &Url, endpoint: &str) -> Result<Vec<u8>> {
        let transport = |source| IndexerError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = self.http.get(url.clone()).send().await.map_err(transport)?;
        let status = response.status();
        let reason = reason_phrase(&response);
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport)?;

        if !status.is_success() {
            return Err(classify_failure(
                endpoint,
                status,
                reason.as_deref(),
                &headers,
                &String::from_utf8_lossy(&body),
            ));
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl ImageProbe for RemoteImageProbe {
    async fn dimensions(&self, url: &Url, cancel: &CancellationToken) -> Result<ImageDimensions> {
        let endpoint = redact(url);

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IndexerError::Cancelled),
            body = self.download(url, &endpoint) => body?,
        };

        decode_dimensions(&body)
            .map_err(|e| IndexerError::Validation(format!("{} is not a readable picture: {}", url, e)))
    }
}

/// Read the dimensions from an encoded picture's header
pub fn decode_dimensions(bytes: &[u8]) -> std::result::Result<ImageDimensions, image::ImageError> {
    let (width, height) = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(ImageDimensions::new(width, height))
}

/// Checks a batch of picture urls before enrollment
pub struct FacePreValidator<P> {
    probe: P,
}

impl<P: ImageProbe> FacePreValidator<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Fail on the first rule the batch breaks. Size and scheme are checked
    /// before any picture is downloaded.
    #[instrument(skip(self, urls, cancel), fields(count = urls.len()))]
    pub async fn validate_batch(&self, urls: &[Url], cancel: &CancellationToken) -> Result<()> {
        if urls.len() > MAX_FACES_PER_REQUEST {
            return Err(IndexerError::Validation(format!(
                "Maximum of {} items allowed per request, got {}",
                MAX_FACES_PER_REQUEST,
                urls.len()
            )));
        }

        if let Some(url) = urls.iter().find(|u| !u.scheme().eq_ignore_ascii_case("https")) {
            return Err(IndexerError::Validation(format!(
                "Only HTTPS urls are allowed: {}",
                redact(url)
            )));
        }

        for url in urls {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }

            let dimensions = self.probe.dimensions(url, cancel).await?;
            if !dimensions.is_acceptable() {
                warn!(
                    url = %redact(url),
                    width = dimensions.width,
                    height = dimensions.height,
                    "Rejecting face picture"
                );
                return Err(IndexerError::Validation(format!(
                    "Supported picture size is from {min}x{min} to {max}x{max} pixels. Invalid image {} ({}x{})",
                    redact(url),
                    dimensions.width,
                    dimensions.height,
                    min = MIN_FACE_DIMENSION,
                    max = MAX_FACE_DIMENSION,
                )));
            }
            debug!(url = %redact(url), width = dimensions.width, height = dimensions.height, "Face picture accepted");
        }

        Ok(())
    }
}
