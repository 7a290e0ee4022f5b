mod extractor;
mod formats;
mod innertube;
mod link;
mod process;
mod stream;
mod types;
mod ytdlp;

pub use extractor::Extractor;
pub use formats::{classify, FormatBuckets, FormatOption};
pub use innertube::{choose_format, InnerTubeExtractor};
pub use link::normalize;
pub use process::ProcessLimiter;
pub use stream::ByteStream;
pub use types::{ExtractError, ExtractionResult, MediaReference};
pub use ytdlp::YtDlpExtractor;

use crate::config::Config;
use crate::utils::sanitize_filename;
use anyhow::{Context, Result};
use futures_util::FutureExt;
use std::sync::Arc;
use stream::{with_fallback, StreamFuture};
use tracing::{info, warn};

/// A stream ready to be sent as an attachment.
pub struct Download {
    pub filename: String,
    pub body: ByteStream,
}

fn ext_or_default(ext: &str) -> &str {
    if ext.is_empty() {
        "mp4"
    } else {
        ext
    }
}

/// Runs the in-process extractor first and falls back to yt-dlp.
pub struct MediaService {
    primary: Arc<dyn Extractor>,
    fallback: Arc<dyn Extractor>,
    limiter: Option<ProcessLimiter>,
}

impl MediaService {
    #[cfg(test)]
    pub fn new(primary: Arc<dyn Extractor>, fallback: Arc<dyn Extractor>) -> Self {
        Self {
            primary,
            fallback,
            limiter: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        info!("Media service initialized - using the player API with yt-dlp as fallback");

        let limiter = ProcessLimiter::new(
            config.extractor.max_processes,
            config.extractor.queue_timeout(),
        );
        let primary = InnerTubeExtractor::new(config.innertube.clone())
            .context("Failed to create player API client")?;
        let fallback = YtDlpExtractor::new(&config.extractor, limiter.clone());

        Ok(Self {
            primary: Arc::new(primary),
            fallback: Arc::new(fallback),
            limiter: Some(limiter),
        })
    }

    /// Free external process slots, when a limiter is configured.
    pub fn available_process_slots(&self) -> Option<usize> {
        self.limiter.as_ref().map(ProcessLimiter::available)
    }

    pub async fn fetch_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<ExtractionResult, ExtractError> {
        info!("Fetching metadata for {}", reference.canonical_url);

        let mut last_error = None;
        for extractor in [&self.primary, &self.fallback] {
            match extractor.fetch_metadata(reference).await {
                Ok(result) => {
                    info!("Successfully extracted with {}", extractor.name());
                    return Ok(result);
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", extractor.name(), reference.id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ExtractError::NoFormats))
    }

    fn deferred_fallback(&self, reference: &MediaReference, selector: &str) -> StreamFuture {
        let fallback = Arc::clone(&self.fallback);
        let reference = reference.clone();
        let selector = selector.to_string();
        async move { fallback.stream_format(&reference, &selector).await }.boxed()
    }

    /// Opens the download for `selector`, named after the video title.
    ///
    /// Streams in-process when possible. A primary stream that breaks
    /// mid-transfer is resumed once with yt-dlp. When the primary extractor
    /// cannot resolve metadata or does not list the format, yt-dlp serves the
    /// whole download. `FormatUnavailable` means neither extractor lists it.
    pub async fn download(
        &self,
        reference: &MediaReference,
        selector: &str,
    ) -> Result<Download, ExtractError> {
        let info = match self.primary.fetch_metadata(reference).await {
            Ok(info) => info,
            Err(e) => {
                warn!(
                    "{} failed for {}: {}, streaming with {}",
                    self.primary.name(),
                    reference.id,
                    e,
                    self.fallback.name()
                );
                return self.fallback_download(reference, selector).await;
            }
        };

        let format = match choose_format(&info.formats, selector) {
            Ok(format) => format,
            Err(e) => {
                warn!(
                    "{} cannot serve {}: {}, trying {}",
                    self.primary.name(),
                    reference.id,
                    e,
                    self.fallback.name()
                );
                return self.fallback_download(reference, selector).await;
            }
        };
        let filename = format!(
            "{}.{}",
            sanitize_filename(&info.title),
            ext_or_default(&format.ext)
        );

        let body = match self.primary.stream_descriptor(reference, format).await {
            Ok(stream) => with_fallback(stream, self.deferred_fallback(reference, selector)),
            Err(e) => {
                warn!(
                    "{} could not open stream for {}: {}, streaming with {}",
                    self.primary.name(),
                    reference.id,
                    e,
                    self.fallback.name()
                );
                self.fallback.stream_format(reference, selector).await?
            }
        };

        Ok(Download { filename, body })
    }

    async fn fallback_download(
        &self,
        reference: &MediaReference,
        selector: &str,
    ) -> Result<Download, ExtractError> {
        let filename = match self.fallback.fetch_metadata(reference).await {
            Ok(info) => {
                let format = info.find_format(selector);
                if format.is_none() && !info.formats.is_empty() {
                    return Err(ExtractError::FormatUnavailable(selector.to_string()));
                }
                let ext = format.map_or("mp4", |f| ext_or_default(&f.ext));
                format!("{}.{}", sanitize_filename(&info.title), ext)
            }
            Err(e) => {
                warn!("Could not resolve title for {}: {}", reference.id, e);
                "download.mp4".to_string()
            }
        };

        let body = self.fallback.stream_format(reference, selector).await?;
        Ok(Download { filename, body })
    }

    /// Streams straight from yt-dlp with a caller-provided selector.
    pub async fn stream_direct(
        &self,
        reference: &MediaReference,
        selector: &str,
    ) -> Result<ByteStream, ExtractError> {
        self.fallback.stream_format(reference, selector).await
    }

    pub async fn test_setup(&self) -> Result<()> {
        info!("Testing media extractor setup...");

        if self.fallback.is_available().await {
            info!("✅ {} fallback is available", self.fallback.name());
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "{} is not available, only in-process extraction will work. Please install yt-dlp.",
                self.fallback.name()
            ))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{sample_result, FakeExtractor};
    use super::types::FormatDescriptor;
    use super::*;
    use futures_util::StreamExt;

    fn reference() -> MediaReference {
        normalize("https://youtu.be/dQw4w9WgXcQ").unwrap()
    }

    fn service(
        primary: FakeExtractor,
        fallback: FakeExtractor,
    ) -> (MediaService, Arc<FakeExtractor>, Arc<FakeExtractor>) {
        let primary = Arc::new(primary);
        let fallback = Arc::new(fallback);
        let service = MediaService::new(primary.clone(), fallback.clone());
        (service, primary, fallback)
    }

    async fn body_of(download: Download) -> Vec<u8> {
        let mut data = Vec::new();
        let mut body = download.body;
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk.unwrap());
        }
        data
    }

    #[tokio::test]
    async fn test_metadata_prefers_primary() {
        let (service, _, fallback) = service(
            FakeExtractor::default().with_metadata(sample_result()),
            FakeExtractor::default().with_metadata(sample_result()),
        );
        assert!(service.fetch_metadata(&reference()).await.is_ok());
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_metadata_falls_back() {
        let (service, primary, fallback) = service(
            FakeExtractor::failing(),
            FakeExtractor::default().with_metadata(sample_result()),
        );
        let result = service.fetch_metadata(&reference()).await.unwrap();
        assert_eq!(result.author, "Rick Astley");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_metadata_both_fail() {
        let (service, _, _) = service(FakeExtractor::failing(), FakeExtractor::failing());
        assert!(service.fetch_metadata(&reference()).await.is_err());
    }

    #[tokio::test]
    async fn test_download_streams_primary() {
        let (service, _, fallback) = service(
            FakeExtractor::default()
                .with_metadata(sample_result())
                .with_chunks(vec![Ok("abc")]),
            FakeExtractor::default().with_chunks(vec![Ok("fallback")]),
        );
        let download = service.download(&reference(), "18").await.unwrap();
        assert_eq!(download.filename, "Never Gonna Give You Up.mp4");
        assert_eq!(body_of(download).await, b"abc");
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_download_recovers_mid_stream() {
        let (service, _, fallback) = service(
            FakeExtractor::default()
                .with_metadata(sample_result())
                .with_chunks(vec![Ok("ab"), Err("connection reset")]),
            FakeExtractor::default().with_chunks(vec![Ok("abxyz")]),
        );
        let download = service.download(&reference(), "140").await.unwrap();
        assert_eq!(download.filename, "Never Gonna Give You Up.m4a");
        assert_eq!(body_of(download).await, b"abxyz");
        assert_eq!(*fallback.stream_calls.lock().unwrap(), vec!["140".to_string()]);
    }

    #[tokio::test]
    async fn test_download_unknown_format() {
        let (service, _, fallback) = service(
            FakeExtractor::default()
                .with_metadata(sample_result())
                .with_chunks(vec![Ok("abc")]),
            FakeExtractor::default()
                .with_metadata(sample_result())
                .with_chunks(vec![Ok("xyz")]),
        );
        let result = service.download(&reference(), "999").await;
        assert!(matches!(result, Err(ExtractError::FormatUnavailable(_))));
        assert!(fallback.stream_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_format_only_known_to_fallback() {
        let mut info = sample_result();
        info.formats.push(FormatDescriptor {
            format_id: "251".to_string(),
            ext: "webm".to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("opus".to_string()),
            ..Default::default()
        });
        let (service, primary, fallback) = service(
            FakeExtractor::default()
                .with_metadata(sample_result())
                .with_chunks(vec![Ok("abc")]),
            FakeExtractor::default()
                .with_metadata(info)
                .with_chunks(vec![Ok("opus")]),
        );

        let download = service.download(&reference(), "251").await.unwrap();
        assert_eq!(download.filename, "Never Gonna Give You Up.webm");
        assert_eq!(body_of(download).await, b"opus");
        assert!(primary.stream_calls.lock().unwrap().is_empty());
        assert_eq!(*fallback.stream_calls.lock().unwrap(), vec!["251".to_string()]);
    }

    #[tokio::test]
    async fn test_download_without_primary_metadata() {
        let (service, _, fallback) = service(
            FakeExtractor::failing(),
            FakeExtractor::default()
                .with_metadata(sample_result())
                .with_chunks(vec![Ok("xyz")]),
        );
        let download = service.download(&reference(), "140").await.unwrap();
        assert_eq!(download.filename, "Never Gonna Give You Up.m4a");
        assert_eq!(body_of(download).await, b"xyz");
        assert_eq!(fallback.calls(), 2);
    }

    #[tokio::test]
    async fn test_download_fallback_without_title() {
        let (service, _, _) = service(
            FakeExtractor::failing(),
            FakeExtractor::default().with_chunks(vec![Ok("xyz")]),
        );
        let download = service.download(&reference(), "18").await.unwrap();
        assert_eq!(download.filename, "download.mp4");
    }

    #[tokio::test]
    async fn test_download_total_failure() {
        let (service, _, _) = service(FakeExtractor::failing(), FakeExtractor::failing());
        let result = service.download(&reference(), "18").await;
        assert!(matches!(result, Err(ExtractError::Process(_))));
    }

    #[tokio::test]
    async fn test_setup_reports_fallback() {
        let (service, _, _) = service(FakeExtractor::failing(), FakeExtractor::failing());
        assert!(service.test_setup().await.is_ok());
        assert_eq!(service.available_process_slots(), None);
    }
}
