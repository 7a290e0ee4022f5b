use super::stream::ByteStream;
use super::types::{ExtractError, ExtractionResult, FormatDescriptor, MediaReference};
use async_trait::async_trait;

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable name of the extractor
    fn name(&self) -> &'static str;

    /// Fetch title, author and the full format list for a video
    async fn fetch_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<ExtractionResult, ExtractError>;

    /// Open a byte stream for the format matching `selector`
    async fn stream_format(
        &self,
        reference: &MediaReference,
        selector: &str,
    ) -> Result<ByteStream, ExtractError>;

    /// Open a byte stream for a format taken from this extractor's own metadata.
    /// Extractors that already know the media URL can skip a second lookup.
    async fn stream_descriptor(
        &self,
        reference: &MediaReference,
        format: &FormatDescriptor,
    ) -> Result<ByteStream, ExtractError> {
        self.stream_format(reference, &format.format_id).await
    }

    /// Test if this extractor is usable on the system
    async fn is_available(&self) -> bool {
        true
    }
}
