use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A validated link to a single video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaReference {
    pub id: String,
    pub canonical_url: String,
}

impl MediaReference {
    pub(crate) fn from_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            canonical_url: format!("https://www.youtube.com/watch?v={id}"),
        }
    }
}

/// One downloadable variant, in the shape both extractors map into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub ext: String,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub format_note: Option<String>,
    pub filesize: Option<u64>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    /// Total bitrate in kbps
    pub tbr: Option<f64>,
    /// Direct media URL, only known to the in-process extractor
    #[serde(skip)]
    pub url: Option<String>,
}

fn codec_present(codec: &Option<String>) -> bool {
    codec
        .as_deref()
        .is_some_and(|c| !c.is_empty() && c != "none")
}

impl FormatDescriptor {
    pub fn has_video(&self) -> bool {
        codec_present(&self.vcodec)
    }

    pub fn has_audio(&self) -> bool {
        codec_present(&self.acodec)
    }

    pub fn bitrate(&self) -> Option<f64> {
        let positive = |b: &f64| *b > 0.0;
        self.abr.filter(positive).or(self.tbr.filter(positive))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub id: String,
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
    pub view_count: u64,
    pub thumbnail: Option<String>,
    pub formats: Vec<FormatDescriptor>,
}

impl ExtractionResult {
    pub fn find_format(&self, format_id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("video is not playable: {0}")]
    Unplayable(String),

    #[error("no streamable formats returned")]
    NoFormats,

    #[error("format unavailable: {0}")]
    FormatUnavailable(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extraction process failed: {0}")]
    Process(String),

    #[error("failed to parse extractor output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("extraction timed out")]
    Timeout,

    #[error("too many extraction processes running")]
    Busy,

    #[error("stream failed: {0}")]
    Stream(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_presence() {
        let f = FormatDescriptor {
            vcodec: Some("none".into()),
            acodec: Some("aac".into()),
            ..Default::default()
        };
        assert!(!f.has_video());
        assert!(f.has_audio());

        let f = FormatDescriptor {
            vcodec: Some(String::new()),
            acodec: None,
            ..Default::default()
        };
        assert!(!f.has_video());
        assert!(!f.has_audio());
    }

    #[test]
    fn test_bitrate_prefers_abr() {
        let f = FormatDescriptor {
            abr: Some(129.5),
            tbr: Some(140.0),
            ..Default::default()
        };
        assert_eq!(f.bitrate(), Some(129.5));

        let f = FormatDescriptor {
            abr: Some(0.0),
            tbr: None,
            ..Default::default()
        };
        assert_eq!(f.bitrate(), None);
    }

    #[test]
    fn test_canonical_url() {
        let r = MediaReference::from_id("dQw4w9WgXcQ");
        assert_eq!(r.canonical_url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }
}
