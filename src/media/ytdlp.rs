use super::{
    extractor::Extractor,
    process::{child_stream, ProcessLimiter},
    stream::ByteStream,
    types::{ExtractError, ExtractionResult, FormatDescriptor, MediaReference},
};
use crate::config::ExtractorConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub struct YtDlpExtractor {
    binary: String,
    metadata_timeout: Duration,
    limiter: ProcessLimiter,
}

/// The subset of `yt-dlp -j` output this service reads.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    format_note: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    abr: Option<f64>,
    tbr: Option<f64>,
}

impl From<YtDlpFormat> for FormatDescriptor {
    fn from(f: YtDlpFormat) -> Self {
        FormatDescriptor {
            format_id: f.format_id,
            ext: f.ext.unwrap_or_else(|| "mp4".to_string()),
            vcodec: f.vcodec,
            acodec: f.acodec,
            height: f.height,
            format_note: f.format_note,
            filesize: f
                .filesize
                .or(f.filesize_approx)
                .filter(|s| *s > 0.0)
                .map(|s| s as u64),
            abr: f.abr,
            tbr: f.tbr,
            url: None,
        }
    }
}

impl YtDlpInfo {
    fn into_result(self, reference: &MediaReference) -> ExtractionResult {
        ExtractionResult {
            id: self.id.unwrap_or_else(|| reference.id.clone()),
            title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            author: self
                .uploader
                .or(self.channel)
                .unwrap_or_else(|| "Unknown".to_string()),
            duration_seconds: self.duration.map(|d| d as u64).unwrap_or(0),
            view_count: self.view_count.unwrap_or(0),
            thumbnail: self.thumbnail,
            formats: self.formats.into_iter().map(FormatDescriptor::from).collect(),
        }
    }
}

impl YtDlpExtractor {
    pub fn new(config: &ExtractorConfig, limiter: ProcessLimiter) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            metadata_timeout: config.metadata_timeout(),
            limiter,
        }
    }

    async fn extract_metadata(&self, url: &str) -> Result<YtDlpInfo, ExtractError> {
        let _permit = self.limiter.acquire().await?;
        debug!("Extracting metadata with yt-dlp for: {}", url);

        let output = tokio::time::timeout(
            self.metadata_timeout,
            Command::new(&self.binary)
                .arg("-j")
                .arg("--no-warnings")
                .arg("--no-playlist")
                .arg(url)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ExtractError::Timeout)?
        .map_err(|e| ExtractError::Process(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Process(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                error.trim()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<ExtractionResult, ExtractError> {
        let info = self.extract_metadata(&reference.canonical_url).await?;
        let result = info.into_result(reference);
        info!(
            "yt-dlp returned {} formats for {}",
            result.formats.len(),
            reference.id
        );
        Ok(result)
    }

    async fn stream_format(
        &self,
        reference: &MediaReference,
        selector: &str,
    ) -> Result<ByteStream, ExtractError> {
        let permit = self.limiter.acquire().await?;
        info!("Streaming {} with yt-dlp format {}", reference.id, selector);

        let child = Command::new(&self.binary)
            .arg("-f")
            .arg(selector)
            .arg("-o")
            .arg("-")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(&reference.canonical_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractError::Process(format!("failed to spawn {}: {}", self.binary, e)))?;

        child_stream("yt-dlp", child, permit)
    }

    async fn is_available(&self) -> bool {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => {
                if output.status.success() {
                    let version = String::from_utf8_lossy(&output.stdout);
                    info!("✅ yt-dlp is available, version: {}", version.trim());
                    true
                } else {
                    warn!("❌ yt-dlp command failed");
                    false
                }
            }
            Err(e) => {
                warn!("❌ yt-dlp not found: {}", e);
                false
            }
        }
    }
}
