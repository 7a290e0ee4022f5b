use super::extractor::Extractor;
use super::stream::ByteStream;
use super::types::{ExtractError, ExtractionResult, FormatDescriptor, MediaReference};
use crate::config::InnerTubeConfig;
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, info};

/// In-process client for the platform's player API.
///
/// Uses a client identity whose responses carry plain media URLs, so no
/// signature deciphering is attempted. Formats that only come with a
/// `signatureCipher` are dropped.
pub struct InnerTubeExtractor {
    client: reqwest::Client,
    config: InnerTubeConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerRequest<'a> {
    video_id: &'a str,
    context: RequestContext<'a>,
    content_check_ok: bool,
    racy_check_ok: bool,
}

#[derive(Serialize)]
struct RequestContext<'a> {
    client: ClientInfo<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo<'a> {
    client_name: &'a str,
    client_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    android_sdk_version: Option<u32>,
    hl: &'a str,
    gl: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    video_details: Option<VideoDetails>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    video_id: String,
    title: String,
    #[serde(default)]
    author: String,
    length_seconds: Option<String>,
    view_count: Option<String>,
    thumbnail: Option<ThumbnailList>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailList {
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    formats: Vec<PlayerFormat>,
    #[serde(default)]
    adaptive_formats: Vec<PlayerFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerFormat {
    itag: u32,
    url: Option<String>,
    signature_cipher: Option<String>,
    mime_type: String,
    bitrate: Option<u64>,
    average_bitrate: Option<u64>,
    height: Option<u32>,
    content_length: Option<String>,
    quality_label: Option<String>,
}

/// Splits `video/mp4; codecs="avc1.4d401f, mp4a.40.2"` into kind, container and codecs.
fn parse_mime(mime: &str) -> (&str, &str, Vec<&str>) {
    let mut parts = mime.split(';');
    let essence = parts.next().unwrap_or_default().trim();
    let (kind, container) = essence.split_once('/').unwrap_or((essence, ""));

    let codecs = parts
        .filter_map(|p| p.trim().strip_prefix("codecs="))
        .flat_map(|c| c.trim_matches('"').split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    (kind, container, codecs)
}

fn kbps(bits: Option<u64>) -> Option<f64> {
    bits.filter(|b| *b > 0).map(|b| b as f64 / 1000.0)
}

impl From<PlayerFormat> for FormatDescriptor {
    fn from(f: PlayerFormat) -> Self {
        let (kind, container, codecs) = parse_mime(&f.mime_type);
        let is_audio = kind == "audio";

        let (vcodec, acodec) = if is_audio {
            (None, codecs.first().map(|c| c.to_string()))
        } else {
            (
                codecs.first().map(|c| c.to_string()),
                codecs.get(1).map(|c| c.to_string()),
            )
        };

        let ext = match (kind, container) {
            ("audio", "mp4") => "m4a",
            (_, "") => "mp4",
            (_, other) => other,
        };

        FormatDescriptor {
            format_id: f.itag.to_string(),
            ext: ext.to_string(),
            vcodec: Some(vcodec.unwrap_or_else(|| "none".to_string())),
            acodec: Some(acodec.unwrap_or_else(|| "none".to_string())),
            height: f.height,
            format_note: f.quality_label,
            filesize: f.content_length.and_then(|l| l.parse().ok()),
            abr: if is_audio {
                kbps(f.average_bitrate.or(f.bitrate))
            } else {
                None
            },
            tbr: kbps(f.bitrate),
            url: f.url,
        }
    }
}

impl PlayerResponse {
    fn into_result(self) -> Result<ExtractionResult, ExtractError> {
        match self.playability_status {
            Some(status) if status.status == "OK" => {}
            Some(status) => {
                return Err(ExtractError::Unplayable(
                    status.reason.unwrap_or(status.status),
                ))
            }
            None => return Err(ExtractError::Unplayable("missing playability status".into())),
        }

        let details = self
            .video_details
            .ok_or_else(|| ExtractError::Unplayable("missing video details".into()))?;
        let streaming = self.streaming_data.ok_or(ExtractError::NoFormats)?;

        let formats: Vec<FormatDescriptor> = streaming
            .formats
            .into_iter()
            .chain(streaming.adaptive_formats)
            .filter(|f| {
                if f.url.is_none() && f.signature_cipher.is_some() {
                    debug!("Skipping ciphered format {}", f.itag);
                }
                f.url.is_some()
            })
            .map(FormatDescriptor::from)
            .collect();

        if formats.is_empty() {
            return Err(ExtractError::NoFormats);
        }

        Ok(ExtractionResult {
            id: details.video_id,
            title: details.title,
            author: details.author,
            duration_seconds: details
                .length_seconds
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            view_count: details.view_count.and_then(|s| s.parse().ok()).unwrap_or(0),
            thumbnail: details
                .thumbnail
                .and_then(|t| t.thumbnails.into_iter().last())
                .map(|t| t.url),
            formats,
        })
    }
}

fn combined_key(f: &FormatDescriptor) -> (u32, f64) {
    (f.height.unwrap_or(0), f.tbr.unwrap_or(0.0))
}

fn compare_keys(a: (u32, f64), b: (u32, f64)) -> Ordering {
    a.0.cmp(&b.0).then(a.1.total_cmp(&b.1))
}

/// Picks exactly one format by `format_id`, or by one of the quality tokens
/// `highest`, `lowest`, `highestaudio` and `highestvideo`.
pub fn choose_format<'a>(
    formats: &'a [FormatDescriptor],
    selector: &str,
) -> Result<&'a FormatDescriptor, ExtractError> {
    if let Some(exact) = formats.iter().find(|f| f.format_id == selector) {
        return Ok(exact);
    }

    let combined = || formats.iter().filter(|f| f.has_video() && f.has_audio());

    let chosen = match selector {
        "highest" => combined().max_by(|a, b| compare_keys(combined_key(a), combined_key(b))),
        "lowest" => combined().min_by(|a, b| compare_keys(combined_key(a), combined_key(b))),
        "highestaudio" => formats
            .iter()
            .filter(|f| f.has_audio() && !f.has_video())
            .max_by(|a, b| {
                a.bitrate()
                    .unwrap_or(0.0)
                    .total_cmp(&b.bitrate().unwrap_or(0.0))
            }),
        "highestvideo" => formats
            .iter()
            .filter(|f| f.has_video() && !f.has_audio())
            .max_by(|a, b| compare_keys(combined_key(a), combined_key(b))),
        _ => None,
    };

    chosen.ok_or_else(|| ExtractError::FormatUnavailable(selector.to_string()))
}

impl InnerTubeExtractor {
    pub fn new(config: InnerTubeConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, config })
    }

    async fn player(&self, video_id: &str) -> Result<PlayerResponse, ExtractError> {
        let request = PlayerRequest {
            video_id,
            context: RequestContext {
                client: ClientInfo {
                    client_name: &self.config.client_name,
                    client_version: &self.config.client_version,
                    android_sdk_version: self.config.android_sdk_version,
                    hl: &self.config.hl,
                    gl: &self.config.gl,
                },
            },
            content_check_ok: true,
            racy_check_ok: true,
        };

        let url = format!(
            "{}/youtubei/v1/player?prettyPrint=false",
            self.config.api_base.trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .timeout(self.config.timeout())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn open(&self, media_url: &str) -> Result<ByteStream, ExtractError> {
        let response = self.client.get(media_url).send().await?;

        if !response.status().is_success() {
            return Err(ExtractError::Stream(format!(
                "media request returned HTTP {}",
                response.status()
            )));
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| ExtractError::Stream(e.to_string()))
            .boxed())
    }
}

#[async_trait]
impl Extractor for InnerTubeExtractor {
    fn name(&self) -> &'static str {
        "innertube"
    }

    async fn fetch_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<ExtractionResult, ExtractError> {
        debug!("Requesting player response for {}", reference.id);
        let result = self.player(&reference.id).await?.into_result()?;
        info!(
            "Player API returned {} streamable formats for {}",
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
        let info = self.fetch_metadata(reference).await?;
        let format = choose_format(&info.formats, selector)?;
        self.stream_descriptor(reference, format).await
    }

    async fn stream_descriptor(
        &self,
        reference: &MediaReference,
        format: &FormatDescriptor,
    ) -> Result<ByteStream, ExtractError> {
        let url = format
            .url
            .as_deref()
            .ok_or_else(|| ExtractError::FormatUnavailable(format.format_id.clone()))?;
        info!("Streaming {} format {} in-process", reference.id, format.format_id);
        self.open(url).await
    }
}
