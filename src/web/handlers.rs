use super::error::WebError;
use super::page::{PageResponse, PageView, VideoView};
use super::AppState;
use crate::media::{classify, normalize, ByteStream, ExtractError};
use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use tracing::{error, info};

const INVALID_URL_MESSAGE: &str = "Invalid video URL, please enter a valid link.";
const EXTRACTION_FAILED_MESSAGE: &str =
    "Failed to process the video. Make sure the URL is correct.";
const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";

const DEFAULT_VIDEO_SELECTOR: &str = "96/95/93/18/best[ext=mp4]/best";
const DEFAULT_AUDIO_SELECTOR: &str = "bestaudio[ext=m4a]/bestaudio";

#[derive(Debug, Deserialize)]
pub struct ExtractForm {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    url: Option<String>,
    itag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DirectQuery {
    url: Option<String>,
    fmt: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn content_type(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("m4a") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("opus") | Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// `filename` with an ASCII fallback plus the RFC 5987 `filename*` form.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

/// Builds a streaming attachment response. Headers are fixed before the first
/// body byte, so failures past this point can only be logged.
fn attachment(filename: &str, body: ByteStream) -> Response {
    let disposition = HeaderValue::from_str(&content_disposition(filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"download.mp4\""));

    let name = filename.to_string();
    let body = body.inspect_err(move |e| error!("Download of {} aborted: {}", name, e));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type(filename))),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

pub async fn index(headers: HeaderMap) -> PageResponse {
    PageResponse::new(PageView::default(), &headers)
}

pub async fn extract(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ExtractForm>,
) -> PageResponse {
    info!("POST /download - received URL: {}", form.url);

    let Some(reference) = normalize(&form.url) else {
        return PageResponse::new(PageView::error(INVALID_URL_MESSAGE), &headers);
    };

    let view = match state.media.fetch_metadata(&reference).await {
        Ok(info) => {
            let formats = classify(&info.formats);
            info!(
                "Classified formats for {}: combined={}, video={}, video_hdr={}, audio={}",
                reference.id,
                formats.combined.len(),
                formats.video.len(),
                formats.video_hdr.len(),
                formats.audio.len()
            );
            PageView {
                video: Some(VideoView::new(&reference, &info)),
                error: None,
                formats: Some(formats),
            }
        }
        Err(e) => {
            error!("All extractors failed for {}: {}", reference.id, e);
            PageView::error(EXTRACTION_FAILED_MESSAGE)
        }
    };

    PageResponse::new(view, &headers)
}

pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, WebError> {
    let reference = query.url.as_deref().and_then(normalize);
    let (Some(reference), Some(itag)) = (reference, non_empty(&query.itag)) else {
        return Err(WebError::Validation("Invalid URL or format"));
    };

    info!("GET /download - {} itag {}", reference.canonical_url, itag);

    let download = state
        .media
        .download(&reference, itag)
        .await
        .map_err(|e| match e {
            ExtractError::FormatUnavailable(_) => WebError::FormatUnavailable,
            e => {
                error!("Download failed for {}: {}", reference.id, e);
                WebError::Download("Failed to download video")
            }
        })?;

    Ok(attachment(&download.filename, download.body))
}

async fn direct(
    state: &AppState,
    query: &DirectQuery,
    default_selector: &str,
    filename: &str,
    failure: &'static str,
) -> Result<Response, WebError> {
    let Some(reference) = query.url.as_deref().and_then(normalize) else {
        return Err(WebError::Validation("Invalid URL"));
    };

    let selector = non_empty(&query.fmt).unwrap_or(default_selector);
    info!("Streaming {} with format: {}", reference.id, selector);

    let body = state
        .media
        .stream_direct(&reference, selector)
        .await
        .map_err(|e| {
            error!("Direct download failed for {}: {}", reference.id, e);
            WebError::Download(failure)
        })?;

    Ok(attachment(filename, body))
}

pub async fn download_video(
    State(state): State<AppState>,
    Query(query): Query<DirectQuery>,
) -> Result<Response, WebError> {
    direct(
        &state,
        &query,
        DEFAULT_VIDEO_SELECTOR,
        "video.mp4",
        "Failed to download video",
    )
    .await
}

pub async fn download_audio(
    State(state): State<AppState>,
    Query(query): Query<DirectQuery>,
) -> Result<Response, WebError> {
    direct(
        &state,
        &query,
        DEFAULT_AUDIO_SELECTOR,
        "audio.m4a",
        "Failed to download audio",
    )
    .await
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "ytdlp_available": state.ytdlp_available,
        "process_slots": state.media.available_process_slots(),
    }))
}

pub async fn not_found(headers: HeaderMap) -> PageResponse {
    PageResponse::new(PageView::error("Page not found."), &headers)
        .with_status(StatusCode::NOT_FOUND)
}

/// Last-resort handler for panics inside request handling.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Request handler panicked: {}", detail);

    PageResponse::new(PageView::error(INTERNAL_ERROR_MESSAGE), &HeaderMap::new())
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a.mp4"), "video/mp4");
        assert_eq!(content_type("audio.m4a"), "audio/mp4");
        assert_eq!(content_type("clip.webm"), "video/webm");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(&Some(" 18 ".to_string())), Some("18"));
        assert_eq!(non_empty(&Some("   ".to_string())), None);
        assert_eq!(non_empty(&None), None);
    }

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("audio.m4a"),
            "attachment; filename=\"audio.m4a\"; filename*=UTF-8''audio.m4a"
        );
    }

    #[test]
    fn test_panic_response_is_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_attachment_headers() {
        let body: ByteStream = Box::pin(futures_util::stream::empty());
        let response = attachment("Déjà vu.mp4", body);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"D_j_ vu.mp4\"; filename*=UTF-8''D%C3%A9j%C3%A0%20vu.mp4"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }
}
