use crate::media::{ExtractionResult, FormatBuckets, FormatOption, MediaReference};
use crate::utils::{format_duration, format_number};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Serialize)]
pub struct VideoView {
    pub id: String,
    pub url: String,
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
    pub view_count: u64,
    pub thumbnail: Option<String>,
}

impl VideoView {
    pub fn new(reference: &MediaReference, info: &ExtractionResult) -> Self {
        Self {
            id: reference.id.clone(),
            url: reference.canonical_url.clone(),
            title: info.title.clone(),
            author: info.author.clone(),
            duration_seconds: info.duration_seconds,
            view_count: info.view_count,
            thumbnail: info.thumbnail.clone(),
        }
    }
}

/// Everything the download page shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageView {
    pub video: Option<VideoView>,
    pub error: Option<String>,
    pub formats: Option<FormatBuckets>,
}

impl PageView {
    pub fn error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

/// Renders a `PageView` as HTML, or as JSON for clients that ask for it.
pub struct PageResponse {
    status: StatusCode,
    json: bool,
    view: PageView,
}

impl PageResponse {
    pub fn new(view: PageView, headers: &HeaderMap) -> Self {
        let json = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        Self {
            status: StatusCode::OK,
            json,
            view,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl IntoResponse for PageResponse {
    fn into_response(self) -> Response {
        if self.json {
            (self.status, Json(self.view)).into_response()
        } else {
            (self.status, Html(render(&self.view))).into_response()
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn query_value(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

fn render_bucket(html: &mut String, heading: &str, video_url: &str, options: &[FormatOption]) {
    if options.is_empty() {
        return;
    }

    let _ = writeln!(html, "<h3>{}</h3>\n<ul class=\"formats\">", escape(heading));
    for option in options {
        let href = format!(
            "/download?url={}&itag={}",
            query_value(video_url),
            query_value(&option.format_id)
        );
        let _ = writeln!(
            html,
            "<li><a href=\"{}\">{} ({}) - {}</a></li>",
            escape(&href),
            escape(&option.label),
            escape(&option.ext),
            escape(&option.size)
        );
    }
    html.push_str("</ul>\n");
}

pub fn render(view: &PageView) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>tubegrab</title>\n</head>\n<body>\n<h1>tubegrab</h1>\n\
         <form method=\"post\" action=\"/download\">\n\
         <input type=\"text\" name=\"url\" placeholder=\"Paste a video link\" required>\n\
         <button type=\"submit\">Get formats</button>\n</form>\n",
    );

    if let Some(error) = &view.error {
        let _ = writeln!(html, "<p class=\"error\">{}</p>", escape(error));
    }

    if let Some(video) = &view.video {
        let _ = writeln!(html, "<section class=\"video\">\n<h2>{}</h2>", escape(&video.title));
        if let Some(thumbnail) = &video.thumbnail {
            let _ = writeln!(
                html,
                "<img src=\"{}\" alt=\"{}\" width=\"320\">",
                escape(thumbnail),
                escape(&video.title)
            );
        }
        let _ = writeln!(
            html,
            "<p>{} &middot; {} &middot; {} views</p>",
            escape(&video.author),
            format_duration(video.duration_seconds),
            format_number(video.view_count)
        );

        if let Some(formats) = &view.formats {
            render_bucket(&mut html, "Video with audio", &video.url, &formats.combined);
            render_bucket(&mut html, "Video only", &video.url, &formats.video);
            render_bucket(&mut html, "Video only (HDR)", &video.url, &formats.video_hdr);
            render_bucket(&mut html, "Audio only", &video.url, &formats.audio);
        }

        let encoded = query_value(&video.url);
        let _ = writeln!(
            html,
            "<p><a href=\"/download/video?url={encoded}\">Best video</a> | \
             <a href=\"/download/audio?url={encoded}\">Best audio</a></p>\n</section>"
        );
    }

    html.push_str("</body>\n</html>\n");
    html
}
