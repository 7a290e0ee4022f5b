use super::types::FormatDescriptor;
use crate::utils::format_megabytes;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;

/// Maximum number of options shown per bucket.
pub const MAX_BUCKET_LEN: usize = 10;

const RESOLUTION_RANK: [&str; 8] = [
    "2160p", "1440p", "1080p", "720p", "480p", "360p", "240p", "144p",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatOption {
    pub format_id: String,
    pub label: String,
    pub ext: String,
    pub size: String,
    pub filesize: Option<u64>,
    #[serde(skip)]
    bitrate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormatBuckets {
    pub combined: Vec<FormatOption>,
    pub video: Vec<FormatOption>,
    pub video_hdr: Vec<FormatOption>,
    pub audio: Vec<FormatOption>,
}

impl FormatBuckets {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
            && self.video.is_empty()
            && self.video_hdr.is_empty()
            && self.audio.is_empty()
    }
}

/// Bucket that drops entries whose label was already seen.
#[derive(Default)]
struct Bucket {
    seen: HashSet<String>,
    options: Vec<FormatOption>,
}

impl Bucket {
    fn insert(&mut self, option: FormatOption) {
        if self.seen.insert(option.label.clone()) {
            self.options.push(option);
        }
    }

    fn by_resolution(mut self) -> Vec<FormatOption> {
        self.options.sort_by_key(|o| Reverse(resolution_rank(&o.label)));
        self.options.truncate(MAX_BUCKET_LEN);
        self.options
    }

    fn by_bitrate(mut self) -> Vec<FormatOption> {
        self.options.sort_by(|a, b| b.bitrate.total_cmp(&a.bitrate));
        self.options.truncate(MAX_BUCKET_LEN);
        self.options
    }
}

/// Rank of the first resolution token contained in `label`, 0 when unranked.
pub fn resolution_rank(label: &str) -> usize {
    RESOLUTION_RANK
        .iter()
        .position(|token| label.contains(token))
        .map_or(0, |i| RESOLUTION_RANK.len() - i)
}

fn video_label(f: &FormatDescriptor) -> String {
    match (&f.format_note, f.height) {
        (Some(note), _) if !note.trim().is_empty() => note.trim().to_string(),
        (_, Some(height)) if height > 0 => format!("{height}p"),
        _ => f.format_id.clone(),
    }
}

fn audio_label(f: &FormatDescriptor) -> String {
    match f.bitrate() {
        Some(kbps) => format!("{} kbps", kbps.round() as u64),
        None => video_label(f),
    }
}

fn option(f: &FormatDescriptor, label: String) -> FormatOption {
    FormatOption {
        format_id: f.format_id.clone(),
        label,
        ext: if f.ext.is_empty() {
            "mp4".to_string()
        } else {
            f.ext.clone()
        },
        size: format_megabytes(f.filesize),
        filesize: f.filesize,
        bitrate: f.bitrate().unwrap_or(0.0),
    }
}

/// Partitions raw formats into deduplicated, ranked and capped UI buckets.
pub fn classify(formats: &[FormatDescriptor]) -> FormatBuckets {
    let mut combined = Bucket::default();
    let mut video = Bucket::default();
    let mut video_hdr = Bucket::default();
    let mut audio = Bucket::default();

    for f in formats {
        match (f.has_video(), f.has_audio()) {
            (true, true) => combined.insert(option(f, video_label(f))),
            (true, false) => {
                let label = video_label(f);
                if label.contains("HDR") {
                    video_hdr.insert(option(f, label));
                } else {
                    video.insert(option(f, label));
                }
            }
            (false, true) => audio.insert(option(f, audio_label(f))),
            (false, false) => {}
        }
    }

    FormatBuckets {
        combined: combined.by_resolution(),
        video: video.by_resolution(),
        video_hdr: video_hdr.by_resolution(),
        audio: audio.by_bitrate(),
    }
}
