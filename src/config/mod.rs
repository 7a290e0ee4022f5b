use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub extractor: ExtractorConfig,
    pub innertube: InnerTubeConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

/// Settings for the external yt-dlp process.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractorConfig {
    pub ytdlp_path: String,
    pub metadata_timeout_secs: u64,
    /// Upper bound on concurrently running yt-dlp processes
    pub max_processes: usize,
    /// How long a request waits for a free process slot
    pub queue_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            metadata_timeout_secs: 60,
            max_processes: 4,
            queue_timeout_secs: 30,
        }
    }
}

impl ExtractorConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

/// Client identity presented to the player API.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct InnerTubeConfig {
    pub api_base: String,
    pub client_name: String,
    pub client_version: String,
    pub android_sdk_version: Option<u32>,
    pub user_agent: String,
    pub hl: String,
    pub gl: String,
    pub timeout_secs: u64,
}

impl Default for InnerTubeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.youtube.com".to_string(),
            client_name: "ANDROID_VR".to_string(),
            client_version: "1.60.19".to_string(),
            android_sdk_version: Some(32),
            user_agent: "com.google.android.apps.youtube.vr.oculus/1.60.19 (Linux; U; Android 12L; eureka-user Build/SQ3A.220605.009.A1) gzip".to_string(),
            hl: "en".to_string(),
            gl: "US".to_string(),
            timeout_secs: 15,
        }
    }
}

impl InnerTubeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path))
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    /// Applies `PORT`, `HOST`, `YTDLP_PATH` and `LOG_FORMAT` from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value {:?}", port))?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(path) = lookup("YTDLP_PATH") {
            self.extractor.ytdlp_path = path;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format.to_lowercase();
        }
        Ok(())
    }
}
