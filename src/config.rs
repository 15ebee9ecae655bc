use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::read_to_string;

#[derive(Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// User id of the operator allowed to issue commands.
    pub owner: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Root directory for the track and speech caches.
    pub data_dir: PathBuf,

    /// Transcoder binary, defaults to "ffmpeg" on PATH.
    pub ffmpeg: Option<String>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    /// Synthesis endpoint (JSON in, audio bytes out).
    pub speech_url: String,

    /// Vendor voice name, if the endpoint supports more than one.
    pub voice: Option<String>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct PreviewConfig {
    /// Matches item links and captures the numeric item id.
    #[serde(with = "serde_regex")]
    pub hn_item_re: Regex,

    /// API base override, mainly for tests.
    pub hn_api_url: Option<String>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Where the WAV monitor listens for local playback clients.
    pub listen_addr: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(flatten)]
    pub chat: ChatConfig,

    #[serde(flatten)]
    pub audio: AudioConfig,

    #[serde(flatten)]
    pub speech: Option<SpeechConfig>,

    #[serde(flatten)]
    pub preview: PreviewConfig,

    #[serde(flatten)]
    pub monitor: MonitorConfig,
}

pub async fn load() -> Result<Config> {
    let config = read_to_string("Config.toml")
        .await
        .context("Could not read Config.toml")?;
    let config: Config = toml::from_str(&config).context("Could not parse Config.toml")?;

    Ok(config)
}
