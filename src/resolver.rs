use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use youtube_dl::{download_yt_dlp, YoutubeDl};

const YT_DLP_PATH: &str = "./yt-dlp";

/// Resolved metadata for a playable page URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackInfo {
    /// The URL as the user pasted it. Stable, used as the cache key.
    pub origin: String,
    /// Direct media URL the extractor found. These expire, so nothing is
    /// ever keyed on them.
    pub media_url: String,
    pub title: String,
}

/// Page URL to playable-track metadata.
#[async_trait]
pub trait ResolveTrack: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<TrackInfo>;
}

/// yt-dlp backed resolver.
pub struct MediaResolver {
    binary: PathBuf,
}

impl MediaResolver {
    /// Fetches the extractor binary on first run.
    pub async fn init() -> Result<Self> {
        let exists = tokio::task::spawn_blocking(|| Path::new(YT_DLP_PATH).exists()).await?;

        if !exists {
            info!("downloading yt-dlp binary");
            download_yt_dlp(".").await?;
        }

        Ok(Self {
            binary: PathBuf::from(YT_DLP_PATH),
        })
    }
}

#[async_trait]
impl ResolveTrack for MediaResolver {
    async fn resolve(&self, url: &str) -> Result<TrackInfo> {
        let output = YoutubeDl::new(url)
            .youtube_dl_path(&self.binary)
            .format("bestaudio")
            .extra_arg("--no-playlist")
            .socket_timeout("15")
            .run_async()
            .await
            .context("media extractor failed")?;

        let video = output
            .into_single_video()
            .context("no playable media at that URL")?;

        let title = video.title.context("no title in extractor output")?;
        let media_url = video.url.context("no media URL in extractor output")?;

        Ok(TrackInfo {
            origin: url.to_string(),
            media_url,
            title,
        })
    }
}
