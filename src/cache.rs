use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::transcode::Transcode;

/// Hex digest used as the on-disk name for a cache key.
pub fn cache_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Content-addressed store of transcoded artifacts. Keys are the stable
/// origin of a track (the page URL the user pasted), never the transient
/// media URL behind it, so repeat requests land on the same artifact.
pub struct SourceCache {
    dir: PathBuf,
    transcoder: Arc<dyn Transcode>,
}

impl SourceCache {
    pub async fn new(dir: impl Into<PathBuf>, transcoder: Arc<dyn Transcode>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("could not create cache dir {}", dir.display()))?;

        Ok(Self { dir, transcoder })
    }

    /// Where the artifact for `key` lives, whether or not it exists yet.
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.dir.join(cache_key(key))
    }

    /// Return the artifact for `key`, transcoding `locator` to produce it
    /// on a miss. An artifact only appears at its final path complete; a
    /// failed run leaves nothing behind, so a later call starts fresh.
    pub async fn get_or_create(&self, key: &str, locator: &str) -> Result<PathBuf> {
        let path = self.artifact_path(key);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("cache hit for {key}");
            return Ok(path);
        }

        info!("cache miss for {key}, transcoding");

        let tmp = self
            .dir
            .join(format!("{}.{:08x}.part", cache_key(key), rand::random::<u32>()));

        if let Err(e) = self.transcoder.to_file(locator, &tmp).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("transcode for {key} failed"));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("could not finalize artifact for {key}"));
        }

        Ok(path)
    }
}
