use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::Serialize;

use crate::cache::cache_key;

/// Something that turns text into audio. The audio comes back in
/// whatever container the vendor produces; it is not wire-ready.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

/// Speech over a JSON HTTP endpoint: POST text and voice, get the audio
/// body back.
pub struct HttpSpeechProvider {
    client: reqwest::Client,
    url: String,
    voice: Option<String>,
}

impl HttpSpeechProvider {
    pub fn new(url: impl Into<String>, voice: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            voice,
        }
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let request = SpeechRequest {
            text,
            voice: self.voice.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("speech request failed")?
            .error_for_status()
            .context("speech service rejected the request")?;

        // Vendor audio can run to megabytes, so take the body as it comes.
        let mut body = response.bytes_stream();
        let mut audio = BytesMut::new();

        while let Some(chunk) = body.next().await {
            audio.extend_from_slice(&chunk.context("speech response interrupted")?);
        }

        Ok(audio.freeze())
    }
}

/// On-disk cache of synthesized speech, keyed by the text itself. The
/// same announcement is only ever synthesized once.
pub struct SpeechCache {
    dir: PathBuf,
    provider: Arc<dyn SpeechProvider>,
}

impl SpeechCache {
    pub async fn new(dir: impl Into<PathBuf>, provider: Arc<dyn SpeechProvider>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("could not create speech dir {}", dir.display()))?;

        Ok(Self { dir, provider })
    }

    /// Path of the spoken audio for `text`, synthesizing it on first use.
    pub async fn get_or_synthesize(&self, text: &str) -> Result<PathBuf> {
        let path = self.dir.join(cache_key(text));

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("speech cache hit for {text:?}");
            return Ok(path);
        }

        debug!("synthesizing {text:?}");
        let audio = self.provider.synthesize(text).await?;

        let tmp = self
            .dir
            .join(format!("{}.{:08x}.part", cache_key(text), rand::random::<u32>()));

        if let Err(e) = tokio::fs::write(&tmp, &audio).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).context("could not write speech artifact");
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).context("could not finalize speech artifact");
        }

        Ok(path)
    }
}
