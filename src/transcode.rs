use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::constants::{CHANNELS, SAMPLE_RATE};
use crate::source::TrackSource;

/// Read buffer on streamed transcoder output, a few frames deep.
const STREAM_BUF_BYTES: usize = 16 * 1024;

/// Conversion of arbitrary media into the wire PCM format.
#[async_trait]
pub trait Transcode: Send + Sync {
    /// Convert `input` into raw wire-format audio at `output`, waiting
    /// for the run to finish.
    async fn to_file(&self, input: &str, output: &Path) -> Result<()>;

    /// Spawn a transcode of `input` and stream its output as a source,
    /// for playback that keeps no artifact.
    async fn stream(&self, input: &str) -> Result<TrackSource>;
}

/// ffmpeg with the wire format baked into its argument list. `input` can
/// be anything ffmpeg accepts, a local path or a URL.
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, input: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-i")
            .arg(input)
            .arg("-f")
            .arg("s16le")
            .arg("-ar")
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(CHANNELS.to_string());
        cmd
    }
}

#[async_trait]
impl Transcode for FfmpegTranscoder {
    async fn to_file(&self, input: &str, output: &Path) -> Result<()> {
        let file = tokio::fs::File::create(output)
            .await
            .with_context(|| format!("could not create {}", output.display()))?
            .into_std()
            .await;

        let run = self
            .command(input)
            .arg("pipe:1")
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("could not spawn {}", self.binary))?
            .wait_with_output()
            .await
            .context("transcoder did not finish")?;

        if !run.status.success() {
            let stderr = String::from_utf8_lossy(&run.stderr);
            bail!("transcoder exited with {}: {}", run.status, tail(&stderr));
        }

        Ok(())
    }

    /// The child dies with the source.
    async fn stream(&self, input: &str) -> Result<TrackSource> {
        let mut child = self
            .command(input)
            .arg("pipe:1")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("could not spawn {}", self.binary))?;

        let stdout = child.stdout.take().context("no transcoder stdout")?;
        let stderr = child.stderr.take().context("no transcoder stderr")?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("transcoder: {line}");
            }
        });

        let reader = BufReader::with_capacity(STREAM_BUF_BYTES, stdout);
        Ok(TrackSource::from_child(child, reader))
    }
}

/// Last few stderr lines, enough to see why ffmpeg bailed.
fn tail(stderr: &str) -> String {
    let mut lines: Vec<&str> = stderr.lines().rev().take(5).collect();
    lines.reverse();
    lines.join(" | ")
}
