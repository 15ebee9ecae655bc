use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;

/// Outcome of reading one frame from a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRead {
    /// The buffer was filled with a full frame.
    Frame,
    /// Clean end of stream on a frame boundary.
    Eof,
    /// The stream ended mid-frame after this many bytes. Terminal like
    /// `Eof`; the partial data is not played.
    Truncated(usize),
}

/// Observer for a source's closed flag, cheap to clone and hold after the
/// source itself has been consumed.
#[derive(Clone, Debug)]
pub struct SourceHandle {
    closed: Arc<AtomicBool>,
}

impl SourceHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An open wire-ready audio stream together with whatever backs it: a
/// cache artifact file, or a live transcoder child whose stdout we are
/// draining. Closing releases the backing resource; dropping an unclosed
/// source behaves like a close, since children are spawned kill-on-drop.
pub struct TrackSource {
    reader: Option<Box<dyn AsyncRead + Send + Unpin>>,
    child: Option<Child>,
    closed: Arc<AtomicBool>,
}

impl TrackSource {
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            child: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stream from a transcoder child. The child must have been spawned
    /// with `kill_on_drop` so an abandoned source cannot leak it.
    pub fn from_child(child: Child, stdout: BufReader<tokio::process::ChildStdout>) -> Self {
        Self {
            reader: Some(Box::new(stdout)),
            child: Some(child),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a cached artifact file.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("could not open audio artifact {}", path.display()))?;

        Ok(Self::from_reader(BufReader::new(file)))
    }

    /// Fill `buf` with exactly one frame. A short read only happens at the
    /// end of the stream and is reported as `Eof` (on the frame boundary)
    /// or `Truncated` (mid-frame).
    pub async fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<FrameRead> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(FrameRead::Eof);
        };

        let mut filled = 0;
        while filled < buf.len() {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(match filled {
            0 => FrameRead::Eof,
            n if n == buf.len() => FrameRead::Frame,
            n => FrameRead::Truncated(n),
        })
    }

    /// Release the stream and its backing resource. Idempotent; reads
    /// after close report `Eof`.
    pub async fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.reader = None;

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("transcoder already gone on close: {e}");
            }

            // Reap off the caller's path.
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
    }

    pub fn closed_handle(&self) -> SourceHandle {
        SourceHandle {
            closed: self.closed.clone(),
        }
    }
}

impl Drop for TrackSource {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
