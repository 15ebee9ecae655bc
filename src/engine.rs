use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::chat::Destination;
use crate::player::{PlaybackWorker, PlayerControl, PlayerState};
use crate::queue::{EventQueue, QueuedEvent};
use crate::source::TrackSource;
use crate::transport::VoiceConnector;

/// Front door for everything that wants audio played. Owns the event
/// queue and the player state; `start` spawns the single worker that
/// drains them. Every operation here is fire-and-forget: it records the
/// request and returns, the worker acts on it at its next checkpoint.
pub struct AudioEngine {
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) control: Arc<PlayerControl>,
    send_lock: Arc<Mutex<()>>,
}

impl AudioEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Arc::new(EventQueue::new()),
            control: Arc::new(PlayerControl::new()),
            send_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Spawn the playback loop against the given connector.
    pub fn start(self: &Arc<Self>, connector: Arc<dyn VoiceConnector>) {
        let worker = PlaybackWorker::new(
            self.queue.clone(),
            self.control.clone(),
            connector,
            self.send_lock.clone(),
        );
        tokio::spawn(worker.run());
    }

    /// Queue an already-open source behind everything waiting.
    pub async fn enqueue_stream(
        &self,
        dest: Destination,
        label: impl Into<String>,
        source: TrackSource,
    ) {
        let label = label.into();
        debug!("queuing {label} for {dest}");

        self.queue
            .enqueue(QueuedEvent {
                dest,
                label,
                source,
            })
            .await;
    }

    /// Open a cached artifact and queue it.
    pub async fn enqueue_artifact(
        &self,
        dest: Destination,
        label: impl Into<String>,
        path: &Path,
    ) -> Result<()> {
        let source = TrackSource::open(path).await?;
        self.enqueue_stream(dest, label, source).await;
        Ok(())
    }

    /// Queue a transmission ahead of everything else and interrupt the
    /// one in flight. The interrupted event resumes afterwards, then the
    /// rest of the queue in its original order.
    pub async fn announce(&self, dest: Destination, label: impl Into<String>, source: TrackSource) {
        let label = label.into();
        debug!("announcing {label} at {dest}, preempting playback");

        let event = QueuedEvent {
            dest,
            label,
            source,
        };

        // State flip and queue push must be one atomic step, mirrored by
        // the worker's yield path.
        let mut state = self.control.state.lock().await;
        self.queue.enqueue_front(event).await;
        *state = PlayerState::Preempted;
        drop(state);

        self.control.changed.notify_waiters();
    }

    /// Hold the current event at its read cursor and stop transmitting.
    pub async fn pause(&self) {
        self.control.set(PlayerState::Paused).await;
    }

    /// Undo a pause. Playback continues from where it stopped.
    pub async fn resume(&self) {
        self.control.set(PlayerState::Ready).await;
    }

    /// Drop the event in flight and move on to the next one.
    pub async fn skip(&self) {
        self.control.set(PlayerState::Skipped).await;
    }

    /// Drop the event in flight and everything queued behind it.
    /// Returns how many queued events were thrown away.
    pub async fn clear(&self) -> usize {
        let mut state = self.control.state.lock().await;
        *state = PlayerState::Cleared;
        let dropped = self.queue.clear().await;
        drop(state);

        self.control.changed.notify_waiters();

        debug!("cleared {dropped} queued events");
        dropped
    }

    pub async fn state(&self) -> PlayerState {
        self.control.get().await
    }

    pub async fn queued_len(&self) -> usize {
        self.queue.len().await
    }
}
