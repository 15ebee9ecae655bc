use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tokio::sync::{Mutex, Notify};

use crate::codec::FrameEncoder;
use crate::constants::{PCM_FRAME_BYTES, SPEAKING_STOP_DELAY};
use crate::queue::{EventQueue, QueuedEvent};
use crate::source::FrameRead;
use crate::transport::{VoiceConnector, VoiceTransport};

/// What the operator last asked of the player. `Paused` is the only
/// sticky state; the rest are consumed by the worker at its next
/// checkpoint and collapse back to `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Ready,
    Paused,
    Skipped,
    Cleared,
    Preempted,
}

/// Shared player state plus a wakeup for tasks parked on it.
///
/// Lock order: the state lock is taken before any queue lock, never
/// after one.
pub struct PlayerControl {
    pub(crate) state: Mutex<PlayerState>,
    pub(crate) changed: Notify,
}

impl PlayerControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlayerState::Ready),
            changed: Notify::new(),
        }
    }

    pub async fn get(&self) -> PlayerState {
        *self.state.lock().await
    }

    pub async fn set(&self, state: PlayerState) {
        *self.state.lock().await = state;
        self.changed.notify_waiters();
    }

    /// Park until the state is anything other than `Paused`.
    pub async fn wait_while_paused(&self) {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            // Register before checking, or a notify_waiters between the
            // check and the await is lost.
            changed.as_mut().enable();

            if *self.state.lock().await != PlayerState::Paused {
                return;
            }

            changed.await;
        }
    }
}

impl Default for PlayerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with the event once its stream loop ends.
enum Disposition {
    /// Paused mid-stream. Back to the head of the queue with the read
    /// cursor intact so resume picks up where we stopped.
    Requeue,
    /// Preempted. Back to the head, then swapped behind the preempting
    /// event.
    RequeuePreempted,
    /// Done with this event, close its source.
    Discard(&'static str),
}

/// The single playback loop. Takes events off the queue one at a time,
/// joins the event's destination, and streams it frame by frame,
/// checking the player state between frames.
pub struct PlaybackWorker {
    queue: Arc<EventQueue>,
    control: Arc<PlayerControl>,
    connector: Arc<dyn VoiceConnector>,
    send_lock: Arc<Mutex<()>>,
}

impl PlaybackWorker {
    pub fn new(
        queue: Arc<EventQueue>,
        control: Arc<PlayerControl>,
        connector: Arc<dyn VoiceConnector>,
        send_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            queue,
            control,
            connector,
            send_lock,
        }
    }

    pub async fn run(self) {
        loop {
            let mut event = self.queue.dequeue().await;

            // Fresh start for each event, unless the operator paused us.
            {
                let mut state = self.control.state.lock().await;
                if *state != PlayerState::Paused {
                    *state = PlayerState::Ready;
                }
            }

            self.control.wait_while_paused().await;

            // A skip or clear that landed while we were parked applies
            // to the event we are holding.
            match self.control.get().await {
                PlayerState::Skipped | PlayerState::Cleared => {
                    debug!("dropping {} before it started", event.label);
                    event.source.close().await;
                    continue;
                }
                _ => {}
            }

            let transport = match self.connector.connect(&event.dest).await {
                Ok(transport) => transport,
                Err(e) => {
                    warn!("could not join {}: {e:#}", event.dest);
                    event.source.close().await;
                    continue;
                }
            };

            self.transmit(event, transport).await;
        }
    }

    /// Stream one event, then act on the resulting disposition. On every
    /// path out of here the event either goes back into the queue with
    /// its source open, or its source is closed.
    async fn transmit(&self, mut event: QueuedEvent, transport: Arc<dyn VoiceTransport>) {
        let _send = self.send_lock.lock().await;

        let mut encoder = match FrameEncoder::new() {
            Ok(encoder) => encoder,
            Err(e) => {
                error!("could not create a frame encoder: {e:#}");
                event.source.close().await;
                return;
            }
        };

        // Outbound never retries a dead transport; the event is lost,
        // not parked.
        if !transport.ready() {
            warn!("transport at {} is not ready", event.dest);
            event.source.close().await;
            return;
        }

        if let Err(e) = transport.set_speaking(true).await {
            warn!("could not start speaking at {}: {e:#}", event.dest);
            event.source.close().await;
            return;
        }

        info!("playing {} at {}", event.label, event.dest);
        let disposition = self.stream(&mut event, &mut encoder, transport.as_ref()).await;

        // Give the tail of the stream a moment to drain before the
        // speaking flag drops.
        tokio::time::sleep(SPEAKING_STOP_DELAY).await;
        if let Err(e) = transport.set_speaking(false).await {
            debug!("could not stop speaking at {}: {e:#}", event.dest);
        }

        match disposition {
            Disposition::Requeue => {
                debug!("pausing {} mid-stream", event.label);
                self.queue.enqueue_front(event).await;
            }
            Disposition::RequeuePreempted => {
                let label = event.label.clone();

                // Hold the state lock across both queue operations so a
                // concurrent preempt cannot slip an event between our
                // requeue and the swap.
                let mut state = self.control.state.lock().await;
                self.queue.enqueue_front(event).await;
                self.queue.preempt().await;
                *state = PlayerState::Ready;

                debug!("{label} yields and will resume afterwards");
            }
            Disposition::Discard(reason) => {
                debug!("{} finished: {reason}", event.label);
                event.source.close().await;
            }
        }
    }

    async fn stream(
        &self,
        event: &mut QueuedEvent,
        encoder: &mut FrameEncoder,
        transport: &dyn VoiceTransport,
    ) -> Disposition {
        let mut pcm = vec![0u8; PCM_FRAME_BYTES];
        let mut samples = vec![0i16; PCM_FRAME_BYTES / 2];

        loop {
            match *self.control.state.lock().await {
                PlayerState::Ready => {}
                PlayerState::Paused => return Disposition::Requeue,
                PlayerState::Skipped => return Disposition::Discard("skipped"),
                PlayerState::Cleared => return Disposition::Discard("cleared"),
                PlayerState::Preempted => return Disposition::RequeuePreempted,
            }

            match event.source.read_frame(&mut pcm).await {
                Ok(FrameRead::Frame) => {}
                Ok(FrameRead::Eof) => return Disposition::Discard("end of stream"),
                Ok(FrameRead::Truncated(n)) => {
                    debug!("{} ended {n} bytes into a frame", event.label);
                    return Disposition::Discard("truncated final frame");
                }
                Err(e) => {
                    warn!("read error on {}: {e}", event.label);
                    return Disposition::Discard("read error");
                }
            }

            // The slot is lost rather than retried; a transport that
            // comes back gets the next event, not a resumed one.
            if !transport.ready() {
                warn!("transport at {} went away mid-stream", event.dest);
                return Disposition::Discard("transport not ready");
            }

            LittleEndian::read_i16_into(&pcm, &mut samples);
            let frame = match encoder.encode(&samples) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("encode error on {}: {e:#}", event.label);
                    return Disposition::Discard("encode error");
                }
            };

            // The transport applies its own pacing; a full send buffer
            // simply holds us here until the next frame slot.
            if let Err(e) = transport.send_frame(frame).await {
                warn!("send error at {}: {e:#}", event.dest);
                return Disposition::Discard("send error");
            }
        }
    }
}
