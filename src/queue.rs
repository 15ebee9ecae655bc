use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::chat::Destination;
use crate::source::TrackSource;

/// One pending transmission: where to play, what to call it in logs and
/// announcements, and the open stream to play.
pub struct QueuedEvent {
    pub dest: Destination,
    pub label: String,
    pub source: TrackSource,
}

impl std::fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("dest", &self.dest)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// FIFO of pending transmissions. Producers never block; `dequeue` parks
/// until an event is available and hands each event to exactly one caller.
pub struct EventQueue {
    events: Mutex<VecDeque<QueuedEvent>>,
    available: Notify,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Append to the tail.
    pub async fn enqueue(&self, event: QueuedEvent) {
        self.events.lock().await.push_back(event);
        self.available.notify_one();
    }

    /// Push to the head, ahead of everything already waiting.
    pub async fn enqueue_front(&self, event: QueuedEvent) {
        self.events.lock().await.push_front(event);
        self.available.notify_one();
    }

    /// Swap the first two events. With fewer than two queued there is
    /// nothing to reorder and this does nothing.
    pub async fn preempt(&self) {
        let mut events = self.events.lock().await;
        if events.len() >= 2 {
            events.swap(0, 1);
        }
    }

    /// Take the next event, waiting as long as it takes for one to show
    /// up. Safe to call from several tasks at once; each event is handed
    /// out once.
    pub async fn dequeue(&self) -> QueuedEvent {
        loop {
            let notified = self.available.notified();

            {
                let mut events = self.events.lock().await;
                if let Some(event) = events.pop_front() {
                    // A notify permit covers one wakeup. If more events
                    // remain, pass the baton so another waiter gets one.
                    if !events.is_empty() {
                        self.available.notify_one();
                    }
                    return event;
                }
            }

            notified.await;
        }
    }

    /// Drop everything queued, closing each event's source.
    pub async fn clear(&self) -> usize {
        let drained: Vec<QueuedEvent> = self.events.lock().await.drain(..).collect();
        let count = drained.len();

        for mut event in drained {
            event.source.close().await;
        }

        count
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
