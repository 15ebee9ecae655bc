use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::chat::UserId;
use crate::codec::FrameDecoder;
use crate::transport::{VoicePacket, VoiceTransport};

/// Updates the chat layer feeds into the decode worker.
#[derive(Clone, Debug)]
pub enum ReceiveUpdate {
    /// A user started transmitting on the given ssrc. Replaces any
    /// earlier mapping for the same user.
    Speaking { user: UserId, ssrc: u32 },
    /// A user left the call; their ssrc mapping and decoder go away.
    ParticipantLeft { user: UserId },
}

/// One decoded inbound frame, attributed to a user when the speaking
/// map knows the ssrc.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub ssrc: u32,
    pub user: Option<UserId>,
    pub pcm: Vec<i16>,
}

/// Running totals published by the decode worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    pub packets: u64,
    pub decode_failures: u64,
    pub active_decoders: usize,
}

/// Cloneable front for a running decode worker.
#[derive(Clone)]
pub struct ReceiveHandle {
    updates: mpsc::Sender<ReceiveUpdate>,
    stats: watch::Receiver<ReceiveStats>,
}

impl ReceiveHandle {
    pub async fn speaking(&self, user: UserId, ssrc: u32) {
        let update = ReceiveUpdate::Speaking { user, ssrc };
        if self.updates.send(update).await.is_err() {
            debug!("decode worker gone, dropping speaking update");
        }
    }

    pub async fn participant_left(&self, user: UserId) {
        let update = ReceiveUpdate::ParticipantLeft { user };
        if self.updates.send(update).await.is_err() {
            debug!("decode worker gone, dropping departure update");
        }
    }

    pub fn stats(&self) -> ReceiveStats {
        *self.stats.borrow()
    }

    /// Watch receiver for callers that want to wait on progress.
    pub fn watch_stats(&self) -> watch::Receiver<ReceiveStats> {
        self.stats.clone()
    }
}

/// Decodes inbound voice packets from however many people talk at once.
///
/// The decoder table and the speaker map live in this task alone;
/// everyone else goes through the inbox. That makes removing a departed
/// participant's decoder trivially safe against a decode of the same
/// ssrc happening "at the same time".
pub struct InboundDecodeWorker {
    transport: Arc<dyn VoiceTransport>,
    inbox: mpsc::Receiver<ReceiveUpdate>,
    sink: Option<mpsc::Sender<DecodedFrame>>,
    decoders: HashMap<u32, FrameDecoder>,
    speakers: HashMap<UserId, u32>,
    stats: watch::Sender<ReceiveStats>,
    packets: u64,
    decode_failures: u64,
}

impl InboundDecodeWorker {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        sink: Option<mpsc::Sender<DecodedFrame>>,
    ) -> (Self, ReceiveHandle) {
        let (update_tx, update_rx) = mpsc::channel(64);
        let (stats_tx, stats_rx) = watch::channel(ReceiveStats::default());

        let worker = Self {
            transport,
            inbox: update_rx,
            sink,
            decoders: HashMap::new(),
            speakers: HashMap::new(),
            stats: stats_tx,
            packets: 0,
            decode_failures: 0,
        };

        let handle = ReceiveHandle {
            updates: update_tx,
            stats: stats_rx,
        };

        (worker, handle)
    }

    pub fn spawn(
        transport: Arc<dyn VoiceTransport>,
        sink: Option<mpsc::Sender<DecodedFrame>>,
    ) -> ReceiveHandle {
        let (worker, handle) = Self::new(transport, sink);
        tokio::spawn(worker.run());
        handle
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                update = self.inbox.recv() => {
                    match update {
                        Some(update) => self.apply(update),
                        None => break,
                    }
                }
                packet = Self::next_packet(&self.transport) => {
                    match packet {
                        Some(packet) => self.decode(packet).await,
                        None => {
                            debug!("inbound voice stream ended");
                            break;
                        }
                    }
                }
            }

            self.publish();
        }
    }

    /// Inbound never gives up on a transport that is not ready yet, it
    /// just keeps waiting.
    async fn next_packet(transport: &Arc<dyn VoiceTransport>) -> Option<VoicePacket> {
        while !transport.ready() {
            debug!("voice transport not ready, holding off on receive");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        transport.recv_packet().await
    }

    fn apply(&mut self, update: ReceiveUpdate) {
        match update {
            ReceiveUpdate::Speaking { user, ssrc } => {
                debug!("{user} transmits on ssrc {ssrc}");
                self.speakers.insert(user, ssrc);
            }
            ReceiveUpdate::ParticipantLeft { user } => {
                if let Some(ssrc) = self.speakers.remove(&user) {
                    self.decoders.remove(&ssrc);
                    debug!("dropped decoder for departed {user} (ssrc {ssrc})");
                }
            }
        }
    }

    async fn decode(&mut self, packet: VoicePacket) {
        self.packets += 1;

        let decoder = match self.decoders.entry(packet.ssrc) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => match FrameDecoder::new() {
                Ok(decoder) => {
                    debug!("first packet from ssrc {}, creating a decoder", packet.ssrc);
                    entry.insert(decoder)
                }
                Err(e) => {
                    warn!("could not create a decoder for ssrc {}: {e:#}", packet.ssrc);
                    self.decode_failures += 1;
                    return;
                }
            },
        };

        match decoder.decode(&packet.payload) {
            Ok(pcm) => {
                if let Some(sink) = &self.sink {
                    let frame = DecodedFrame {
                        ssrc: packet.ssrc,
                        user: self.user_for(packet.ssrc),
                        pcm,
                    };

                    // A slow consumer loses frames rather than stalling
                    // the decode loop.
                    let _ = sink.try_send(frame);
                }
            }
            Err(e) => {
                warn!(
                    "decode failed on ssrc {}, discarding its decoder: {e:#}",
                    packet.ssrc
                );
                self.decoders.remove(&packet.ssrc);
                self.decode_failures += 1;
            }
        }
    }

    fn user_for(&self, ssrc: u32) -> Option<UserId> {
        self.speakers
            .iter()
            .find_map(|(user, s)| (*s == ssrc).then(|| user.clone()))
    }

    fn publish(&self) {
        self.stats.send_replace(ReceiveStats {
            packets: self.packets,
            decode_failures: self.decode_failures,
            active_decoders: self.decoders.len(),
        });
    }
}
