use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::chat::Destination;

/// One encoded frame received from the far side of a transport, tagged
/// with the synchronization source (SSRC) that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct VoicePacket {
    pub ssrc: u32,
    pub payload: Bytes,
}

/// The voice half of a chat connection. Outbound frames are already
/// encoded; inbound packets are decoded downstream, one decoder per SSRC.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Whether frames can currently be sent.
    fn ready(&self) -> bool;

    /// Signal the start or end of a transmission to other participants.
    async fn set_speaking(&self, speaking: bool) -> Result<()>;

    /// Ship one encoded frame.
    async fn send_frame(&self, frame: Bytes) -> Result<()>;

    /// Next inbound packet, or `None` once the transport is closed for
    /// good. Implementations must be cancel safe: a packet is never lost
    /// when the future is dropped before completion.
    async fn recv_packet(&self) -> Option<VoicePacket>;

    async fn disconnect(&self) -> Result<()>;
}

/// Hands out transports for destinations, reusing live connections.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, dest: &Destination) -> Result<Arc<dyn VoiceTransport>>;
}
