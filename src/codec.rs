use anyhow::Result;
use bytes::Bytes;

use crate::constants::{CHANNELS, FRAME_SAMPLES, MAX_WIRE_FRAME_BYTES, SAMPLE_RATE};

/// Encoder for one outbound transmission. Opus carries prediction state
/// from frame to frame, so an encoder must never be shared between events:
/// the playback worker creates a fresh one per transmission.
pub struct FrameEncoder {
    encoder: opus::Encoder,
}

impl FrameEncoder {
    pub fn new() -> Result<Self> {
        let encoder = opus::Encoder::new(
            SAMPLE_RATE,
            opus::Channels::Stereo,
            opus::Application::Audio,
        )?;

        Ok(Self { encoder })
    }

    /// Encode one frame of interleaved stereo PCM into a wire frame.
    /// `pcm` must hold exactly `FRAME_SAMPLES * CHANNELS` samples.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Bytes> {
        let mut wire = vec![0u8; MAX_WIRE_FRAME_BYTES];
        let len = self.encoder.encode(pcm, &mut wire)?;
        wire.truncate(len);

        Ok(wire.into())
    }
}

/// Decoder for one inbound stream. Decoder state is per synchronization
/// source; the receive worker keeps one of these per SSRC and throws it
/// away on decode failure.
pub struct FrameDecoder {
    decoder: opus::Decoder,
}

impl FrameDecoder {
    pub fn new() -> Result<Self> {
        let decoder = opus::Decoder::new(SAMPLE_RATE, opus::Channels::Stereo)?;

        Ok(Self { decoder })
    }

    /// Decode one wire frame to interleaved stereo PCM.
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        let mut pcm = vec![0i16; FRAME_SAMPLES * CHANNELS as usize];
        let samples = self.decoder.decode(payload, &mut pcm, false)?;
        pcm.truncate(samples * CHANNELS as usize);

        Ok(pcm)
    }
}
