use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use hound::{SampleFormat, WavSpec};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::time::{Interval, MissedTickBehavior};

use crate::codec::FrameDecoder;
use crate::constants::{BIT_DEPTH, CHANNELS, FRAME_DURATION, SAMPLE_RATE};
use crate::transport::{VoicePacket, VoiceTransport};

/// A loopback voice transport for running without a chat service.
/// Outbound wire frames are decoded again and streamed as WAV over TCP,
/// so `nc host port | aplay` (or any player pointed at the socket) makes
/// playback audible.
pub struct MonitorTransport {
    frames: watch::Sender<Vec<i16>>,
    decoder: Mutex<FrameDecoder>,
    ticker: Mutex<Interval>,
    ready: AtomicBool,
    speaking: AtomicBool,
    local_addr: SocketAddr,
}

impl MonitorTransport {
    /// Bind the listener and start serving connected listeners.
    pub async fn start(addr: &str) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("could not bind monitor to {addr}"))?;
        let local_addr = listener.local_addr().context("monitor has no local address")?;

        info!("monitor listening on {local_addr}");

        let (frames, _) = watch::channel(Vec::new());

        let mut ticker = tokio::time::interval(FRAME_DURATION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let transport = Arc::new(Self {
            frames,
            decoder: Mutex::new(FrameDecoder::new()?),
            ticker: Mutex::new(ticker),
            ready: AtomicBool::new(true),
            speaking: AtomicBool::new(false),
            local_addr,
        });

        let receiver = transport.frames.subscribe();
        tokio::spawn(serve(listener, receiver));

        Ok(transport)
    }

    pub fn speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// The address actually bound, which matters when configured as
    /// port zero.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl VoiceTransport for MonitorTransport {
    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn set_speaking(&self, speaking: bool) -> Result<()> {
        self.speaking.store(speaking, Ordering::SeqCst);

        if speaking {
            // Each transmission brings a fresh encoder upstream, so meet
            // it with a fresh decoder.
            *self.decoder.lock().await = FrameDecoder::new()?;
        }

        Ok(())
    }

    async fn send_frame(&self, frame: Bytes) -> Result<()> {
        // Real voice gateways accept one frame per tick. Keep the same
        // rhythm, otherwise files play as fast as the disk reads.
        self.ticker.lock().await.tick().await;

        let pcm = self.decoder.lock().await.decode(&frame)?;
        self.frames.send_replace(pcm);

        Ok(())
    }

    async fn recv_packet(&self) -> Option<VoicePacket> {
        // The console has no remote speakers.
        std::future::pending().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

async fn serve(listener: TcpListener, frames: watch::Receiver<Vec<i16>>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("monitor listener connected from {addr}");
                tokio::spawn(stream_wav(stream, frames.clone()));
            }
            Err(e) => warn!("monitor accept failed: {e}"),
        }
    }
}

async fn stream_wav(mut stream: TcpStream, mut frames: watch::Receiver<Vec<i16>>) {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BIT_DEPTH,
        sample_format: SampleFormat::Int,
    };

    // The header makes players recognize the stream as an endless wav.
    let header = spec.into_header_for_infinite_file();
    if let Err(e) = stream.write_all(&header[..]).await {
        debug!("could not write wav header: {e}");
        return;
    }

    loop {
        if frames.changed().await.is_err() {
            break;
        }

        let samples = frames.borrow_and_update().clone();
        let mut wav_data: Vec<u8> = Vec::with_capacity(samples.len() * 2);

        for sample in samples {
            WriteBytesExt::write_i16::<LittleEndian>(&mut wav_data, sample).unwrap();
        }

        if let Err(e) = stream.write_all(wav_data.as_slice()).await {
            debug!("monitor listener went away: {e}");
            break;
        }
    }
}
