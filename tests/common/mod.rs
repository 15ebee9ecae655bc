//! Test infrastructure for crier integration tests.
//!
//! Provides a scripted chat client, recording voice transports, and
//! fake media backends so the whole bot runs without a network, a
//! media extractor, or an ffmpeg binary.

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub use crier::bot::{Bot, ChatVoice};
pub use crier::cache::SourceCache;
pub use crier::chat::{
    ChannelId, ChatClient, ChatEvent, ChatMessage, Destination, GuildId, UserId, VoiceState,
};
pub use crier::constants::{FRAME_DURATION, PCM_FRAME_BYTES};
pub use crier::engine::AudioEngine;
pub use crier::preview::Previewer;
pub use crier::resolver::{ResolveTrack, TrackInfo};
pub use crier::source::TrackSource;
pub use crier::speech::{HttpSpeechProvider, SpeechCache};
pub use crier::transcode::Transcode;
pub use crier::transport::{VoicePacket, VoiceTransport};

pub const GUILD: &str = "guild-1";
pub const TEXT_CHANNEL: &str = "general";
pub const VOICE_CHANNEL: &str = "voice-1";
pub const OWNER: &str = "operator";

/// Polls until the condition holds, panicking after a timeout. Runs
/// under both real and paused clocks.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Voice transport that records outbound traffic. Sends are paced one
/// frame per frame slot, like a real gateway.
pub struct RecordingTransport {
    frames: Mutex<Vec<Bytes>>,
    speaking: Mutex<Vec<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            speaking: Mutex::new(Vec::new()),
        })
    }

    pub fn frames_sent(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn speaking_changes(&self) -> Vec<bool> {
        self.speaking.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceTransport for RecordingTransport {
    fn ready(&self) -> bool {
        true
    }

    async fn set_speaking(&self, speaking: bool) -> Result<()> {
        self.speaking.lock().unwrap().push(speaking);
        Ok(())
    }

    async fn send_frame(&self, frame: Bytes) -> Result<()> {
        tokio::time::sleep(FRAME_DURATION).await;
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv_packet(&self) -> Option<VoicePacket> {
        std::future::pending().await
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Chat client that records everything the bot sends and hands out one
/// recording transport per voice channel.
pub struct ScriptedClient {
    sent: Mutex<Vec<(String, String)>>,
    transports: Mutex<HashMap<String, Arc<RecordingTransport>>>,
    joins: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            transports: Mutex::new(HashMap::new()),
            joins: Mutex::new(Vec::new()),
        })
    }

    /// Texts the bot has sent, in order, any channel
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Voice channels joined, in order, repeats included
    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().unwrap().clone()
    }

    /// The transport for a voice channel, created on first use
    pub fn transport(&self, channel: &str) -> Arc<RecordingTransport> {
        self.transports
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_insert_with(RecordingTransport::new)
            .clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn self_id(&self) -> UserId {
        UserId::from("bot")
    }

    async fn send_message(&self, channel: &ChannelId, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }

    async fn member_name(&self, _guild: &GuildId, user: &UserId) -> Result<String> {
        Ok(format!("Member {user}"))
    }

    async fn join_voice(&self, dest: &Destination) -> Result<Arc<dyn VoiceTransport>> {
        let channel = dest.channel.to_string();
        self.joins.lock().unwrap().push(channel.clone());
        Ok(self.transport(&channel))
    }
}

/// Resolver that makes up metadata instead of calling an extractor.
pub struct FakeResolver {
    failing: Mutex<HashSet<String>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: Mutex::new(HashSet::new()),
        })
    }

    /// Make resolution of this URL fail
    pub fn refuse(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }
}

#[async_trait]
impl ResolveTrack for FakeResolver {
    async fn resolve(&self, url: &str) -> Result<TrackInfo> {
        if self.failing.lock().unwrap().contains(url) {
            bail!("nothing playable at {url}");
        }

        Ok(TrackInfo {
            origin: url.to_string(),
            media_url: format!("{url}#media"),
            title: format!("Title of {url}"),
        })
    }
}

/// Transcoder that writes frames of silence instead of running ffmpeg.
pub struct FakeTranscoder {
    file_runs: AtomicUsize,
    stream_runs: AtomicUsize,
    track_frames: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            file_runs: AtomicUsize::new(0),
            stream_runs: AtomicUsize::new(0),
            track_frames: AtomicUsize::new(3),
        })
    }

    /// How many frames the next transcoded artifact holds
    pub fn set_track_frames(&self, frames: usize) {
        self.track_frames.store(frames, Ordering::SeqCst);
    }

    pub fn file_runs(&self) -> usize {
        self.file_runs.load(Ordering::SeqCst)
    }

    pub fn stream_runs(&self) -> usize {
        self.stream_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcode for FakeTranscoder {
    async fn to_file(&self, _input: &str, output: &Path) -> Result<()> {
        self.file_runs.fetch_add(1, Ordering::SeqCst);
        let frames = self.track_frames.load(Ordering::SeqCst);
        tokio::fs::write(output, vec![0u8; frames * PCM_FRAME_BYTES]).await?;
        Ok(())
    }

    async fn stream(&self, _input: &str) -> Result<TrackSource> {
        self.stream_runs.fetch_add(1, Ordering::SeqCst);
        Ok(TrackSource::from_reader(Cursor::new(vec![
            0u8;
            2 * PCM_FRAME_BYTES
        ])))
    }
}

/// A bot wired to mocks, with handles on everything a test wants to
/// poke or inspect.
pub struct TestBot {
    pub client: Arc<ScriptedClient>,
    pub engine: Arc<AudioEngine>,
    pub voice: Arc<ChatVoice>,
    pub resolver: Arc<FakeResolver>,
    pub transcoder: Arc<FakeTranscoder>,
    pub events: mpsc::Sender<ChatEvent>,
    pub dir: tempfile::TempDir,
    run: tokio::task::JoinHandle<()>,
}

impl TestBot {
    /// Boots a bot with no speech endpoint and no previewers.
    pub async fn start() -> Self {
        Self::start_with(None, Vec::new()).await
    }

    pub async fn start_with(
        speech_url: Option<String>,
        previewers: Vec<Arc<dyn Previewer>>,
    ) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let client = ScriptedClient::new();
        let resolver = FakeResolver::new();
        let transcoder = FakeTranscoder::new();

        let cache = Arc::new(
            SourceCache::new(dir.path().join("tracks"), transcoder.clone())
                .await
                .unwrap(),
        );

        let speech = match speech_url {
            Some(url) => {
                let provider = Arc::new(HttpSpeechProvider::new(url, None));
                Some(Arc::new(
                    SpeechCache::new(dir.path().join("speech"), provider)
                        .await
                        .unwrap(),
                ))
            }
            None => None,
        };

        let voice = ChatVoice::new(client.clone(), None);
        let engine = AudioEngine::new();
        engine.start(voice.clone());

        let bot = Bot::new(
            client.clone(),
            engine.clone(),
            voice.clone(),
            cache,
            transcoder.clone(),
            resolver.clone(),
            speech,
            previewers,
            UserId::from(OWNER),
        );

        let (events, events_rx) = mpsc::channel(64);
        let run = tokio::spawn(async move { bot.run(events_rx).await });

        Self {
            client,
            engine,
            voice,
            resolver,
            transcoder,
            events,
            dir,
            run,
        }
    }

    /// The owner says something in the guild text channel
    pub async fn say(&self, content: &str) {
        self.say_as(OWNER, content).await;
    }

    pub async fn say_as(&self, author: &str, content: &str) {
        let msg = ChatMessage {
            guild: Some(GuildId::from(GUILD)),
            channel: ChannelId::from(TEXT_CHANNEL),
            author: UserId::from(author),
            content: content.to_string(),
        };
        self.events.send(ChatEvent::Message(msg)).await.unwrap();
    }

    /// The owner says something in a direct message
    pub async fn dm(&self, content: &str) {
        let msg = ChatMessage {
            guild: None,
            channel: ChannelId::from("dm"),
            author: UserId::from(OWNER),
            content: content.to_string(),
        };
        self.events.send(ChatEvent::Message(msg)).await.unwrap();
    }

    /// Puts a user into a voice channel, or out of all of them
    pub async fn seat(&self, user: &str, channel: Option<&str>) {
        let update = VoiceState {
            guild: GuildId::from(GUILD),
            user: UserId::from(user),
            channel: channel.map(ChannelId::from),
        };
        self.events.send(ChatEvent::VoiceState(update)).await.unwrap();
    }

    pub async fn speaking(&self, user: &str, ssrc: u32) {
        self.events
            .send(ChatEvent::Speaking {
                guild: GuildId::from(GUILD),
                user: UserId::from(user),
                ssrc,
            })
            .await
            .unwrap();
    }

    pub fn replies(&self) -> Vec<String> {
        self.client.sent_texts()
    }

    /// Waits for a reply containing the given text
    pub async fn wait_for_reply(&self, needle: &str) {
        let what = format!("a reply containing {needle:?}");
        wait_until(&what, || {
            self.replies().iter().any(|text| text.contains(needle))
        })
        .await;
    }

    pub fn transport(&self, channel: &str) -> Arc<RecordingTransport> {
        self.client.transport(channel)
    }

    /// Whether the bot loop has exited
    pub fn finished(&self) -> bool {
        self.run.is_finished()
    }
}
