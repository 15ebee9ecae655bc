use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::cache::SourceCache;
use crate::chat::{ChannelId, ChatClient, ChatEvent, ChatMessage, Destination, GuildId, UserId, VoiceState};
use crate::commands::{self, Command};
use crate::engine::AudioEngine;
use crate::preview::{self, Previewer};
use crate::receive::{DecodedFrame, InboundDecodeWorker, ReceiveHandle};
use crate::resolver::ResolveTrack;
use crate::speech::SpeechCache;
use crate::transcode::Transcode;
use crate::transport::{VoiceConnector, VoiceTransport};

/// Joins voice through the chat client and keeps one inbound decode
/// worker per transport it hands out.
pub struct ChatVoice {
    client: Arc<dyn ChatClient>,
    sink: Option<mpsc::Sender<DecodedFrame>>,
    handles: Mutex<HashMap<GuildId, (Arc<dyn VoiceTransport>, ReceiveHandle)>>,
}

impl ChatVoice {
    pub fn new(client: Arc<dyn ChatClient>, sink: Option<mpsc::Sender<DecodedFrame>>) -> Arc<Self> {
        Arc::new(Self {
            client,
            sink,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Inbox of the decode worker for a guild we have joined.
    pub async fn receive_handle(&self, guild: &GuildId) -> Option<ReceiveHandle> {
        self.handles
            .lock()
            .await
            .get(guild)
            .map(|(_, handle)| handle.clone())
    }
}

#[async_trait]
impl VoiceConnector for ChatVoice {
    async fn connect(&self, dest: &Destination) -> Result<Arc<dyn VoiceTransport>> {
        let transport = self.client.join_voice(dest).await?;

        let mut handles = self.handles.lock().await;
        match handles.get(&dest.guild) {
            Some((known, _)) if Arc::ptr_eq(known, &transport) => {}
            _ => {
                debug!("new voice transport for {}, starting inbound decode", dest.guild);
                let handle = InboundDecodeWorker::spawn(transport.clone(), self.sink.clone());
                handles.insert(dest.guild.clone(), (transport.clone(), handle));
            }
        }

        Ok(transport)
    }
}

enum Flow {
    Continue,
    Disconnect,
}

enum PresenceChange {
    Joined { channel: ChannelId },
    Left { channel: ChannelId },
}

/// The glue between chat traffic and the audio engine: commands, link
/// previews, presence announcements, and feeding the inbound decoders.
pub struct Bot {
    client: Arc<dyn ChatClient>,
    engine: Arc<AudioEngine>,
    voice: Arc<ChatVoice>,
    cache: Arc<SourceCache>,
    transcoder: Arc<dyn Transcode>,
    resolver: Arc<dyn ResolveTrack>,
    speech: Option<Arc<SpeechCache>>,
    previewers: Vec<Arc<dyn Previewer>>,
    owner: UserId,
    voice_states: Mutex<HashMap<GuildId, HashMap<UserId, ChannelId>>>,
}

impl Bot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ChatClient>,
        engine: Arc<AudioEngine>,
        voice: Arc<ChatVoice>,
        cache: Arc<SourceCache>,
        transcoder: Arc<dyn Transcode>,
        resolver: Arc<dyn ResolveTrack>,
        speech: Option<Arc<SpeechCache>>,
        previewers: Vec<Arc<dyn Previewer>>,
        owner: UserId,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            engine,
            voice,
            cache,
            transcoder,
            resolver,
            speech,
            previewers,
            owner,
            voice_states: Mutex::new(HashMap::new()),
        })
    }

    /// Drive the bot from a stream of chat events. Returns when the
    /// operator disconnects us or the stream ends.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::Ready => info!("chat connection is ready"),
                ChatEvent::Message(msg) => {
                    if let Flow::Disconnect = self.on_message(msg).await {
                        break;
                    }
                }
                ChatEvent::VoiceState(update) => self.on_voice_state(update).await,
                ChatEvent::Speaking { guild, user, ssrc } => {
                    self.on_speaking(guild, user, ssrc).await;
                }
            }
        }

        info!("bot loop finished");
    }

    async fn on_message(&self, msg: ChatMessage) -> Flow {
        if msg.author == self.client.self_id() {
            debug!("skipping own message");
            return Flow::Continue;
        }

        self.preview_urls(&msg).await;

        if msg.author != self.owner {
            return Flow::Continue;
        }

        let Some(command) = commands::parse(&msg.content) else {
            return Flow::Continue;
        };

        debug!("{} issued {command:?}", msg.author);

        match command {
            Command::Ping => self.reply(&msg.channel, "Pong!").await,
            Command::Disconnect => {
                self.reply(&msg.channel, "Disconnecting!").await;
                return Flow::Disconnect;
            }
            Command::Pause => self.engine.pause().await,
            Command::Resume => self.engine.resume().await,
            Command::Skip => self.engine.skip().await,
            Command::Clear => {
                self.engine.clear().await;
            }
            Command::Play { url } => self.play(&msg, &url).await,
        }

        Flow::Continue
    }

    async fn preview_urls(&self, msg: &ChatMessage) {
        for url in commands::extract_urls(&msg.content) {
            if let Some(found) = preview::preview_url(&self.previewers, url).await {
                self.reply(&msg.channel, &found.text).await;
            }
        }
    }

    /// Resolve, announce, transcode into the cache, and queue. The cache
    /// key is the URL the user pasted, so asking for the same page twice
    /// never transcodes twice.
    async fn play(&self, msg: &ChatMessage, url: &str) {
        if url.is_empty() {
            self.reply(&msg.channel, "You didn't provide a URL!").await;
            return;
        }

        let Some(guild) = msg.guild.clone() else {
            self.reply(&msg.channel, "That only works from a guild channel!")
                .await;
            return;
        };

        // The track goes to wherever the requester is sitting right now.
        let Some(voice_channel) = self.voice_channel_of(&guild, &msg.author).await else {
            self.reply(&msg.channel, "You're not in a voice channel!").await;
            return;
        };

        let info = match self.resolver.resolve(url).await {
            Ok(info) => info,
            Err(e) => {
                warn!("could not resolve {url}: {e:#}");
                self.reply(&msg.channel, "Couldn't resolve an audio URL :(").await;
                return;
            }
        };

        self.reply(&msg.channel, &format!("Queuing **{}**", info.title))
            .await;

        let artifact = match self.cache.get_or_create(&info.origin, &info.media_url).await {
            Ok(path) => path,
            Err(e) => {
                warn!("could not prepare {}: {e:#}", info.title);
                self.reply(&msg.channel, "Couldn't prepare that audio :(").await;
                return;
            }
        };

        let dest = Destination {
            guild,
            channel: voice_channel,
        };

        if let Err(e) = self.engine.enqueue_artifact(dest, info.title.clone(), &artifact).await {
            warn!("could not open artifact for {}: {e:#}", info.title);
        }
    }

    async fn voice_channel_of(&self, guild: &GuildId, user: &UserId) -> Option<ChannelId> {
        self.voice_states
            .lock()
            .await
            .get(guild)?
            .get(user)
            .cloned()
    }

    async fn on_voice_state(&self, update: VoiceState) {
        if update.user == self.client.self_id() {
            debug!("ignoring own voice state");
            return;
        }

        for change in self.detect_presence_change(&update).await {
            match change {
                PresenceChange::Left { channel } => {
                    info!("{} left {}/{channel}", update.user, update.guild);
                    self.announce(&update.guild, &channel, &update.user, "left")
                        .await;
                    self.participant_left(&update.guild, update.user.clone())
                        .await;
                }
                PresenceChange::Joined { channel } => {
                    info!("{} joined {}/{channel}", update.user, update.guild);
                    self.announce(&update.guild, &channel, &update.user, "joined")
                        .await;
                }
            }
        }
    }

    /// Diff an update against the per-guild occupancy cache. A move
    /// between channels comes out as a leave plus a join.
    async fn detect_presence_change(&self, update: &VoiceState) -> Vec<PresenceChange> {
        let mut states = self.voice_states.lock().await;
        let guild_states = states.entry(update.guild.clone()).or_default();

        let mut changes = Vec::new();

        if let Some(cached) = guild_states.get(&update.user).cloned() {
            if Some(&cached) == update.channel.as_ref() {
                debug!("no channel change for {}", update.user);
                return changes;
            }

            changes.push(PresenceChange::Left { channel: cached });
            guild_states.remove(&update.user);
        }

        if let Some(channel) = update.channel.clone() {
            changes.push(PresenceChange::Joined {
                channel: channel.clone(),
            });
            guild_states.insert(update.user.clone(), channel);
        }

        changes
    }

    /// Synthesize "{name} joined/left the channel" and play it ahead of
    /// whatever is on. The interrupted track resumes afterwards.
    async fn announce(&self, guild: &GuildId, channel: &ChannelId, user: &UserId, action: &str) {
        let Some(speech) = &self.speech else {
            return;
        };

        let name = match self.client.member_name(guild, user).await {
            Ok(name) => name,
            Err(e) => {
                warn!("could not look up {user}: {e:#}");
                return;
            }
        };

        let text = format!("{name} {action} the channel");

        let spoken = match speech.get_or_synthesize(&text).await {
            Ok(path) => path,
            Err(e) => {
                warn!("could not synthesize {text:?}: {e:#}");
                return;
            }
        };

        // Provider output is in whatever container the vendor uses, so
        // it goes through the transcoder on its way out.
        let source = match self.transcoder.stream(&spoken.to_string_lossy()).await {
            Ok(source) => source,
            Err(e) => {
                warn!("could not open speech for {text:?}: {e:#}");
                return;
            }
        };

        let dest = Destination {
            guild: guild.clone(),
            channel: channel.clone(),
        };
        self.engine.announce(dest, text, source).await;
    }

    async fn participant_left(&self, guild: &GuildId, user: UserId) {
        if let Some(handle) = self.voice.receive_handle(guild).await {
            handle.participant_left(user).await;
        }
    }

    async fn on_speaking(&self, guild: GuildId, user: UserId, ssrc: u32) {
        match self.voice.receive_handle(&guild).await {
            Some(handle) => handle.speaking(user, ssrc).await,
            None => debug!("speaking update for {guild} before any join, ignoring"),
        }
    }

    async fn reply(&self, channel: &ChannelId, text: &str) {
        if let Err(e) = self.client.send_message(channel, text).await {
            warn!("could not send to {channel}: {e:#}");
        }
    }
}
