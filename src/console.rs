use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::chat::{
    ChannelId, ChatClient, ChatEvent, ChatMessage, Destination, GuildId, UserId, VoiceState,
};
use crate::monitor::MonitorTransport;
use crate::transport::VoiceTransport;

pub const CONSOLE_GUILD: &str = "console";
pub const CONSOLE_CHANNEL: &str = "terminal";
pub const CONSOLE_VOICE_CHANNEL: &str = "voice";

/// A chat client backed by the terminal, so the whole pipeline runs
/// without any chat service. Typed lines arrive as owner messages;
/// `/presence <name> join|leave` fakes a participant moving in and out
/// of the voice channel. Voice lands on the monitor transport.
pub struct ConsoleClient {
    self_id: UserId,
    owner: UserId,
    transport: Arc<MonitorTransport>,
    events: mpsc::Sender<ChatEvent>,
}

impl ConsoleClient {
    pub fn new(
        owner: UserId,
        transport: Arc<MonitorTransport>,
    ) -> (Arc<Self>, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(64);

        let client = Arc::new(Self {
            self_id: UserId::from("console-bot"),
            owner,
            transport,
            events: tx,
        });

        (client, rx)
    }

    /// Turn stdin lines into chat traffic until input or the bot ends.
    pub fn start(self: &Arc<Self>) {
        let client = self.clone();

        tokio::spawn(async move {
            let _ = client.events.send(ChatEvent::Ready).await;

            // Seat the operator in the voice channel up front so `play`
            // works without a /presence dance.
            let seated = ChatEvent::VoiceState(VoiceState {
                guild: GuildId::from(CONSOLE_GUILD),
                user: client.owner.clone(),
                channel: Some(ChannelId::from(CONSOLE_VOICE_CHANNEL)),
            });
            let _ = client.events.send(seated).await;

            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(event) = client.parse_line(&line) {
                    if client.events.send(event).await.is_err() {
                        break;
                    }
                }
            }

            debug!("console input ended");
        });
    }

    fn parse_line(&self, line: &str) -> Option<ChatEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(directive) = line.strip_prefix("/presence ") {
            return self.parse_presence(directive);
        }

        Some(ChatEvent::Message(ChatMessage {
            guild: Some(GuildId::from(CONSOLE_GUILD)),
            channel: ChannelId::from(CONSOLE_CHANNEL),
            author: self.owner.clone(),
            content: line.to_string(),
        }))
    }

    fn parse_presence(&self, directive: &str) -> Option<ChatEvent> {
        let mut parts = directive.split_whitespace();
        let name = parts.next()?;
        let action = parts.next()?;

        let channel = match action {
            "join" => Some(ChannelId::from(CONSOLE_VOICE_CHANNEL)),
            "leave" => None,
            other => {
                warn!("unknown presence action {other:?}");
                return None;
            }
        };

        Some(ChatEvent::VoiceState(VoiceState {
            guild: GuildId::from(CONSOLE_GUILD),
            user: UserId::from(name),
            channel,
        }))
    }
}

#[async_trait]
impl ChatClient for ConsoleClient {
    fn self_id(&self) -> UserId {
        self.self_id.clone()
    }

    async fn send_message(&self, channel: &ChannelId, text: &str) -> Result<()> {
        println!("[{channel}] {text}");
        Ok(())
    }

    async fn member_name(&self, _guild: &GuildId, user: &UserId) -> Result<String> {
        Ok(user.to_string())
    }

    async fn join_voice(&self, dest: &Destination) -> Result<Arc<dyn VoiceTransport>> {
        debug!("console voice join for {dest}");
        Ok(self.transport.clone())
    }
}
