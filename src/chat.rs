use std::fmt::{Display, Formatter};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::transport::VoiceTransport;

macro_rules! id_type {
    ($name:ident) => {
        /// Opaque chat-service identifier.
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
        pub struct $name(pub String);

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

id_type!(GuildId);
id_type!(ChannelId);
id_type!(UserId);

/// Where audio goes: a guild plus one of its voice channels.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    pub guild: GuildId,
    pub channel: ChannelId,
}

impl Display for Destination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.guild, self.channel)
    }
}

#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub guild: Option<GuildId>,
    pub channel: ChannelId,
    pub author: UserId,
    pub content: String,
}

/// A participant's voice-channel occupancy at some instant. `channel` of
/// `None` means they are not in any voice channel.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceState {
    pub guild: GuildId,
    pub user: UserId,
    pub channel: Option<ChannelId>,
}

/// Everything the protocol client pushes at us.
#[derive(Clone, Debug)]
pub enum ChatEvent {
    /// The connection is up and events will flow.
    Ready,
    Message(ChatMessage),
    VoiceState(VoiceState),
    /// A participant's transmissions carry this synchronization source.
    Speaking {
        guild: GuildId,
        user: UserId,
        ssrc: u32,
    },
}

/// The chat protocol client. The bot never talks to a chat service
/// directly; everything goes through this seam, which also makes the whole
/// glue layer testable without a network.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// The bot's own user id, for ignoring its own traffic.
    fn self_id(&self) -> UserId;

    async fn send_message(&self, channel: &ChannelId, text: &str) -> Result<()>;

    /// Display name of a guild member.
    async fn member_name(&self, guild: &GuildId, user: &UserId) -> Result<String>;

    /// Join the destination's voice channel, or return the existing
    /// connection when already joined somewhere in that guild.
    async fn join_voice(&self, dest: &Destination) -> Result<Arc<dyn VoiceTransport>>;
}
