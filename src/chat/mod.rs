//! Chat platform boundary.
//!
//! `ChatPlatform` is the narrow surface the engine needs: list, create and
//! delete channels on a server, and post a message into a channel. Two
//! backends exist: `DiscordClient` (REST) and `PaperChat` (in-memory).

pub mod channels;
pub mod discord;
pub mod errors;
pub mod paper;
pub mod render;

use async_trait::async_trait;

pub use channels::ChannelManager;
pub use discord::DiscordClient;
pub use errors::ChatError;
pub use paper::PaperChat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Category,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<String>,
}

/// Request to create a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<String>,
    /// When set, `@everyone` is denied view access and this role is allowed.
    pub restrict_to_role: Option<String>,
}

/// A rendered message: an embed with an author line, a title and a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub author: String,
    pub title: String,
    pub content: String,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn list_channels(&self, server_id: &str) -> Result<Vec<ChannelInfo>, ChatError>;

    async fn create_channel(
        &self,
        server_id: &str,
        request: &CreateChannel,
    ) -> Result<ChannelInfo, ChatError>;

    async fn delete_channel(&self, server_id: &str, channel_id: &str) -> Result<(), ChatError>;

    async fn post_message(&self, channel_id: &str, message: &ChatMessage) -> Result<(), ChatError>;
}

/// Canonical text-channel name: trimmed, lower-case, whitespace runs
/// collapsed to a single dash.
pub fn canonical_channel_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}
