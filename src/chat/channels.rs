//! Channel lifecycle: the only place channels are created or deleted.
//!
//! Both operations are idempotent. List-then-create and list-then-delete
//! sequences are serialized through one async lock so two callers can
//! never race each other into a duplicate channel.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::errors::ChatError;
use super::{canonical_channel_name, ChannelInfo, ChannelKind, ChatMessage, ChatPlatform, CreateChannel};

pub struct ChannelManager {
    chat: Arc<dyn ChatPlatform>,
    default_category: Option<String>,
    op_lock: Mutex<()>,
}

impl ChannelManager {
    pub fn new(chat: Arc<dyn ChatPlatform>, default_category: Option<String>) -> Self {
        Self {
            chat,
            default_category: default_category.filter(|c| !c.trim().is_empty()),
            op_lock: Mutex::new(()),
        }
    }

    /// Return the text channel called `name`, creating it (and its category)
    /// when absent.
    pub async fn ensure_channel_open(
        &self,
        server_id: &str,
        name: &str,
        role_id: Option<&str>,
        category: Option<&str>,
    ) -> Result<ChannelInfo, ChatError> {
        let canonical = canonical_channel_name(name);
        let _guard = self.op_lock.lock().await;

        let channels = self.chat.list_channels(server_id).await?;
        if let Some(existing) = find_text(&channels, &canonical) {
            debug!(server = %server_id, channel = %canonical, "Channel already open");
            return Ok(existing.clone());
        }

        let category = category
            .filter(|c| !c.trim().is_empty())
            .or(self.default_category.as_deref());
        let parent_id = match category {
            Some(category) => Some(self.ensure_category(server_id, category, &channels).await?),
            None => None,
        };

        let request = CreateChannel {
            name: canonical.clone(),
            kind: ChannelKind::Text,
            parent_id,
            restrict_to_role: role_id.filter(|r| !r.is_empty()).map(str::to_string),
        };
        let created = self.chat.create_channel(server_id, &request).await?;
        info!(
            server = %server_id,
            channel = %canonical,
            restricted = request.restrict_to_role.is_some(),
            "Opened matchday channel"
        );
        Ok(created)
    }

    async fn ensure_category(
        &self,
        server_id: &str,
        category: &str,
        channels: &[ChannelInfo],
    ) -> Result<String, ChatError> {
        let wanted = canonical_channel_name(category);
        if let Some(existing) = channels
            .iter()
            .find(|c| c.kind == ChannelKind::Category && canonical_channel_name(&c.name) == wanted)
        {
            return Ok(existing.id.clone());
        }

        let request = CreateChannel {
            name: category.trim().to_string(),
            kind: ChannelKind::Category,
            parent_id: None,
            restrict_to_role: None,
        };
        let created = self.chat.create_channel(server_id, &request).await?;
        info!(server = %server_id, category = %created.name, "Created channel category");
        Ok(created.id)
    }

    /// Delete every text channel called `name`. Returns whether anything
    /// was deleted.
    pub async fn ensure_channel_closed(&self, server_id: &str, name: &str) -> Result<bool, ChatError> {
        let canonical = canonical_channel_name(name);
        let _guard = self.op_lock.lock().await;

        let channels = self.chat.list_channels(server_id).await?;
        let mut deleted = false;
        for channel in channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Text && c.name == canonical)
        {
            match self.chat.delete_channel(server_id, &channel.id).await {
                Ok(()) => deleted = true,
                Err(ChatError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if deleted {
            info!(server = %server_id, channel = %canonical, "Closed matchday channel");
        }
        Ok(deleted)
    }

    /// Look up a text channel by name without side effects.
    pub async fn find_channel(&self, server_id: &str, name: &str) -> Result<Option<ChannelInfo>, ChatError> {
        let canonical = canonical_channel_name(name);
        let channels = self.chat.list_channels(server_id).await?;
        Ok(find_text(&channels, &canonical).cloned())
    }

    pub async fn post(&self, channel: &ChannelInfo, message: &ChatMessage) -> Result<(), ChatError> {
        self.chat.post_message(&channel.id, message).await
    }
}

fn find_text<'a>(channels: &'a [ChannelInfo], canonical: &str) -> Option<&'a ChannelInfo> {
    channels
        .iter()
        .find(|c| c.kind == ChannelKind::Text && c.name == canonical)
}
