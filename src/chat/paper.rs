//! Paper (in-memory) chat backend.
//!
//! Simulates a chat server without talking to Discord. Used for dry runs
//! (`CHAT_MODE=paper`) and as the backend of the integration tests, which
//! inspect what was created, deleted and posted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use super::errors::ChatError;
use super::{ChannelInfo, ChannelKind, ChatMessage, ChatPlatform, CreateChannel};

/// A message recorded by the paper backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel_id: String,
    pub channel_name: String,
    pub message: ChatMessage,
}

#[derive(Debug, Default)]
struct Inner {
    servers: HashMap<String, Vec<ChannelInfo>>,
    restricted: HashMap<String, String>,
    posts: Vec<PostedMessage>,
}

#[derive(Debug, Default)]
pub struct PaperChat {
    inner: Mutex<Inner>,
    id_counter: AtomicU64,

    // Counters
    creates: AtomicU64,
    deletes: AtomicU64,
    failing_posts: AtomicU32,
}

impl PaperChat {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_channel_id(&self) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("paper-{:06}", n)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn channels(&self, server_id: &str) -> Vec<ChannelInfo> {
        self.lock().servers.get(server_id).cloned().unwrap_or_default()
    }

    pub fn text_channel_names(&self, server_id: &str) -> Vec<String> {
        self.channels(server_id)
            .into_iter()
            .filter(|c| c.kind == ChannelKind::Text)
            .map(|c| c.name)
            .collect()
    }

    /// Role a channel was restricted to at creation, if any.
    pub fn restricted_role(&self, channel_id: &str) -> Option<String> {
        self.lock().restricted.get(channel_id).cloned()
    }

    pub fn posts(&self) -> Vec<PostedMessage> {
        self.lock().posts.clone()
    }

    pub fn posts_in(&self, channel_name: &str) -> Vec<PostedMessage> {
        self.lock()
            .posts
            .iter()
            .filter(|p| p.channel_name == channel_name)
            .cloned()
            .collect()
    }

    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Make the next `n` posts fail with a network error.
    pub fn fail_next_posts(&self, n: u32) {
        self.failing_posts.store(n, Ordering::Relaxed);
    }
}

#[async_trait]
impl ChatPlatform for PaperChat {
    async fn list_channels(&self, server_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        Ok(self.channels(server_id))
    }

    async fn create_channel(
        &self,
        server_id: &str,
        request: &CreateChannel,
    ) -> Result<ChannelInfo, ChatError> {
        let info = ChannelInfo {
            id: self.next_channel_id(),
            name: request.name.clone(),
            kind: request.kind,
            parent_id: request.parent_id.clone(),
        };

        let mut inner = self.lock();
        if let Some(role) = &request.restrict_to_role {
            inner.restricted.insert(info.id.clone(), role.clone());
        }
        inner
            .servers
            .entry(server_id.to_string())
            .or_default()
            .push(info.clone());
        drop(inner);

        self.creates.fetch_add(1, Ordering::Relaxed);
        info!(server = %server_id, channel = %info.name, kind = ?info.kind, "[PAPER] Channel created");
        Ok(info)
    }

    async fn delete_channel(&self, server_id: &str, channel_id: &str) -> Result<(), ChatError> {
        let mut inner = self.lock();
        let channels = inner
            .servers
            .get_mut(server_id)
            .ok_or_else(|| ChatError::NotFound(channel_id.to_string()))?;
        let before = channels.len();
        channels.retain(|c| c.id != channel_id);
        if channels.len() == before {
            return Err(ChatError::NotFound(channel_id.to_string()));
        }
        inner.restricted.remove(channel_id);
        drop(inner);

        self.deletes.fetch_add(1, Ordering::Relaxed);
        info!(server = %server_id, channel_id = %channel_id, "[PAPER] Channel deleted");
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, message: &ChatMessage) -> Result<(), ChatError> {
        let failing = self.failing_posts.load(Ordering::Relaxed);
        if failing > 0 {
            self.failing_posts.store(failing - 1, Ordering::Relaxed);
            return Err(ChatError::Network("simulated send failure".to_string()));
        }

        let mut inner = self.lock();
        let channel_name = inner
            .servers
            .values()
            .flatten()
            .find(|c| c.id == channel_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| ChatError::NotFound(channel_id.to_string()))?;

        info!(channel = %channel_name, title = %message.title, "[PAPER] Message posted");
        inner.posts.push(PostedMessage {
            channel_id: channel_id.to_string(),
            channel_name,
            message: message.clone(),
        });
        Ok(())
    }
}
