//! Discord REST (v10) chat backend.
//!
//! Features:
//! - Bot token authentication
//! - Client-side rate limiting plus server-driven 429 backoff
//! - Automatic retries with exponential backoff on 5xx and network errors

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::errors::ChatError;
use super::{ChannelInfo, ChannelKind, ChatMessage, ChatPlatform, CreateChannel};

type DirectLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

const TYPE_GUILD_TEXT: u8 = 0;
const TYPE_GUILD_CATEGORY: u8 = 4;
const OVERWRITE_ROLE: u8 = 0;
const PERMISSION_VIEW_CHANNEL: u64 = 1 << 10;

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    parent_id: Option<String>,
}

impl DiscordChannel {
    fn into_info(self) -> Option<ChannelInfo> {
        let kind = match self.kind {
            TYPE_GUILD_TEXT => ChannelKind::Text,
            TYPE_GUILD_CATEGORY => ChannelKind::Category,
            _ => return None,
        };
        Some(ChannelInfo {
            id: self.id,
            name: self.name.unwrap_or_default(),
            kind,
            parent_id: self.parent_id,
        })
    }
}

pub struct DiscordClient {
    base_url: String,
    token: String,
    client: Client,
    rate_limiter: Arc<DirectLimiter>,
    max_retries: u32,
}

impl DiscordClient {
    pub fn new(
        base_url: &str,
        token: &str,
        rate_limit: u32,
        max_retries: u32,
        timeout_secs: u64,
    ) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let quota = Quota::per_second(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            max_retries: max_retries.max(1),
        })
    }

    pub fn with_defaults(base_url: &str, token: &str) -> Result<Self, ChatError> {
        Self::new(base_url, token, 5, 3, 15)
    }

    // =========================================================================
    // Core request method
    // =========================================================================

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ChatError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<ChatError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.until_ready().await;

            debug!(method = %method, path = %path, attempt = attempt + 1, "Discord request");

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| ChatError::Network(e.to_string()))?;
                        if text.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return serde_json::from_str(&text)
                            .map_err(|e| ChatError::Deserialization(e.to_string()));
                    }

                    if status.as_u16() == 429 {
                        let header_wait = response
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<f64>().ok());
                        let body_text = response.text().await.unwrap_or_default();
                        let retry_after = header_wait
                            .or_else(|| {
                                serde_json::from_str::<Value>(&body_text)
                                    .ok()?
                                    .get("retry_after")?
                                    .as_f64()
                            })
                            .unwrap_or(1.0);
                        warn!(retry_after, attempt = attempt + 1, "Discord rate limited");
                        tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
                        last_error = Some(ChatError::RateLimited { retry_after });
                        continue;
                    }

                    if status.is_server_error() {
                        let delay_ms = 500 * 2u64.pow(attempt);
                        warn!(
                            status_code = status.as_u16(),
                            delay_ms,
                            attempt = attempt + 1,
                            "Discord server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        last_error = Some(ChatError::Http {
                            status_code: status.as_u16(),
                            message: status.to_string(),
                        });
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(ChatError::from_response(status.as_u16(), &body_text));
                }
                Err(e) => {
                    let delay_ms = 500 * 2u64.pow(attempt);
                    warn!(error = %e, delay_ms, attempt = attempt + 1, "Discord network error, retrying");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    last_error = Some(ChatError::Network(e.to_string()));
                }
            }
        }

        Err(ChatError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Request body for channel creation.
fn create_body(server_id: &str, request: &CreateChannel) -> Value {
    let kind = match request.kind {
        ChannelKind::Text => TYPE_GUILD_TEXT,
        ChannelKind::Category => TYPE_GUILD_CATEGORY,
    };
    let mut body = json!({ "name": request.name, "type": kind });

    if let Some(parent) = &request.parent_id {
        body["parent_id"] = json!(parent);
    }
    // The @everyone role shares the guild id.
    if let Some(role) = &request.restrict_to_role {
        body["permission_overwrites"] = json!([
            {
                "id": server_id,
                "type": OVERWRITE_ROLE,
                "allow": "0",
                "deny": PERMISSION_VIEW_CHANNEL.to_string(),
            },
            {
                "id": role,
                "type": OVERWRITE_ROLE,
                "allow": PERMISSION_VIEW_CHANNEL.to_string(),
                "deny": "0",
            },
        ]);
    }
    body
}

fn message_body(message: &ChatMessage) -> Value {
    json!({
        "embeds": [{
            "author": { "name": message.author },
            "title": message.title,
            "description": message.content,
        }]
    })
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn list_channels(&self, server_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        let path = format!("/guilds/{}/channels", server_id);
        let data = self.request(Method::GET, &path, None).await?;
        let channels: Vec<DiscordChannel> =
            serde_json::from_value(data).map_err(|e| ChatError::Deserialization(e.to_string()))?;
        Ok(channels.into_iter().filter_map(DiscordChannel::into_info).collect())
    }

    async fn create_channel(
        &self,
        server_id: &str,
        request: &CreateChannel,
    ) -> Result<ChannelInfo, ChatError> {
        let path = format!("/guilds/{}/channels", server_id);
        let body = create_body(server_id, request);
        let data = self.request(Method::POST, &path, Some(&body)).await?;
        let channel: DiscordChannel =
            serde_json::from_value(data).map_err(|e| ChatError::Deserialization(e.to_string()))?;
        let info = channel
            .into_info()
            .ok_or_else(|| ChatError::Deserialization("unexpected channel type".to_string()))?;
        info!(server = %server_id, channel = %info.name, id = %info.id, "Discord channel created");
        Ok(info)
    }

    async fn delete_channel(&self, server_id: &str, channel_id: &str) -> Result<(), ChatError> {
        let path = format!("/channels/{}", channel_id);
        self.request(Method::DELETE, &path, None).await?;
        info!(server = %server_id, channel_id = %channel_id, "Discord channel deleted");
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, message: &ChatMessage) -> Result<(), ChatError> {
        let path = format!("/channels/{}/messages", channel_id);
        self.request(Method::POST, &path, Some(&message_body(message)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_with_role_restriction() {
        let body = create_body(
            "guild-1",
            &CreateChannel {
                name: "serie-a-matchday-3".to_string(),
                kind: ChannelKind::Text,
                parent_id: Some("cat-9".to_string()),
                restrict_to_role: Some("role-7".to_string()),
            },
        );
        assert_eq!(body["type"], 0);
        assert_eq!(body["parent_id"], "cat-9");
        let overwrites = body["permission_overwrites"].as_array().unwrap();
        assert_eq!(overwrites[0]["id"], "guild-1");
        assert_eq!(overwrites[0]["deny"], "1024");
        assert_eq!(overwrites[1]["id"], "role-7");
        assert_eq!(overwrites[1]["allow"], "1024");
    }

    #[test]
    fn test_create_body_plain_category() {
        let body = create_body(
            "guild-1",
            &CreateChannel {
                name: "Football".to_string(),
                kind: ChannelKind::Category,
                parent_id: None,
                restrict_to_role: None,
            },
        );
        assert_eq!(body["type"], 4);
        assert!(body.get("parent_id").is_none());
        assert!(body.get("permission_overwrites").is_none());
    }

    #[test]
    fn test_voice_channels_are_ignored() {
        let raw = r#"[
            {"id": "1", "name": "general", "type": 0, "parent_id": null},
            {"id": "2", "name": "Voice", "type": 2},
            {"id": "3", "name": "Football", "type": 4}
        ]"#;
        let channels: Vec<DiscordChannel> = serde_json::from_str(raw).unwrap();
        let infos: Vec<ChannelInfo> = channels.into_iter().filter_map(DiscordChannel::into_info).collect();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].kind, ChannelKind::Category);
    }
}
