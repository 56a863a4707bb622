//! Channel lifecycle against the paper chat backend.

use std::sync::Arc;

use matchday_streamer::chat::{ChannelKind, ChannelManager, ChatPlatform, CreateChannel, PaperChat};

const SERVER: &str = "guild-1";

fn manager(default_category: Option<&str>) -> (Arc<PaperChat>, ChannelManager) {
    let chat = Arc::new(PaperChat::new());
    let manager = ChannelManager::new(chat.clone(), default_category.map(str::to_string));
    (chat, manager)
}

#[tokio::test]
async fn test_open_is_idempotent() {
    let (chat, channels) = manager(None);

    let first = channels
        .ensure_channel_open(SERVER, "Premier League Matchday 3", None, None)
        .await
        .unwrap();
    let second = channels
        .ensure_channel_open(SERVER, "premier-league-matchday-3", None, None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.name, "premier-league-matchday-3");
    assert_eq!(chat.create_count(), 1);
    assert_eq!(chat.text_channel_names(SERVER), vec!["premier-league-matchday-3"]);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (chat, channels) = manager(None);
    channels
        .ensure_channel_open(SERVER, "cup-matchday-1", None, None)
        .await
        .unwrap();

    assert!(channels.ensure_channel_closed(SERVER, "Cup Matchday 1").await.unwrap());
    assert!(!channels.ensure_channel_closed(SERVER, "cup-matchday-1").await.unwrap());
    assert_eq!(chat.delete_count(), 1);
    assert!(chat.text_channel_names(SERVER).is_empty());

    // Closing on a server that never had channels is not an error.
    assert!(!channels.ensure_channel_closed("other", "cup-matchday-1").await.unwrap());
}

#[tokio::test]
async fn test_close_removes_duplicates() {
    let (chat, channels) = manager(None);
    let request = CreateChannel {
        name: "dup".to_string(),
        kind: ChannelKind::Text,
        parent_id: None,
        restrict_to_role: None,
    };
    chat.create_channel(SERVER, &request).await.unwrap();
    chat.create_channel(SERVER, &request).await.unwrap();

    assert!(channels.ensure_channel_closed(SERVER, "dup").await.unwrap());
    assert_eq!(chat.delete_count(), 2);
}

#[tokio::test]
async fn test_category_created_once_and_reused() {
    let (chat, channels) = manager(None);

    let a = channels
        .ensure_channel_open(SERVER, "league-matchday-1", None, Some("La Liga"))
        .await
        .unwrap();
    let b = channels
        .ensure_channel_open(SERVER, "league-matchday-2", None, Some("la liga"))
        .await
        .unwrap();

    let categories: Vec<_> = chat
        .channels(SERVER)
        .into_iter()
        .filter(|c| c.kind == ChannelKind::Category)
        .collect();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "La Liga");
    assert_eq!(a.parent_id.as_deref(), Some(categories[0].id.as_str()));
    assert_eq!(b.parent_id, a.parent_id);
}

#[tokio::test]
async fn test_default_category_applies() {
    let (chat, channels) = manager(Some("Football"));

    let ch = channels
        .ensure_channel_open(SERVER, "serie-a-matchday-1", None, None)
        .await
        .unwrap();
    let category = chat
        .channels(SERVER)
        .into_iter()
        .find(|c| c.kind == ChannelKind::Category)
        .unwrap();
    assert_eq!(category.name, "Football");
    assert_eq!(ch.parent_id, Some(category.id));
}

#[tokio::test]
async fn test_role_restriction() {
    let (chat, channels) = manager(None);

    let ch = channels
        .ensure_channel_open(SERVER, "members-only", Some("role-42"), None)
        .await
        .unwrap();
    assert_eq!(chat.restricted_role(&ch.id).as_deref(), Some("role-42"));

    let open = channels
        .ensure_channel_open(SERVER, "everyone", None, None)
        .await
        .unwrap();
    assert!(chat.restricted_role(&open.id).is_none());
}

#[tokio::test]
async fn test_concurrent_opens_create_one_channel() {
    let (chat, channels) = manager(None);
    let channels = Arc::new(channels);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let channels = channels.clone();
            tokio::spawn(async move {
                channels
                    .ensure_channel_open(SERVER, "race-matchday-1", None, None)
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(chat.create_count(), 1);
}
