//! Matchday scheduling: window building, the periodic scheduler pass and
//! the nightly metadata refresh.

pub mod maintenance;
pub mod scheduler;
pub mod window;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::api::errors::ApiError;
use crate::chat::errors::ChatError;
use crate::data::models::WatchedCompetition;
use crate::state::scheduler_state::Windows;
use crate::state::store::{MatchFilter, MetadataStore, StoreError};

pub use maintenance::{MaintenanceConfig, MaintenanceScheduler, RefreshReport};
pub use scheduler::{MatchScheduler, MatchScore, SchedulerConfig};
pub use window::{build_windows, Bucket, ChannelState, MatchdayWindow, WindowConfig};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Unknown competition: {0}")]
    UnknownCompetition(String),

    #[error("No season found for competition {0}")]
    NoSeason(String),

    #[error("Already watching {0}")]
    AlreadyWatching(String),

    #[error("Not watching {0}")]
    NotWatching(String),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Build the windows of `watcher` from the persisted matches of its season.
/// Returns the competition's display name alongside.
pub(crate) fn windows_from_store(
    store: &dyn MetadataStore,
    watcher: &WatchedCompetition,
    now: DateTime<Utc>,
    config: &WindowConfig,
) -> (String, Windows) {
    let name = store
        .competition(&watcher.competition_id)
        .map(|c| c.name)
        .unwrap_or_else(|| watcher.competition_id.clone());
    let matches = store.find_matches(&MatchFilter::season(&watcher.competition_id, &watcher.season_id));
    let windows = build_windows(watcher, &name, &matches, now, config);
    (name, windows)
}
