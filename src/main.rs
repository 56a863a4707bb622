//! Matchday Streamer
//!
//! Follows football competitions and streams their matches into chat.
//!
//! Architecture:
//! - Tokio async runtime for concurrent I/O
//! - Metadata store refreshed nightly from the sports data API
//! - One chat channel per competition matchday, opened ahead of the first
//!   kickoff and closed after the last match
//! - One live poller per match, posting each new event as it happens
//! - Paper and Discord chat backends

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use matchday_streamer::api::client::FifaClient;
use matchday_streamer::api::source::SportsDataSource;
use matchday_streamer::chat::discord::DiscordClient;
use matchday_streamer::chat::paper::PaperChat;
use matchday_streamer::chat::{ChannelManager, ChatPlatform};
use matchday_streamer::config::{ChatMode, Settings};
use matchday_streamer::schedule::{MaintenanceScheduler, MatchScheduler, ScheduleError};
use matchday_streamer::state::{MemoryStore, MetadataStore, SchedulerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration.
    let settings = Settings::from_env();

    // Initialize logging.
    init_logging(&settings);

    info!("=== Matchday Streamer ===");
    info!(
        chat_mode = ?settings.chat_mode,
        sports_api = %settings.sports_api_url,
        watchers = settings.watch_competitions.len(),
        "Configuration loaded"
    );

    // Validate settings.
    if let Err(errors) = settings.validate() {
        for e in &errors {
            error!(error = %e, "Configuration error");
        }
        anyhow::bail!("Configuration validation failed");
    }

    // Metadata store.
    let store: Arc<dyn MetadataStore> = match settings.store_path() {
        Some(path) => Arc::new(
            MemoryStore::open(path).with_context(|| format!("Failed to open store at {path}"))?,
        ),
        None => {
            info!("No STORE_PATH configured, metadata is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    // Sports data API.
    let source: Arc<dyn SportsDataSource> = Arc::new(FifaClient::new(
        &settings.sports_api_url,
        &settings.live_api_url,
        settings.api_rate_limit,
        settings.api_max_retries,
        settings.api_timeout_secs,
    )?);

    // Chat backend.
    let chat: Arc<dyn ChatPlatform> = match settings.chat_mode {
        ChatMode::Paper => {
            info!("Paper chat initialized (NO messages will reach Discord)");
            Arc::new(PaperChat::new())
        }
        ChatMode::Discord => Arc::new(DiscordClient::new(
            &settings.discord_api_url,
            &settings.discord_token,
            settings.api_rate_limit,
            settings.api_max_retries,
            settings.api_timeout_secs,
        )?),
    };
    let channels = Arc::new(ChannelManager::new(chat, settings.default_category()));

    let shutdown = Arc::new(Notify::new());
    let state = Arc::new(SchedulerState::new());

    let scheduler = Arc::new(MatchScheduler::new(
        state.clone(),
        store.clone(),
        source.clone(),
        channels,
        settings.window_config(),
        settings.poller_config(),
        settings.scheduler_config(),
        shutdown.clone(),
    ));
    let maintenance = Arc::new(MaintenanceScheduler::new(
        state.clone(),
        store.clone(),
        source,
        settings.window_config(),
        settings.maintenance_config(),
        shutdown.clone(),
    ));

    // =========================================================================
    // Watchers
    // =========================================================================
    let restored = scheduler.restore_watchers().await;
    info!(restored, "Restored persisted watchers");

    if settings.refresh_on_startup {
        let report = maintenance.refresh().await;
        info!(report = ?report, "Startup metadata refresh done");
    }

    for entry in &settings.watch_competitions {
        match scheduler
            .watch_competition(&entry.competition_id, &entry.server_id, None, None, entry.category.clone())
            .await
        {
            Ok(watcher) => info!(
                competition = %watcher.competition_id,
                season = %watcher.season_id,
                server = %watcher.server_id,
                "Bootstrap watcher added"
            ),
            Err(ScheduleError::AlreadyWatching(key)) => {
                info!(competition = %key, "Bootstrap watcher already present")
            }
            Err(e) => warn!(
                competition = %entry.competition_id,
                server = %entry.server_id,
                error = %e,
                "Failed to add bootstrap watcher"
            ),
        }
    }

    // Shutdown signal.
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl+c");
        }
        info!("Shutdown signal received");
        shutdown_clone.notify_waiters();
    });

    // =========================================================================
    // Run
    // =========================================================================
    info!(competitions = state.len().await, "Starting schedulers");
    let scheduler_task = scheduler.spawn();
    let maintenance_task = maintenance.spawn();

    let (scheduler_res, maintenance_res) = tokio::join!(scheduler_task, maintenance_task);
    if let Err(e) = scheduler_res {
        error!(error = %e, "Scheduler task failed");
    }
    if let Err(e) = maintenance_res {
        error!(error = %e, "Maintenance task failed");
    }

    // Graceful shutdown.
    info!("Shutting down...");
    if let Err(e) = store.flush() {
        warn!(error = %e, "Failed to persist store on shutdown");
    }
    info!("Shutdown complete.");

    Ok(())
}

fn init_logging(settings: &Settings) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    if settings.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
