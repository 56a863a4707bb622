//! Match scheduler.
//!
//! Runs a pass over every watched competition in map order. For each
//! matchday window it opens or closes the channel, starts a poller for each
//! match whose kickoff is near, and retires pollers whose match is over.
//!
//! A pass holds the read side of the shared lock for one competition at a
//! time, so maintenance and add/remove-competition (writers) queue behind
//! it and never observe a half-processed competition.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::api::source::SportsDataSource;
use crate::chat::{canonical_channel_name, ChannelManager};
use crate::data::models::{MatchRow, WatchedCompetition};
use crate::live::poller::{wait_ready, Lifecycle, LiveMatchState, MatchPoller, MatchTarget, PollerConfig};
use crate::state::scheduler_state::{CompetitionSchedule, SchedulerState, WatchKey};
use crate::state::store::{MatchFilter, MetadataStore};

use super::window::{Bucket, ChannelState, WindowConfig};
use super::{windows_from_store, ScheduleError};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between two competitions within a pass.
    pub tick: Duration,
    /// Pause after a full pass.
    pub pass_sleep: Duration,
    /// A pass at least this long is followed by `throttle` instead.
    pub slow_pass: Duration,
    pub throttle: Duration,
    /// Pause after a failed pass.
    pub error_backoff: Duration,
    /// Upper bound on waiting for a new poller's first payload.
    pub readiness_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            pass_sleep: Duration::from_secs(60),
            slow_pass: Duration::from_secs(30),
            throttle: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            readiness_timeout: Duration::from_secs(120),
        }
    }
}

/// Score line of one match, as returned by score queries.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub match_id: String,
    pub title: String,
    pub minute: Option<String>,
    pub goals: Vec<String>,
}

/// Window facts read under the lock, acted on after it is released.
struct WindowView {
    open: bool,
    ended: bool,
    custom: bool,
    channel_state: ChannelState,
    channel_name: String,
    server_id: String,
    role_id: Option<String>,
    category: Option<String>,
}

// =============================================================================
// Scheduler
// =============================================================================

pub struct MatchScheduler {
    state: Arc<SchedulerState>,
    store: Arc<dyn MetadataStore>,
    source: Arc<dyn SportsDataSource>,
    channels: Arc<ChannelManager>,
    window_config: WindowConfig,
    poller_config: PollerConfig,
    config: SchedulerConfig,
    shutdown: Arc<Notify>,
}

impl MatchScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<SchedulerState>,
        store: Arc<dyn MetadataStore>,
        source: Arc<dyn SportsDataSource>,
        channels: Arc<ChannelManager>,
        window_config: WindowConfig,
        poller_config: PollerConfig,
        config: SchedulerConfig,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            state,
            store,
            source,
            channels,
            window_config,
            poller_config,
            config,
            shutdown,
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self: Arc<Self>) {
        info!(
            tick_s = self.config.tick.as_secs(),
            pass_sleep_s = self.config.pass_sleep.as_secs(),
            "MatchScheduler starting"
        );

        loop {
            let cycle = async {
                let started = Instant::now();
                match self.run_pass().await {
                    Ok(()) => {
                        let elapsed = started.elapsed();
                        let pause = if elapsed >= self.config.slow_pass {
                            warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow scheduler pass, throttling");
                            self.config.throttle
                        } else {
                            self.config.pass_sleep
                        };
                        tokio::time::sleep(pause).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Scheduler pass failed");
                        tokio::time::sleep(self.config.error_backoff).await;
                    }
                }
            };

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("MatchScheduler received shutdown signal");
                    break;
                }
                _ = cycle => {}
            }
        }

        self.state.abort_all().await;
        info!("MatchScheduler stopped");
    }

    /// One pass over every watched competition. A failing competition is
    /// logged and skipped; the first error is returned once the pass is done.
    pub async fn run_pass(&self) -> Result<(), ScheduleError> {
        let keys = self.state.keys().await;
        debug!(competitions = keys.len(), "Scheduler pass");

        let mut first_error = None;
        for (i, key) in keys.iter().enumerate() {
            if let Err(e) = self.process_competition(key, Utc::now()).await {
                warn!(competition = %key, error = %e, "Competition failed, continuing pass");
                first_error.get_or_insert(e);
            }
            if !self.config.tick.is_zero() && i + 1 < keys.len() {
                tokio::time::sleep(self.config.tick).await;
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Process every window of one competition as of `now`. A competition
    /// removed since the key snapshot is skipped.
    pub async fn process_competition(&self, key: &WatchKey, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let guard = self.state.read().await;
        let Some(schedule) = guard.get(key).cloned() else {
            debug!(competition = %key, "Competition no longer watched, skipping");
            return Ok(());
        };

        let matchdays: Vec<u32> = schedule.with_windows(|w| w.keys().copied().collect());
        for matchday in matchdays {
            self.process_window(&schedule, matchday, now).await?;
        }

        drop(guard);
        Ok(())
    }

    async fn process_window(
        &self,
        schedule: &CompetitionSchedule,
        matchday: u32,
        now: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        let extended_trail = self.window_config.extended_trail;
        let view = schedule.with_windows_and_pollers(|windows, pollers| {
            let window = windows.get_mut(&matchday)?;

            if window.has_ended(now) {
                let still_live = window.current.iter().any(|m| {
                    pollers.get(&m.id).is_some_and(|h| {
                        let s = h.snapshot();
                        s.running && s.went_live && s.lifecycle == Lifecycle::Live
                    })
                });
                if still_live && window.extend_end(extended_trail) {
                    info!(
                        competition = %window.competition_id,
                        matchday,
                        end = %window.end,
                        "Match still live, window extended"
                    );
                }
            }

            Some(WindowView {
                open: window.is_open_at(now),
                ended: window.has_ended(now),
                custom: window.custom_channel,
                channel_state: window.channel_state,
                channel_name: window.channel_name.clone(),
                server_id: window.server_id.clone(),
                role_id: window.role_id.clone(),
                category: window.category.clone(),
            })
        });
        let Some(view) = view else {
            return Ok(());
        };

        if view.open {
            self.channels
                .ensure_channel_open(
                    &view.server_id,
                    &view.channel_name,
                    view.role_id.as_deref(),
                    view.category.as_deref(),
                )
                .await?;
            if view.channel_state != ChannelState::Open {
                info!(competition = %schedule.key(), matchday, channel = %view.channel_name, "Matchday window open");
            }
            set_channel_state(schedule, matchday, ChannelState::Open);
            self.start_due_pollers(schedule, matchday, &view, now).await;
        }

        self.settle_current(schedule, matchday, now);

        if !view.open && view.channel_state != ChannelState::Closed {
            if !view.custom && view.ended {
                self.channels
                    .ensure_channel_closed(&view.server_id, &view.channel_name)
                    .await?;
                info!(competition = %schedule.key(), matchday, channel = %view.channel_name, "Matchday window closed");
            }
            set_channel_state(schedule, matchday, ChannelState::Closed);
        }

        Ok(())
    }

    /// Start a poller for every upcoming match whose own window has begun,
    /// waiting for each to become ready before moving it to current.
    async fn start_due_pollers(
        &self,
        schedule: &CompetitionSchedule,
        matchday: u32,
        view: &WindowView,
        now: DateTime<Utc>,
    ) {
        let lead = self.window_config.lead;
        let due: Vec<MatchRow> = schedule.with_windows_and_pollers(|windows, pollers| {
            windows
                .get(&matchday)
                .map(|w| {
                    w.upcoming
                        .iter()
                        .filter(|m| now >= m.kickoff - lead && !pollers.contains_key(&m.id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        });

        for row in due {
            let match_id = row.id.clone();
            let target = MatchTarget {
                row,
                server_id: view.server_id.clone(),
                channel_name: view.channel_name.clone(),
                competition_name: schedule.competition_name.clone(),
            };
            let handle = MatchPoller::spawn(
                target,
                self.source.clone(),
                self.channels.clone(),
                self.poller_config.clone(),
            );
            let readiness = handle.subscribe();
            schedule.register_poller(handle);

            if !wait_ready(readiness, self.config.readiness_timeout).await {
                warn!(match_id = %match_id, "Poller not ready before timeout");
            }

            schedule.with_windows(|windows| {
                if let Some(w) = windows.get_mut(&matchday) {
                    w.move_match(&match_id, Bucket::Upcoming, Bucket::Current);
                }
            });
            info!(competition = %schedule.key(), matchday, match_id = %match_id, "Match is current");
        }
    }

    /// Move finished current matches to passed and retire their pollers.
    fn settle_current(&self, schedule: &CompetitionSchedule, matchday: u32, now: DateTime<Utc>) {
        let trail = self.window_config.trail;
        schedule.with_windows_and_pollers(|windows, pollers| {
            let Some(window) = windows.get_mut(&matchday) else {
                return;
            };
            let window_ended = window.has_ended(now);
            let current: Vec<(String, DateTime<Utc>)> =
                window.current.iter().map(|m| (m.id.clone(), m.kickoff)).collect();

            for (match_id, kickoff) in current {
                let over = now >= kickoff + trail;
                match pollers.get(&match_id) {
                    Some(handle) => {
                        let state = handle.snapshot();
                        let exited = handle.has_exited() || state.lifecycle == Lifecycle::Finished;
                        if state.passed || (exited && over) {
                            window.move_match(&match_id, Bucket::Current, Bucket::Passed);
                            if let Some(handle) = pollers.remove(&match_id) {
                                window.results.insert(match_id.clone(), handle.snapshot());
                            }
                            info!(match_id = %match_id, aired = state.went_live, "Match passed, poller retired");
                        }
                    }
                    None if over || window_ended => {
                        window.move_match(&match_id, Bucket::Current, Bucket::Passed);
                    }
                    None => {
                        window.move_match(&match_id, Bucket::Current, Bucket::Upcoming);
                    }
                }
            }
        });
    }

    // =========================================================================
    // Watch management
    // =========================================================================

    /// Install freshly built windows for `watcher`, keeping scheduler
    /// progress if it is already watched.
    pub async fn add_competition(&self, watcher: WatchedCompetition) {
        let mut guard = self.state.write().await;
        let now = Utc::now();
        let trail = self.window_config.trail;
        let (name, windows) = windows_from_store(self.store.as_ref(), &watcher, now, &self.window_config);
        let key = WatchKey::from(&watcher);
        let count = windows.len();

        match guard.get(&key) {
            Some(existing) => existing.replace_windows(windows, now, trail),
            None => {
                let schedule = CompetitionSchedule::new(watcher, name, BTreeMap::new());
                schedule.replace_windows(windows, now, trail);
                guard.insert(key.clone(), Arc::new(schedule));
            }
        }
        info!(competition = %key, windows = count, "Competition scheduled");
    }

    /// Stop watching a competition: stop its pollers, close its open
    /// matchday channels and forget the watcher. Returns whether anything
    /// was being watched.
    pub async fn remove_competition(&self, competition_id: &str, server_id: &str) -> bool {
        let key = WatchKey::new(competition_id, server_id);
        let mut guard = self.state.write().await;

        let removed = guard.remove(&key);
        let persisted = self.store.remove_watcher(competition_id, server_id);
        if persisted {
            if let Err(e) = self.store.flush() {
                warn!(error = %e, "Failed to persist watcher removal");
            }
        }

        let Some(schedule) = removed else {
            info!(competition = %key, "Competition was not scheduled");
            return persisted;
        };
        schedule.abort_pollers();

        let to_close: Vec<(u32, String)> = schedule.with_windows(|windows| {
            windows
                .values()
                .filter(|w| !w.custom_channel && w.channel_state == ChannelState::Open)
                .map(|w| (w.matchday, w.channel_name.clone()))
                .collect()
        });
        for (matchday, name) in to_close {
            match self.channels.ensure_channel_closed(server_id, &name).await {
                Ok(_) => set_channel_state(&schedule, matchday, ChannelState::Closed),
                Err(e) => warn!(competition = %key, channel = %name, error = %e, "Failed to close channel"),
            }
        }

        drop(guard);
        info!(competition = %key, "Competition removed");
        true
    }

    /// Start watching `competition_id` on `server_id`, fetching its season
    /// and fixtures when they are not stored yet.
    pub async fn watch_competition(
        &self,
        competition_id: &str,
        server_id: &str,
        channel: Option<String>,
        role_id: Option<String>,
        category: Option<String>,
    ) -> Result<WatchedCompetition, ScheduleError> {
        let key = WatchKey::new(competition_id, server_id);
        if self.state.contains(&key).await {
            return Err(ScheduleError::AlreadyWatching(key.to_string()));
        }

        let competition = self
            .store
            .competition(competition_id)
            .ok_or_else(|| ScheduleError::UnknownCompetition(competition_id.to_string()))?;

        let season = match self.store.latest_season(competition_id) {
            Some(season) => season,
            None => {
                let seasons = self.source.fetch_seasons(competition_id).await?;
                self.store.upsert_seasons(seasons);
                self.store
                    .latest_season(competition_id)
                    .ok_or_else(|| ScheduleError::NoSeason(competition_id.to_string()))?
            }
        };

        if self
            .store
            .find_matches(&MatchFilter::season(competition_id, &season.id))
            .is_empty()
        {
            let rows = self.source.fetch_matches(competition_id, &season.id).await?;
            let count = self.store.upsert_matches(rows);
            debug!(competition = %competition_id, season = %season.id, count, "Fetched fixtures");
        }

        let watcher = WatchedCompetition {
            competition_id: competition_id.to_string(),
            season_id: season.id.clone(),
            server_id: server_id.to_string(),
            channel: channel.filter(|c| !c.trim().is_empty()),
            role_id: role_id.filter(|r| !r.trim().is_empty()),
            category: category.filter(|c| !c.trim().is_empty()),
        };
        self.store.save_watcher(watcher.clone());
        self.store.flush()?;

        self.add_competition(watcher.clone()).await;
        info!(
            competition = %competition.name,
            season = %season.name,
            server = %server_id,
            "Now watching competition"
        );
        Ok(watcher)
    }

    /// Schedule every persisted watcher. Returns how many were restored.
    pub async fn restore_watchers(&self) -> usize {
        let watchers = self.store.watchers();
        let count = watchers.len();
        for watcher in watchers {
            self.add_competition(watcher).await;
        }
        info!(count, "Restored watchers");
        count
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The competition and matchday a channel belongs to. For a custom
    /// channel shared by several matchdays, the open one wins, then the
    /// first that has not ended.
    pub async fn find_competition_matchday_by_channel(&self, channel: &str) -> Option<(WatchKey, u32)> {
        let wanted = canonical_channel_name(channel);
        let now = Utc::now();
        let guard = self.state.read().await;

        let mut candidates: Vec<(WatchKey, u32, ChannelState, bool)> = Vec::new();
        for (key, schedule) in guard.iter() {
            schedule.with_windows(|windows| {
                for w in windows.values().filter(|w| w.channel_name == wanted) {
                    candidates.push((key.clone(), w.matchday, w.channel_state, w.has_ended(now)));
                }
            });
        }

        candidates
            .iter()
            .find(|(_, _, state, _)| *state == ChannelState::Open)
            .or_else(|| candidates.iter().find(|(_, _, _, ended)| !ended))
            .or_else(|| candidates.last())
            .map(|(key, md, _, _)| (key.clone(), *md))
    }

    /// Score lines for every started or finished match of a matchday.
    pub async fn get_scores(&self, competition_id: &str, matchday: u32) -> Option<Vec<MatchScore>> {
        let guard = self.state.read().await;
        let schedule = guard
            .values()
            .find(|s| s.watcher.competition_id == competition_id)?
            .clone();
        drop(guard);

        schedule.with_windows_and_pollers(|windows, pollers| {
            let window = windows.get(&matchday)?;
            let mut rows: Vec<&MatchRow> = window.current.iter().chain(window.passed.iter()).collect();
            rows.sort_by_key(|m| m.kickoff);

            Some(
                rows.into_iter()
                    .map(|row| {
                        let state = pollers
                            .get(&row.id)
                            .map(|h| h.snapshot())
                            .or_else(|| window.results.get(&row.id).cloned());
                        match state {
                            Some(s) => MatchScore {
                                match_id: row.id.clone(),
                                title: s.title,
                                minute: s.minute,
                                goals: s.goals,
                            },
                            None => MatchScore {
                                match_id: row.id.clone(),
                                title: stored_title(row),
                                minute: None,
                                goals: Vec::new(),
                            },
                        }
                    })
                    .collect(),
            )
        })
    }

    /// Current matches whose poller has delivered at least one event.
    pub async fn started_matches(&self) -> Vec<MatchRow> {
        let guard = self.state.read().await;
        let mut started = Vec::new();
        for schedule in guard.values() {
            schedule.with_windows_and_pollers(|windows, pollers| {
                for w in windows.values() {
                    for m in &w.current {
                        let is_started = pollers.get(&m.id).is_some_and(|h| h.snapshot().started);
                        if is_started {
                            started.push(m.clone());
                        }
                    }
                }
            });
        }
        started.sort_by_key(|m| m.kickoff);
        started
    }

    /// Every upcoming match across all watched competitions, by kickoff.
    pub async fn upcoming_matches(&self) -> Vec<MatchRow> {
        let guard = self.state.read().await;
        let mut upcoming: Vec<MatchRow> = guard
            .values()
            .flat_map(|s| {
                s.with_windows(|windows| {
                    windows
                        .values()
                        .flat_map(|w| w.upcoming.iter().cloned())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        upcoming.sort_by_key(|m| m.kickoff);
        upcoming
    }

    /// Published state of every registered poller.
    pub async fn running_pollers(&self) -> Vec<LiveMatchState> {
        let guard = self.state.read().await;
        let mut states: Vec<LiveMatchState> = guard.values().flat_map(|s| s.poller_states()).collect();
        states.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        states
    }
}

fn set_channel_state(schedule: &CompetitionSchedule, matchday: u32, state: ChannelState) {
    schedule.with_windows(|windows| {
        if let Some(w) = windows.get_mut(&matchday) {
            w.channel_state = state;
        }
    });
}

fn stored_title(row: &MatchRow) -> String {
    match (row.home_score, row.away_score) {
        (Some(h), Some(a)) => format!("**{}** {} : {} **{}**", row.home_team, h, a, row.away_team),
        _ => row.title(),
    }
}
