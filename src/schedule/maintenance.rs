//! Nightly metadata refresh.
//!
//! Sleeps until the configured UTC hour, then, holding the write side of
//! the shared lock, refreshes federations, countries, competitions, and
//! the seasons and fixtures of every watched competition. Afterwards every
//! watcher's windows are rebuilt and installed. Each stage logs its failure
//! and the refresh carries on with what it has.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::api::source::SportsDataSource;
use crate::data::models::{Competition, Country, Federation, WatchedCompetition};
use crate::state::scheduler_state::{CompetitionSchedule, SchedulerState, WatchKey};
use crate::state::store::{MatchFilter, MetadataStore};

use super::window::WindowConfig;
use super::windows_from_store;

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// UTC hour at which the daily refresh runs.
    pub hour_utc: u32,
    /// Watchers refreshed concurrently.
    pub concurrency: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            hour_utc: 0,
            concurrency: 4,
        }
    }
}

/// Row counts of one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub federations: usize,
    pub countries: usize,
    pub competitions: usize,
    pub skipped_competitions: usize,
    pub seasons: usize,
    pub matches: usize,
    pub watchers_refreshed: usize,
    pub watchers_failed: usize,
    pub schedules_installed: usize,
}

/// Time from `now` until the next `hour:00` UTC, strictly in the future.
pub fn delay_until_next_run(now: DateTime<Utc>, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date_naive().and_time(at).and_utc();
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

fn fifa_federation() -> Federation {
    Federation {
        id: "FIFA".to_string(),
        name: "FIFA".to_string(),
        full_name: "Fédération Internationale de Football Association".to_string(),
    }
}

pub struct MaintenanceScheduler {
    state: Arc<SchedulerState>,
    store: Arc<dyn MetadataStore>,
    source: Arc<dyn SportsDataSource>,
    window_config: WindowConfig,
    config: MaintenanceConfig,
    shutdown: Arc<Notify>,
}

impl MaintenanceScheduler {
    pub fn new(
        state: Arc<SchedulerState>,
        store: Arc<dyn MetadataStore>,
        source: Arc<dyn SportsDataSource>,
        window_config: WindowConfig,
        config: MaintenanceConfig,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            state,
            store,
            source,
            window_config,
            config,
            shutdown,
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self: Arc<Self>) {
        loop {
            let delay = delay_until_next_run(Utc::now(), self.config.hour_utc);
            info!(
                hour_utc = self.config.hour_utc,
                in_minutes = delay.as_secs() / 60,
                "Next metadata refresh scheduled"
            );

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("MaintenanceScheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    self.refresh().await;
                }
            }
        }
    }

    /// Run one full refresh under the write lock.
    pub async fn refresh(&self) -> RefreshReport {
        let mut guard = self.state.write().await;
        let started = std::time::Instant::now();
        let mut report = RefreshReport::default();
        info!("Metadata refresh starting");

        // Federations
        let federations = match self.source.fetch_federations().await {
            Ok(mut feds) => {
                feds.push(fifa_federation());
                report.federations = self.store.upsert_federations(feds.clone());
                feds
            }
            Err(e) => {
                warn!(error = %e, "Federation refresh failed");
                Vec::new()
            }
        };

        // Countries, with every federation doubling as a country for
        // international competitions.
        match self.source.fetch_countries().await {
            Ok(mut countries) => {
                countries.extend(federations.iter().map(|f| Country {
                    id: f.id.clone(),
                    name: f.name.clone(),
                }));
                report.countries = self.store.upsert_countries(countries);
            }
            Err(e) => warn!(error = %e, "Country refresh failed"),
        }

        // Competitions
        match self.source.fetch_competitions().await {
            Ok(records) => {
                let mut rows = Vec::with_capacity(records.len());
                for rec in records {
                    if !self.store.has_federation(&rec.owner_id) {
                        warn!(competition = %rec.id, owner = %rec.owner_id, "Unknown federation, skipping competition");
                        report.skipped_competitions += 1;
                        continue;
                    }
                    let Some(country) = self.store.country(rec.country_key()) else {
                        warn!(competition = %rec.id, country = %rec.country_key(), "Unknown country, skipping competition");
                        report.skipped_competitions += 1;
                        continue;
                    };
                    rows.push(Competition {
                        id: rec.id,
                        federation_id: rec.owner_id,
                        country_id: Some(country.id),
                        name: rec.name,
                    });
                }
                report.competitions = self.store.upsert_competitions(rows);
            }
            Err(e) => warn!(error = %e, "Competition refresh failed"),
        }

        // Seasons and fixtures of every watched competition
        let watchers = self.store.watchers();
        let results: Vec<(usize, usize, bool)> = stream::iter(watchers)
            .map(|w| self.refresh_watcher(w))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        for (seasons, matches, ok) in results {
            report.seasons += seasons;
            report.matches += matches;
            if ok {
                report.watchers_refreshed += 1;
            } else {
                report.watchers_failed += 1;
            }
        }

        // Rebuild and install windows
        let now = Utc::now();
        for watcher in self.store.watchers() {
            let key = WatchKey::from(&watcher);
            let (name, windows) =
                windows_from_store(self.store.as_ref(), &watcher, now, &self.window_config);

            match guard.get(&key) {
                Some(existing) if existing.watcher.season_id == watcher.season_id => {
                    existing.replace_windows(windows, now, self.window_config.trail);
                }
                existing => {
                    if let Some(old) = existing {
                        info!(competition = %key, season = %watcher.season_id, "Season rolled over");
                        old.abort_pollers();
                    }
                    let schedule = CompetitionSchedule::new(watcher, name, BTreeMap::new());
                    schedule.replace_windows(windows, now, self.window_config.trail);
                    guard.insert(key, Arc::new(schedule));
                }
            }
            report.schedules_installed += 1;
        }

        if let Err(e) = self.store.flush() {
            warn!(error = %e, "Failed to persist metadata snapshot");
        }
        drop(guard);

        let upcoming = self
            .store
            .find_matches(&MatchFilter {
                from: Some(now),
                to: Some(now + ChronoDuration::hours(24)),
                ..MatchFilter::default()
            })
            .len();
        info!(
            federations = report.federations,
            countries = report.countries,
            competitions = report.competitions,
            skipped = report.skipped_competitions,
            matches = report.matches,
            watchers = report.watchers_refreshed,
            failed = report.watchers_failed,
            next_24h = upcoming,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Metadata refresh complete"
        );
        report
    }

    /// Fetch seasons, move the watcher to the latest one and fetch its
    /// fixtures. Returns `(seasons, matches, ok)`.
    async fn refresh_watcher(&self, mut watcher: WatchedCompetition) -> (usize, usize, bool) {
        let competition_id = watcher.competition_id.clone();

        let seasons = match self.source.fetch_seasons(&competition_id).await {
            Ok(rows) => self.store.upsert_seasons(rows),
            Err(e) => {
                warn!(competition = %competition_id, error = %e, "Season refresh failed");
                0
            }
        };

        if let Some(latest) = self.store.latest_season(&competition_id) {
            if latest.id != watcher.season_id {
                info!(
                    competition = %competition_id,
                    from = %watcher.season_id,
                    to = %latest.id,
                    "Advancing watcher to latest season"
                );
                watcher.season_id = latest.id;
                self.store.save_watcher(watcher.clone());
            }
        }

        match self.source.fetch_matches(&competition_id, &watcher.season_id).await {
            Ok(rows) => {
                let count = self.store.upsert_matches(rows);
                debug!(competition = %competition_id, season = %watcher.season_id, count, "Fixtures refreshed");
                (seasons, count, true)
            }
            Err(e) => {
                warn!(competition = %competition_id, error = %e, "Fixture refresh failed");
                (seasons, 0, false)
            }
        }
    }
}
