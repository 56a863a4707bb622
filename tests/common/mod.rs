//! Shared fixtures for the integration tests: a scripted sports-data source
//! and builders for metadata rows and live payloads.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use matchday_streamer::api::errors::ApiError;
use matchday_streamer::api::source::SportsDataSource;
use matchday_streamer::data::live::{EventRecord, LineupPlayer, LineupTeams, Lineups, LiveMatchPayload};
use matchday_streamer::data::models::{
    Competition, CompetitionRecord, Country, Federation, MatchRow, MatchStatus, Season,
    WatchedCompetition,
};
use matchday_streamer::live::PollerConfig;
use matchday_streamer::schedule::{SchedulerConfig, WindowConfig};

// =============================================================================
// Scripted source
// =============================================================================

/// One scripted answer of the live endpoint.
#[derive(Debug, Clone)]
pub enum LiveStep {
    Payload(LiveMatchPayload),
    Fail,
}

/// A `SportsDataSource` that answers from fixed data. Live answers are
/// consumed in order per match; the last one repeats.
#[derive(Default)]
pub struct ScriptedSource {
    pub federations: Vec<Federation>,
    pub countries: Vec<Country>,
    pub competitions: Vec<CompetitionRecord>,
    pub seasons: Vec<Season>,
    pub matches: Vec<MatchRow>,
    live: Mutex<HashMap<String, VecDeque<LiveStep>>>,
    default_live: Mutex<Option<LiveStep>>,
    /// When set, each live fetch waits for a permit.
    live_gate: Option<Arc<Semaphore>>,
    pub live_calls: AtomicUsize,
    /// When set, each federation fetch waits for a permit.
    federation_gate: Option<Arc<Semaphore>>,
    pub federation_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.live_gate = Some(gate);
        self
    }

    pub fn with_federation_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.federation_gate = Some(gate);
        self
    }

    pub fn script(&self, match_id: &str, steps: Vec<LiveStep>) {
        self.live
            .lock()
            .unwrap()
            .insert(match_id.to_string(), steps.into_iter().collect());
    }

    /// Answer for matches without a script.
    pub fn set_default_live(&self, step: LiveStep) {
        *self.default_live.lock().unwrap() = Some(step);
    }

    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::SeqCst)
    }

    fn next_live(&self, match_id: &str) -> LiveStep {
        let mut live = self.live.lock().unwrap();
        if let Some(queue) = live.get_mut(match_id) {
            if queue.len() > 1 {
                if let Some(step) = queue.pop_front() {
                    return step;
                }
            }
            if let Some(step) = queue.front() {
                return step.clone();
            }
        }
        self.default_live.lock().unwrap().clone().unwrap_or(LiveStep::Fail)
    }
}

#[async_trait]
impl SportsDataSource for ScriptedSource {
    async fn fetch_federations(&self) -> Result<Vec<Federation>, ApiError> {
        self.federation_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.federation_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
        }
        Ok(self.federations.clone())
    }

    async fn fetch_countries(&self) -> Result<Vec<Country>, ApiError> {
        Ok(self.countries.clone())
    }

    async fn fetch_competitions(&self) -> Result<Vec<CompetitionRecord>, ApiError> {
        Ok(self.competitions.clone())
    }

    async fn fetch_seasons(&self, competition_id: &str) -> Result<Vec<Season>, ApiError> {
        Ok(self
            .seasons
            .iter()
            .filter(|s| s.competition_id == competition_id)
            .cloned()
            .collect())
    }

    async fn fetch_matches(&self, competition_id: &str, season_id: &str) -> Result<Vec<MatchRow>, ApiError> {
        Ok(self
            .matches
            .iter()
            .filter(|m| m.competition_id == competition_id && m.season_id == season_id)
            .cloned()
            .collect())
    }

    async fn fetch_live_match(&self, match_id: &str) -> Result<LiveMatchPayload, ApiError> {
        if let Some(gate) = &self.live_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
        }
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_live(match_id) {
            LiveStep::Payload(p) => Ok(p),
            LiveStep::Fail => Err(ApiError::Deserialization(format!("bad payload for {match_id}"))),
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn competition(id: &str, name: &str) -> Competition {
    Competition {
        id: id.to_string(),
        federation_id: "UEFA".to_string(),
        country_id: Some("ENG".to_string()),
        name: name.to_string(),
    }
}

pub fn season(id: &str, competition_id: &str, year: i32) -> Season {
    Season {
        id: id.to_string(),
        competition_id: competition_id.to_string(),
        name: format!("{year}/{}", year + 1),
        start_date: Utc.with_ymd_and_hms(year, 8, 1, 0, 0, 0).unwrap(),
        end_date: Utc.with_ymd_and_hms(year + 1, 5, 31, 0, 0, 0).unwrap(),
    }
}

pub fn match_row(
    id: &str,
    competition_id: &str,
    season_id: &str,
    matchday: u32,
    kickoff: DateTime<Utc>,
) -> MatchRow {
    MatchRow {
        id: id.to_string(),
        competition_id: competition_id.to_string(),
        season_id: season_id.to_string(),
        matchday: Some(matchday),
        kickoff,
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        home_score: None,
        away_score: None,
        status: MatchStatus::Scheduled,
    }
}

pub fn watcher(competition_id: &str, season_id: &str, server_id: &str) -> WatchedCompetition {
    WatchedCompetition {
        competition_id: competition_id.to_string(),
        season_id: season_id.to_string(),
        server_id: server_id.to_string(),
        channel: None,
        role_id: None,
        category: None,
    }
}

/// A goal by `player` of the home side.
pub fn goal(id: &str, minute: &str, player: &str) -> EventRecord {
    EventRecord {
        event_id: Some(id.to_string()),
        event_code: 3,
        event_description: Some("Goal!".to_string()),
        event_description_short: None,
        phase_description_short: Some("1H".to_string()),
        minute: Some(minute.to_string()),
        team_name: Some("Home".to_string()),
        player_name: Some(player.to_string()),
        player_to_name: None,
    }
}

pub fn payload(is_live: bool, is_finished: bool, events: Vec<EventRecord>) -> LiveMatchPayload {
    LiveMatchPayload {
        is_finished,
        is_live,
        has_lineup: false,
        minute: is_live.then(|| "12'".to_string()),
        events,
        score_home: Some(0),
        score_away: Some(0),
        team_home_name: "Home".to_string(),
        team_away_name: "Away".to_string(),
        lineups: None,
    }
}

pub fn with_lineups(mut p: LiveMatchPayload) -> LiveMatchPayload {
    let player = |name: &str, number: &str, gk: bool, captain: bool| LineupPlayer {
        person_name: name.to_string(),
        shirt_number: Some(number.to_string()),
        is_captain: captain,
        is_goal_keeper: gk,
        is_coach: false,
        starting_line_up: true,
    };
    p.has_lineup = true;
    p.lineups = Some(Lineups {
        teams: LineupTeams {
            home: vec![player("Keeper", "1", true, false), player("Striker", "9", false, true)],
            away: vec![player("Goalie", "1", true, true)],
        },
    });
    p
}

// =============================================================================
// Fast configs
// =============================================================================

pub fn fast_poller_config() -> PollerConfig {
    PollerConfig {
        prematch_interval: Duration::from_millis(20),
        live_interval: Duration::from_millis(10),
        extra_cycles: 0,
        send_retry_backoff: Duration::from_millis(10),
        trail: ChronoDuration::hours(3),
    }
}

pub fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        tick: Duration::ZERO,
        pass_sleep: Duration::from_millis(10),
        slow_pass: Duration::from_secs(30),
        throttle: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        readiness_timeout: Duration::from_secs(5),
    }
}

pub fn window_config() -> WindowConfig {
    WindowConfig::default()
}
