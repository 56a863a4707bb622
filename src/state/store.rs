//! Metadata store: federations, countries, competitions, seasons, matches
//! and watcher rows.
//!
//! `MemoryStore` keeps everything in memory behind one `RwLock` and can
//! snapshot itself to a JSON file so watchers survive a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::models::{
    Competition, Country, Federation, MatchRow, MatchStatus, Season, WatchedCompetition,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Query over persisted matches. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub competition_id: Option<String>,
    pub season_id: Option<String>,
    pub status: Option<MatchStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl MatchFilter {
    pub fn season(competition_id: &str, season_id: &str) -> Self {
        Self {
            competition_id: Some(competition_id.to_string()),
            season_id: Some(season_id.to_string()),
            ..Self::default()
        }
    }

    fn matches(&self, row: &MatchRow) -> bool {
        self.competition_id.as_ref().map_or(true, |c| &row.competition_id == c)
            && self.season_id.as_ref().map_or(true, |s| &row.season_id == s)
            && self.status.map_or(true, |s| row.status == s)
            && self.from.map_or(true, |from| row.kickoff >= from)
            && self.to.map_or(true, |to| row.kickoff < to)
    }
}

pub trait MetadataStore: Send + Sync {
    fn upsert_federations(&self, rows: Vec<Federation>) -> usize;
    fn upsert_countries(&self, rows: Vec<Country>) -> usize;
    fn upsert_competitions(&self, rows: Vec<Competition>) -> usize;
    fn upsert_seasons(&self, rows: Vec<Season>) -> usize;
    fn upsert_matches(&self, rows: Vec<MatchRow>) -> usize;

    fn has_federation(&self, id: &str) -> bool;
    fn country(&self, id: &str) -> Option<Country>;
    fn competition(&self, id: &str) -> Option<Competition>;
    /// Season of `competition_id` with the latest start date.
    fn latest_season(&self, competition_id: &str) -> Option<Season>;
    /// Matching rows ordered by kickoff.
    fn find_matches(&self, filter: &MatchFilter) -> Vec<MatchRow>;

    fn watchers(&self) -> Vec<WatchedCompetition>;
    fn watcher(&self, competition_id: &str, server_id: &str) -> Option<WatchedCompetition>;
    fn save_watcher(&self, watcher: WatchedCompetition);
    fn remove_watcher(&self, competition_id: &str, server_id: &str) -> bool;

    fn flush(&self) -> Result<(), StoreError>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct Inner {
    #[serde(default)]
    federations: HashMap<String, Federation>,
    #[serde(default)]
    countries: HashMap<String, Country>,
    #[serde(default)]
    competitions: HashMap<String, Competition>,
    #[serde(default)]
    seasons: HashMap<String, Season>,
    #[serde(default)]
    matches: HashMap<String, MatchRow>,
    #[serde(default)]
    watchers: Vec<WatchedCompetition>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading the snapshot when it exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let inner: Inner = serde_json::from_str(&raw)?;
            info!(
                path = %path.display(),
                competitions = inner.competitions.len(),
                matches = inner.matches.len(),
                watchers = inner.watchers.len(),
                "Loaded metadata snapshot"
            );
            inner
        } else {
            Inner::default()
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            snapshot: Some(path),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn upsert<T>(map: &mut HashMap<String, T>, rows: Vec<T>, key: impl Fn(&T) -> String) -> usize {
    let count = rows.len();
    for row in rows {
        map.insert(key(&row), row);
    }
    count
}

impl MetadataStore for MemoryStore {
    fn upsert_federations(&self, rows: Vec<Federation>) -> usize {
        upsert(&mut self.write().federations, rows, |r| r.id.clone())
    }

    fn upsert_countries(&self, rows: Vec<Country>) -> usize {
        upsert(&mut self.write().countries, rows, |r| r.id.clone())
    }

    fn upsert_competitions(&self, rows: Vec<Competition>) -> usize {
        upsert(&mut self.write().competitions, rows, |r| r.id.clone())
    }

    fn upsert_seasons(&self, rows: Vec<Season>) -> usize {
        upsert(&mut self.write().seasons, rows, |r| r.id.clone())
    }

    fn upsert_matches(&self, rows: Vec<MatchRow>) -> usize {
        upsert(&mut self.write().matches, rows, |r| r.id.clone())
    }

    fn has_federation(&self, id: &str) -> bool {
        self.read().federations.contains_key(id)
    }

    fn country(&self, id: &str) -> Option<Country> {
        self.read().countries.get(id).cloned()
    }

    fn competition(&self, id: &str) -> Option<Competition> {
        self.read().competitions.get(id).cloned()
    }

    fn latest_season(&self, competition_id: &str) -> Option<Season> {
        self.read()
            .seasons
            .values()
            .filter(|s| s.competition_id == competition_id)
            .max_by_key(|s| s.start_date)
            .cloned()
    }

    fn find_matches(&self, filter: &MatchFilter) -> Vec<MatchRow> {
        let mut rows: Vec<MatchRow> = self
            .read()
            .matches
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    fn watchers(&self) -> Vec<WatchedCompetition> {
        self.read().watchers.clone()
    }

    fn watcher(&self, competition_id: &str, server_id: &str) -> Option<WatchedCompetition> {
        self.read()
            .watchers
            .iter()
            .find(|w| w.competition_id == competition_id && w.server_id == server_id)
            .cloned()
    }

    fn save_watcher(&self, watcher: WatchedCompetition) {
        let mut inner = self.write();
        match inner
            .watchers
            .iter_mut()
            .find(|w| w.competition_id == watcher.competition_id && w.server_id == watcher.server_id)
        {
            Some(existing) => *existing = watcher,
            None => inner.watchers.push(watcher),
        }
    }

    fn remove_watcher(&self, competition_id: &str, server_id: &str) -> bool {
        let mut inner = self.write();
        let before = inner.watchers.len();
        inner
            .watchers
            .retain(|w| !(w.competition_id == competition_id && w.server_id == server_id));
        inner.watchers.len() != before
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let encoded = serde_json::to_string(&*self.read())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, encoded)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Metadata snapshot written");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn row(id: &str, season: &str, hours: i64, status: MatchStatus) -> MatchRow {
        MatchRow {
            id: id.to_string(),
            competition_id: "17".to_string(),
            season_id: season.to_string(),
            matchday: Some(1),
            kickoff: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::hours(hours),
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            home_score: None,
            away_score: None,
            status,
        }
    }

    fn season(id: &str, year: i32) -> Season {
        Season {
            id: id.to_string(),
            competition_id: "17".to_string(),
            name: format!("{year}"),
            start_date: Utc.with_ymd_and_hms(year, 8, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(year + 1, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_find_matches_filters_and_orders() {
        let store = MemoryStore::new();
        store.upsert_matches(vec![
            row("c", "s1", 5, MatchStatus::Scheduled),
            row("a", "s1", 1, MatchStatus::Live),
            row("b", "s2", 2, MatchStatus::Scheduled),
        ]);

        let ids: Vec<String> = store
            .find_matches(&MatchFilter::season("17", "s1"))
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        let live = store.find_matches(&MatchFilter {
            status: Some(MatchStatus::Live),
            ..MatchFilter::default()
        });
        assert_eq!(live.len(), 1);

        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = store.find_matches(&MatchFilter {
            from: Some(base + Duration::hours(2)),
            to: Some(base + Duration::hours(5)),
            ..MatchFilter::default()
        });
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, "b");
    }

    #[test]
    fn test_latest_season() {
        let store = MemoryStore::new();
        store.upsert_seasons(vec![season("s2023", 2023), season("s2024", 2024), season("s2022", 2022)]);
        assert_eq!(store.latest_season("17").unwrap().id, "s2024");
        assert!(store.latest_season("99").is_none());
    }

    #[test]
    fn test_watcher_crud() {
        let store = MemoryStore::new();
        let mut w = WatchedCompetition {
            competition_id: "17".to_string(),
            season_id: "s1".to_string(),
            server_id: "g1".to_string(),
            channel: None,
            role_id: None,
            category: None,
        };
        store.save_watcher(w.clone());
        w.season_id = "s2".to_string();
        store.save_watcher(w.clone());
        assert_eq!(store.watchers().len(), 1);
        assert_eq!(store.watcher("17", "g1").unwrap().season_id, "s2");
        assert!(store.remove_watcher("17", "g1"));
        assert!(!store.remove_watcher("17", "g1"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let path = std::env::temp_dir().join(format!("matchday-store-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let store = MemoryStore::open(&path).unwrap();
        store.upsert_seasons(vec![season("s2024", 2024)]);
        store.save_watcher(WatchedCompetition {
            competition_id: "17".to_string(),
            season_id: "s2024".to_string(),
            server_id: "g1".to_string(),
            channel: Some("live-football".to_string()),
            role_id: None,
            category: None,
        });
        store.flush().unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.watchers().len(), 1);
        assert_eq!(reopened.latest_season("17").unwrap().id, "s2024");
        let _ = std::fs::remove_file(&path);
    }
}
