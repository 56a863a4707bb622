//! Shared scheduling state: watched competitions, their matchday windows
//! and the registry of running pollers.
//!
//! The competition map sits behind an async `RwLock`. The scheduler pass
//! reads; maintenance and add/remove-competition write. Inside one
//! competition, windows and pollers each have a short-lived std mutex that
//! is never held across an await. When both are needed, windows are locked
//! first.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::data::models::{MatchId, WatchedCompetition};
use crate::live::poller::{LiveMatchState, PollerHandle};
use crate::schedule::window::{reconcile_windows, MatchdayWindow};

/// A competition as watched on one server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchKey {
    pub competition_id: String,
    pub server_id: String,
}

impl WatchKey {
    pub fn new(competition_id: &str, server_id: &str) -> Self {
        Self {
            competition_id: competition_id.to_string(),
            server_id: server_id.to_string(),
        }
    }
}

impl From<&WatchedCompetition> for WatchKey {
    fn from(w: &WatchedCompetition) -> Self {
        Self::new(&w.competition_id, &w.server_id)
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.competition_id, self.server_id)
    }
}

pub type Windows = BTreeMap<u32, MatchdayWindow>;

// =============================================================================
// Competition schedule
// =============================================================================

pub struct CompetitionSchedule {
    pub watcher: WatchedCompetition,
    pub competition_name: String,
    windows: Mutex<Windows>,
    pollers: Mutex<HashMap<MatchId, PollerHandle>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CompetitionSchedule {
    pub fn new(watcher: WatchedCompetition, competition_name: String, windows: Windows) -> Self {
        Self {
            watcher,
            competition_name,
            windows: Mutex::new(windows),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(&self) -> WatchKey {
        WatchKey::from(&self.watcher)
    }

    /// Run `f` with the window map locked.
    pub fn with_windows<R>(&self, f: impl FnOnce(&mut Windows) -> R) -> R {
        f(&mut lock(&self.windows))
    }

    /// Run `f` with windows and pollers both locked, in that order.
    pub fn with_windows_and_pollers<R>(
        &self,
        f: impl FnOnce(&mut Windows, &mut HashMap<MatchId, PollerHandle>) -> R,
    ) -> R {
        let mut windows = lock(&self.windows);
        let mut pollers = lock(&self.pollers);
        f(&mut windows, &mut pollers)
    }

    pub fn windows_snapshot(&self) -> Windows {
        lock(&self.windows).clone()
    }

    /// Install freshly built windows, keeping scheduler progress.
    pub fn replace_windows(&self, fresh: Windows, now: DateTime<Utc>, trail: Duration) {
        self.with_windows_and_pollers(|windows, pollers| {
            let merged = reconcile_windows(windows, fresh, now, trail, |id| pollers.contains_key(id));
            *windows = merged;
        });
    }

    pub fn has_poller(&self, match_id: &str) -> bool {
        lock(&self.pollers).contains_key(match_id)
    }

    pub fn register_poller(&self, handle: PollerHandle) {
        lock(&self.pollers).insert(handle.match_id.clone(), handle);
    }

    pub fn poller_state(&self, match_id: &str) -> Option<LiveMatchState> {
        lock(&self.pollers).get(match_id).map(PollerHandle::snapshot)
    }

    pub fn poller_states(&self) -> Vec<LiveMatchState> {
        lock(&self.pollers).values().map(PollerHandle::snapshot).collect()
    }

    pub fn poller_count(&self) -> usize {
        lock(&self.pollers).len()
    }

    /// Stop every poller of this competition.
    pub fn abort_pollers(&self) {
        for (_, handle) in lock(&self.pollers).drain() {
            handle.abort();
        }
    }
}

// =============================================================================
// Scheduler state
// =============================================================================

#[derive(Default)]
pub struct SchedulerState {
    competitions: RwLock<BTreeMap<WatchKey, Arc<CompetitionSchedule>>>,
}

pub type CompetitionMap = BTreeMap<WatchKey, Arc<CompetitionSchedule>>;

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, CompetitionMap> {
        self.competitions.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, CompetitionMap> {
        self.competitions.write().await
    }

    /// Snapshot of watched keys, in map order.
    pub async fn keys(&self) -> Vec<WatchKey> {
        self.competitions.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, key: &WatchKey) -> Option<Arc<CompetitionSchedule>> {
        self.competitions.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &WatchKey) -> bool {
        self.competitions.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.competitions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Abort every running poller. Used on shutdown.
    pub async fn abort_all(&self) {
        for schedule in self.competitions.read().await.values() {
            schedule.abort_pollers();
        }
    }
}
