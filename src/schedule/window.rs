//! Matchday windows: when a matchday's channel should exist and which of
//! its matches are upcoming, current or passed.
//!
//! `build_windows` is pure. It never touches shared state; the result is
//! installed by maintenance or `add_competition` and then mutated in place
//! by the scheduler as matches move between buckets.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::chat::canonical_channel_name;
use crate::data::models::{MatchId, MatchRow, WatchedCompetition};
use crate::live::poller::LiveMatchState;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Time before the first kickoff at which the window opens.
    pub lead: Duration,
    /// Time after the last kickoff at which the window closes.
    pub trail: Duration,
    /// Used instead of `trail` while a match is still live.
    pub extended_trail: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lead: Duration::hours(1),
            trail: Duration::hours(3),
            extended_trail: Duration::hours(5),
        }
    }
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Never touched by the scheduler since the window was built.
    Unknown,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Upcoming,
    Current,
    Passed,
}

#[derive(Debug, Clone)]
pub struct MatchdayWindow {
    pub competition_id: String,
    pub competition_name: String,
    pub server_id: String,
    pub matchday: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub last_kickoff: DateTime<Utc>,
    pub channel_name: String,
    pub custom_channel: bool,
    pub role_id: Option<String>,
    pub category: Option<String>,
    pub channel_state: ChannelState,
    pub upcoming: Vec<MatchRow>,
    pub current: Vec<MatchRow>,
    pub passed: Vec<MatchRow>,
    /// Final state of pollers that have been retired.
    pub results: HashMap<MatchId, LiveMatchState>,
}

impl MatchdayWindow {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end
    }

    pub fn bucket(&self, bucket: Bucket) -> &Vec<MatchRow> {
        match bucket {
            Bucket::Upcoming => &self.upcoming,
            Bucket::Current => &self.current,
            Bucket::Passed => &self.passed,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<MatchRow> {
        match bucket {
            Bucket::Upcoming => &mut self.upcoming,
            Bucket::Current => &mut self.current,
            Bucket::Passed => &mut self.passed,
        }
    }

    pub fn bucket_of(&self, match_id: &str) -> Option<Bucket> {
        [Bucket::Upcoming, Bucket::Current, Bucket::Passed]
            .into_iter()
            .find(|b| self.bucket(*b).iter().any(|m| m.id == match_id))
    }

    /// Move a match between buckets. Returns false when it was not in `from`.
    pub fn move_match(&mut self, match_id: &str, from: Bucket, to: Bucket) -> bool {
        let source = self.bucket_mut(from);
        let Some(pos) = source.iter().position(|m| m.id == match_id) else {
            return false;
        };
        let row = source.remove(pos);
        let target = self.bucket_mut(to);
        let at = target.partition_point(|m| m.kickoff <= row.kickoff);
        target.insert(at, row);
        true
    }

    pub fn matches(&self) -> impl Iterator<Item = &MatchRow> {
        self.upcoming
            .iter()
            .chain(self.current.iter())
            .chain(self.passed.iter())
    }

    pub fn match_count(&self) -> usize {
        self.upcoming.len() + self.current.len() + self.passed.len()
    }

    /// Push `end` out to the last kickoff plus the extended trail.
    /// Returns true when the end actually moved.
    pub fn extend_end(&mut self, extended_trail: Duration) -> bool {
        let extended = self.last_kickoff + extended_trail;
        if extended > self.end {
            self.end = extended;
            true
        } else {
            false
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Bucket a match relative to `now`. A match persisted as live is current
/// regardless of the clock.
pub fn initial_bucket(row: &MatchRow, now: DateTime<Utc>, config: &WindowConfig) -> Bucket {
    if row.status.is_live() {
        return Bucket::Current;
    }
    if row.kickoff + config.trail < now {
        Bucket::Passed
    } else if row.kickoff - config.lead <= now {
        Bucket::Current
    } else {
        Bucket::Upcoming
    }
}

pub fn matchday_channel_name(watcher: &WatchedCompetition, competition_name: &str, matchday: u32) -> String {
    match watcher.channel.as_deref().filter(|c| !c.is_empty()) {
        Some(custom) => canonical_channel_name(custom),
        None => canonical_channel_name(&format!("{competition_name} Matchday {matchday}")),
    }
}

pub fn build_windows(
    watcher: &WatchedCompetition,
    competition_name: &str,
    matches: &[MatchRow],
    now: DateTime<Utc>,
    config: &WindowConfig,
) -> BTreeMap<u32, MatchdayWindow> {
    let mut by_matchday: BTreeMap<u32, Vec<&MatchRow>> = BTreeMap::new();
    for row in matches {
        if let Some(md) = row.matchday {
            by_matchday.entry(md).or_default().push(row);
        }
    }

    by_matchday
        .into_iter()
        .filter_map(|(matchday, mut rows)| {
            rows.sort_by_key(|r| r.kickoff);
            let first = rows.first()?.kickoff;
            let last = rows.last()?.kickoff;
            let any_live = rows.iter().any(|r| r.status.is_live());
            let trail = if any_live { config.extended_trail } else { config.trail };

            let mut window = MatchdayWindow {
                competition_id: watcher.competition_id.clone(),
                competition_name: competition_name.to_string(),
                server_id: watcher.server_id.clone(),
                matchday,
                start: first - config.lead,
                end: last + trail,
                last_kickoff: last,
                channel_name: matchday_channel_name(watcher, competition_name, matchday),
                custom_channel: watcher.has_custom_channel(),
                role_id: watcher.role_id.clone(),
                category: watcher.category.clone(),
                channel_state: ChannelState::Unknown,
                upcoming: Vec::new(),
                current: Vec::new(),
                passed: Vec::new(),
                results: HashMap::new(),
            };
            for row in rows {
                let bucket = initial_bucket(row, now, config);
                window.bucket_mut(bucket).push(row.clone());
            }
            Some((matchday, window))
        })
        .collect()
}

/// Carry scheduler progress from `old` into freshly built windows.
///
/// Channel state and retired poller results survive. A match the old window
/// already had as passed stays passed; a match with a registered poller is
/// current. A match without a poller is passed once its kickoff plus `trail`
/// has elapsed or its window has ended, and upcoming otherwise so the
/// scheduler starts one.
pub fn reconcile_windows(
    old: &BTreeMap<u32, MatchdayWindow>,
    mut new: BTreeMap<u32, MatchdayWindow>,
    now: DateTime<Utc>,
    trail: Duration,
    has_poller: impl Fn(&str) -> bool,
) -> BTreeMap<u32, MatchdayWindow> {
    for (matchday, window) in new.iter_mut() {
        let previous = old.get(matchday);
        if let Some(previous) = previous {
            window.channel_state = previous.channel_state;
            window.results = previous.results.clone();
            if previous.end > window.end && previous.last_kickoff == window.last_kickoff {
                window.end = previous.end;
            }
        }

        let ended = window.has_ended(now);
        let rows: Vec<(String, DateTime<Utc>)> = window.matches().map(|m| (m.id.clone(), m.kickoff)).collect();
        for (id, kickoff) in rows {
            let Some(current) = window.bucket_of(&id) else {
                continue;
            };
            let was_passed = previous.is_some_and(|p| p.bucket_of(&id) == Some(Bucket::Passed));
            let target = if was_passed || current == Bucket::Passed {
                Bucket::Passed
            } else if has_poller(&id) {
                Bucket::Current
            } else if ended || kickoff + trail < now {
                Bucket::Passed
            } else {
                Bucket::Upcoming
            };
            if target != current {
                window.move_match(&id, current, target);
            }
        }
    }
    new
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::MatchStatus;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, 0).unwrap()
    }

    fn row(id: &str, matchday: Option<u32>, kickoff: DateTime<Utc>, status: MatchStatus) -> MatchRow {
        MatchRow {
            id: id.to_string(),
            competition_id: "17".to_string(),
            season_id: "2024".to_string(),
            matchday,
            kickoff,
            home_team: format!("{id}-home"),
            away_team: format!("{id}-away"),
            home_score: None,
            away_score: None,
            status,
        }
    }

    fn watcher(channel: Option<&str>) -> WatchedCompetition {
        WatchedCompetition {
            competition_id: "17".to_string(),
            season_id: "2024".to_string(),
            server_id: "g1".to_string(),
            channel: channel.map(str::to_string),
            role_id: None,
            category: None,
        }
    }

    fn scenario_a(status: MatchStatus) -> Vec<MatchRow> {
        vec![
            row("m1", Some(26), at(18, 0), MatchStatus::Scheduled),
            row("m2", Some(26), at(20, 0), status),
        ]
    }

    #[test]
    fn test_window_bounds() {
        let cfg = WindowConfig::default();
        let windows = build_windows(&watcher(None), "Premier League", &scenario_a(MatchStatus::Scheduled), at(12, 0), &cfg);
        let w = &windows[&26];
        assert_eq!(w.start, at(17, 0));
        assert_eq!(w.end, at(23, 0));
        assert!(w.is_open_at(at(17, 30)));
        assert!(!w.is_open_at(at(23, 30)));
        assert!(!w.is_open_at(at(16, 59)));
        assert_eq!(w.channel_name, "premier-league-matchday-26");
        assert_eq!(w.channel_state, ChannelState::Unknown);
    }

    #[test]
    fn test_live_match_extends_window() {
        let cfg = WindowConfig::default();
        let windows = build_windows(&watcher(None), "Premier League", &scenario_a(MatchStatus::Live), at(22, 0), &cfg);
        let w = &windows[&26];
        assert_eq!(w.end, at(20, 0) + Duration::hours(5));
        assert!(w.is_open_at(at(23, 30)));
    }

    #[test]
    fn test_extend_end_is_monotonic() {
        let cfg = WindowConfig::default();
        let mut windows = build_windows(&watcher(None), "PL", &scenario_a(MatchStatus::Scheduled), at(12, 0), &cfg);
        let w = windows.get_mut(&26).unwrap();
        assert!(w.extend_end(cfg.extended_trail));
        assert!(!w.extend_end(cfg.extended_trail));
        assert_eq!(w.end, Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_buckets_partition_matchday() {
        let cfg = WindowConfig::default();
        let matches = vec![
            row("early", Some(1), at(8, 0), MatchStatus::Finished),
            row("now", Some(1), at(12, 30), MatchStatus::Scheduled),
            row("later", Some(1), at(19, 0), MatchStatus::Scheduled),
            row("stale-live", Some(1), at(6, 0), MatchStatus::Live),
            row("no-md", None, at(12, 0), MatchStatus::Scheduled),
        ];
        for now in [at(0, 0), at(12, 0), at(16, 0), at(23, 59)] {
            let windows = build_windows(&watcher(None), "PL", &matches, now, &cfg);
            let w = &windows[&1];
            let mut seen = BTreeSet::new();
            for m in w.matches() {
                assert!(seen.insert(m.id.clone()), "{} in two buckets", m.id);
            }
            let expected: BTreeSet<String> =
                ["early", "now", "later", "stale-live"].iter().map(|s| s.to_string()).collect();
            assert_eq!(seen, expected);
        }

        let w = &build_windows(&watcher(None), "PL", &matches, at(12, 0), &cfg)[&1];
        assert_eq!(w.bucket_of("early"), Some(Bucket::Passed));
        assert_eq!(w.bucket_of("now"), Some(Bucket::Current));
        assert_eq!(w.bucket_of("later"), Some(Bucket::Upcoming));
        assert_eq!(w.bucket_of("stale-live"), Some(Bucket::Current));
    }

    #[test]
    fn test_custom_channel_name() {
        let cfg = WindowConfig::default();
        let windows = build_windows(&watcher(Some("Live Football")), "PL", &scenario_a(MatchStatus::Scheduled), at(12, 0), &cfg);
        assert_eq!(windows[&26].channel_name, "live-football");
        assert!(windows[&26].custom_channel);
    }

    #[test]
    fn test_move_match_keeps_kickoff_order() {
        let cfg = WindowConfig::default();
        let mut windows = build_windows(&watcher(None), "PL", &scenario_a(MatchStatus::Scheduled), at(12, 0), &cfg);
        let w = windows.get_mut(&26).unwrap();
        assert!(w.move_match("m2", Bucket::Upcoming, Bucket::Current));
        assert!(w.move_match("m1", Bucket::Upcoming, Bucket::Current));
        assert!(!w.move_match("m1", Bucket::Upcoming, Bucket::Current));
        let ids: Vec<&str> = w.current.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(w.match_count(), 2);
    }

    #[test]
    fn test_reconcile_carries_progress() {
        let cfg = WindowConfig::default();
        let mut old = build_windows(&watcher(None), "PL", &scenario_a(MatchStatus::Scheduled), at(17, 30), &cfg);
        {
            let w = old.get_mut(&26).unwrap();
            w.channel_state = ChannelState::Open;
            w.move_match("m1", Bucket::Current, Bucket::Passed);
        }

        let fresh = build_windows(&watcher(None), "PL", &scenario_a(MatchStatus::Scheduled), at(19, 30), &cfg);
        assert_eq!(fresh[&26].bucket_of("m2"), Some(Bucket::Current));

        let merged = reconcile_windows(&old, fresh, at(19, 30), cfg.trail, |_| false);
        let w = &merged[&26];
        assert_eq!(w.channel_state, ChannelState::Open);
        assert_eq!(w.bucket_of("m1"), Some(Bucket::Passed));
        // No poller yet: the scheduler has to start one.
        assert_eq!(w.bucket_of("m2"), Some(Bucket::Upcoming));

        let fresh = build_windows(&watcher(None), "PL", &scenario_a(MatchStatus::Scheduled), at(19, 30), &cfg);
        let merged = reconcile_windows(&old, fresh, at(19, 30), cfg.trail, |id| id == "m2");
        assert_eq!(merged[&26].bucket_of("m2"), Some(Bucket::Current));
    }

    #[test]
    fn test_reconcile_retires_stale_live_match() {
        let cfg = WindowConfig::default();
        let now = at(12, 0) + Duration::days(2);
        let matches = vec![row("old", Some(3), at(12, 0), MatchStatus::Live)];

        let fresh = build_windows(&watcher(None), "PL", &matches, now, &cfg);
        assert_eq!(fresh[&3].bucket_of("old"), Some(Bucket::Current));

        let merged = reconcile_windows(&BTreeMap::new(), fresh, now, cfg.trail, |_| false);
        let w = &merged[&3];
        assert!(w.has_ended(now));
        assert_eq!(w.bucket_of("old"), Some(Bucket::Passed));
        assert!(w.upcoming.is_empty());
    }
}
