//! Event classification and deduplication.
//!
//! `classify` maps a raw event code onto the fixed taxonomy. `EventTracker`
//! diffs successive event lists so every event is emitted exactly once,
//! even when the upstream feed reorders or re-sends its history.

use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use super::live::EventRecord;

// =============================================================================
// Taxonomy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Goal,
    Substitution,
    YellowCard,
    SecondYellow,
    RedCard,
    MissedPenalty,
    KickoffFirstHalf,
    KickoffSecondHalf,
    HalfTime,
    FullTime,
    Unclassified,
}

impl EventKind {
    /// Icon prefixed to the rendered event line.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Goal => "\u{26bd} ",
            Self::Substitution => "\u{1f504} ",
            Self::YellowCard => "\u{1f7e8} ",
            Self::SecondYellow => "\u{1f7e8}\u{1f7e5} ",
            Self::RedCard => "\u{1f7e5} ",
            Self::MissedPenalty => "\u{274c} ",
            Self::KickoffFirstHalf | Self::KickoffSecondHalf => "\u{1f3c1} ",
            Self::HalfTime | Self::FullTime => "\u{23f1} ",
            Self::Unclassified => "",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Goal => "goal",
            Self::Substitution => "substitution",
            Self::YellowCard => "yellow_card",
            Self::SecondYellow => "second_yellow",
            Self::RedCard => "red_card",
            Self::MissedPenalty => "missed_penalty",
            Self::KickoffFirstHalf => "kickoff_first_half",
            Self::KickoffSecondHalf => "kickoff_second_half",
            Self::HalfTime => "half_time",
            Self::FullTime => "full_time",
            Self::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

/// A classified event, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvent {
    pub id: String,
    pub kind: EventKind,
    pub minute: String,
    pub team: String,
    pub player: String,
    pub player_to: String,
}

// =============================================================================
// Classifier
// =============================================================================

const CODE_CARD: i64 = 1;
const CODE_SECOND_YELLOW: i64 = 2;
const CODE_GOAL: i64 = 3;
const CODE_SUBSTITUTION: i64 = 4;
const CODE_MISSED_PENALTY: i64 = 5;
const CODE_KICKOFF: i64 = 13;
const CODE_PHASE_END: i64 = 14;

const FIRST_HALF: &str = "1H";

pub fn classify(record: &EventRecord) -> EventKind {
    let first_half = record.phase_description_short.as_deref() == Some(FIRST_HALF);
    match record.event_code {
        CODE_GOAL => EventKind::Goal,
        CODE_SUBSTITUTION => EventKind::Substitution,
        CODE_CARD => {
            if record.event_description_short.as_deref() == Some("Y") {
                EventKind::YellowCard
            } else {
                EventKind::RedCard
            }
        }
        CODE_SECOND_YELLOW => EventKind::SecondYellow,
        CODE_MISSED_PENALTY => EventKind::MissedPenalty,
        CODE_KICKOFF if first_half => EventKind::KickoffFirstHalf,
        CODE_KICKOFF => EventKind::KickoffSecondHalf,
        CODE_PHASE_END if first_half => EventKind::HalfTime,
        CODE_PHASE_END => EventKind::FullTime,
        _ => EventKind::Unclassified,
    }
}

/// Classify a record into a `MatchEvent`. Unclassified records are logged
/// and dropped.
pub fn to_match_event(record: &EventRecord) -> Option<MatchEvent> {
    let kind = classify(record);
    if kind == EventKind::Unclassified {
        warn!(
            code = record.event_code,
            description = record.event_description.as_deref().unwrap_or(""),
            team = record.team_name.as_deref().unwrap_or(""),
            "Unhandled event code, dropping"
        );
        return None;
    }
    Some(MatchEvent {
        id: record.identity(),
        kind,
        minute: record.minute.clone().unwrap_or_default(),
        team: record.team_name.clone().unwrap_or_default(),
        player: record.player_name.clone().unwrap_or_default(),
        player_to: record.player_to_name.clone().unwrap_or_default(),
    })
}

// =============================================================================
// Deduplication
// =============================================================================

/// Remembers which event ids have been seen for one match.
#[derive(Debug, Default)]
pub struct EventTracker {
    seen: HashSet<String>,
}

impl EventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the events in `records` not seen on a previous call, in the
    /// order they appear in `records`. The seen set is replaced by the full
    /// list afterwards.
    pub fn diff(&mut self, records: &[EventRecord]) -> Vec<MatchEvent> {
        let ids: Vec<String> = records.iter().map(EventRecord::identity).collect();
        let fresh: Vec<MatchEvent> = records
            .iter()
            .zip(&ids)
            .filter(|(_, id)| !self.seen.contains(*id))
            .filter_map(|(rec, _)| to_match_event(rec))
            .collect();
        self.seen = ids.into_iter().collect();
        fresh
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
