//! Core data models for competitions, seasons, matches and watchers.
//!
//! These are the rows the metadata store persists and the scheduler reads.
//! Wire-format types for the remote API live in `api::wire`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type FederationId = String;
pub type CountryId = String;
pub type CompetitionId = String;
pub type SeasonId = String;
pub type MatchId = String;
pub type ServerId = String;

// =============================================================================
// Enums
// =============================================================================

/// Match status as reported by the calendar endpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Finished,
    #[default]
    Scheduled,
    Live,
    Lineups,
    Abandoned,
    Postponed,
    Cancelled,
    Unknown,
}

impl MatchStatus {
    /// Map the numeric status code used by the calendar API.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Finished,
            1 => Self::Scheduled,
            3 => Self::Live,
            4 => Self::Abandoned,
            7 => Self::Postponed,
            8 => Self::Cancelled,
            12 => Self::Lineups,
            _ => Self::Unknown,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Finished => "finished",
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Lineups => "lineups",
            Self::Abandoned => "abandoned",
            Self::Postponed => "postponed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Metadata rows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Federation {
    pub id: FederationId,
    pub name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: CompetitionId,
    pub federation_id: FederationId,
    pub country_id: Option<CountryId>,
    pub name: String,
}

/// Competition as delivered by the API, before its country is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionRecord {
    pub id: CompetitionId,
    pub owner_id: FederationId,
    pub member_association: Option<CountryId>,
    pub name: String,
}

impl CompetitionRecord {
    /// Country code to resolve: the member association, or the owning
    /// federation for international competitions.
    pub fn country_key(&self) -> &str {
        self.member_association
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.owner_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub competition_id: CompetitionId,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// A persisted fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub id: MatchId,
    pub competition_id: CompetitionId,
    pub season_id: SeasonId,
    pub matchday: Option<u32>,
    pub kickoff: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub status: MatchStatus,
}

impl MatchRow {
    /// Title used before any live data arrives.
    pub fn title(&self) -> String {
        format!("**{}** - : - **{}**", self.home_team, self.away_team)
    }

    /// Scheduled end of the match: kickoff plus the trail buffer.
    pub fn scheduled_end(&self, trail: Duration) -> DateTime<Utc> {
        self.kickoff + trail
    }
}

/// A competition being followed on one chat server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedCompetition {
    pub competition_id: CompetitionId,
    pub season_id: SeasonId,
    pub server_id: ServerId,
    /// Custom channel that receives every matchday of this competition.
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl WatchedCompetition {
    pub fn has_custom_channel(&self) -> bool {
        self.channel.as_deref().is_some_and(|c| !c.is_empty())
    }
}

// =============================================================================
// Lenient deserializers
// =============================================================================

/// The remote API is inconsistent about numbers vs. strings for ids,
/// matchdays and minutes. These helpers accept either.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Int(i64),
        Float(f64),
    }

    impl StrOrNum {
        fn into_string(self) -> String {
            match self {
                Self::Str(s) => s,
                Self::Int(i) => i.to_string(),
                Self::Float(f) => f.to_string(),
            }
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        StrOrNum::deserialize(d).map(StrOrNum::into_string)
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<StrOrNum>::deserialize(d)?
            .map(StrOrNum::into_string)
            .filter(|s| !s.is_empty()))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(match Option::<StrOrNum>::deserialize(d)? {
            Some(StrOrNum::Int(i)) => u32::try_from(i).ok(),
            Some(StrOrNum::Float(f)) if f >= 0.0 => Some(f as u32),
            Some(StrOrNum::Str(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
