//! Wire types for the FIFA data API and their conversion into models.
//!
//! Every list endpoint wraps its rows as `{"Results": [...]}`; display
//! names arrive as a list of localized texts of which the first wins.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::data::models::{
    lenient, CompetitionRecord, Country, Federation, MatchRow, MatchStatus, Season,
};

#[derive(Debug, Deserialize)]
pub struct Results<T> {
    #[serde(rename = "Results", default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalizedText {
    #[serde(rename = "Description", default)]
    pub description: String,
}

fn first_text(texts: &[LocalizedText]) -> String {
    texts
        .first()
        .map(|t| t.description.clone())
        .unwrap_or_default()
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FederationDto {
    #[serde(deserialize_with = "lenient::string")]
    pub id_confederation: String,
    #[serde(default)]
    pub name: Vec<LocalizedText>,
    #[serde(default)]
    pub description: Vec<LocalizedText>,
}

impl From<FederationDto> for Federation {
    fn from(dto: FederationDto) -> Self {
        Self {
            id: dto.id_confederation,
            name: first_text(&dto.description),
            full_name: first_text(&dto.name),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CountryDto {
    #[serde(deserialize_with = "lenient::string")]
    pub id_country: String,
    #[serde(default)]
    pub name: String,
}

impl From<CountryDto> for Country {
    fn from(dto: CountryDto) -> Self {
        Self {
            id: dto.id_country,
            name: dto.name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompetitionDto {
    #[serde(deserialize_with = "lenient::string")]
    pub id_competition: String,
    #[serde(default)]
    pub id_owner: String,
    #[serde(default)]
    pub id_member_association: Vec<String>,
    #[serde(default)]
    pub name: Vec<LocalizedText>,
}

impl From<CompetitionDto> for CompetitionRecord {
    fn from(dto: CompetitionDto) -> Self {
        Self {
            name: first_text(&dto.name),
            member_association: dto.id_member_association.into_iter().next(),
            owner_id: dto.id_owner,
            id: dto.id_competition,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeasonDto {
    #[serde(deserialize_with = "lenient::string")]
    pub id_season: String,
    #[serde(deserialize_with = "lenient::string")]
    pub id_competition: String,
    #[serde(default)]
    pub name: Vec<LocalizedText>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl From<SeasonDto> for Season {
    fn from(dto: SeasonDto) -> Self {
        Self {
            name: first_text(&dto.name),
            id: dto.id_season,
            competition_id: dto.id_competition,
            start_date: dto.start_date,
            end_date: dto.end_date,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TeamDto {
    #[serde(default)]
    pub team_name: Vec<LocalizedText>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchDto {
    #[serde(deserialize_with = "lenient::string")]
    pub id_match: String,
    #[serde(deserialize_with = "lenient::string")]
    pub id_competition: String,
    #[serde(deserialize_with = "lenient::string")]
    pub id_season: String,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub match_day: Option<u32>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub home: Option<TeamDto>,
    #[serde(default)]
    pub away: Option<TeamDto>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub home_team_score: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub away_team_score: Option<u32>,
    #[serde(default = "scheduled_code")]
    pub match_status: i64,
}

fn scheduled_code() -> i64 {
    1
}

fn team_name(team: Option<&TeamDto>) -> String {
    team.map(|t| first_text(&t.team_name))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "TBD".to_string())
}

impl From<MatchDto> for MatchRow {
    fn from(dto: MatchDto) -> Self {
        Self {
            home_team: team_name(dto.home.as_ref()),
            away_team: team_name(dto.away.as_ref()),
            id: dto.id_match,
            competition_id: dto.id_competition,
            season_id: dto.id_season,
            matchday: dto.match_day,
            kickoff: dto.date,
            home_score: dto.home_team_score,
            away_score: dto.away_team_score,
            status: MatchStatus::from_code(dto.match_status),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
