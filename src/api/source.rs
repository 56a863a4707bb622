//! The sports-data boundary consumed by maintenance, scheduling and pollers.

use async_trait::async_trait;

use crate::data::live::LiveMatchPayload;
use crate::data::models::{CompetitionRecord, Country, Federation, MatchRow, Season};

use super::errors::ApiError;

/// Remote source of competition metadata and live match data.
///
/// `FifaClient` is the production implementation; tests script their own.
#[async_trait]
pub trait SportsDataSource: Send + Sync {
    async fn fetch_federations(&self) -> Result<Vec<Federation>, ApiError>;

    async fn fetch_countries(&self) -> Result<Vec<Country>, ApiError>;

    async fn fetch_competitions(&self) -> Result<Vec<CompetitionRecord>, ApiError>;

    async fn fetch_seasons(&self, competition_id: &str) -> Result<Vec<Season>, ApiError>;

    async fn fetch_matches(
        &self,
        competition_id: &str,
        season_id: &str,
    ) -> Result<Vec<MatchRow>, ApiError>;

    /// Live payload for one match. Decoding is strict: a payload of the
    /// wrong shape is an `ApiError::Deserialization`.
    async fn fetch_live_match(&self, match_id: &str) -> Result<LiveMatchPayload, ApiError>;
}
