//! Async REST client for the FIFA data API.
//!
//! Features:
//! - Rate limiting (configurable, default 10 req/sec)
//! - Automatic retries with exponential backoff on 5xx, 429 and network errors
//! - Strictly typed responses (decode failures surface as errors)

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::data::live::{LiveEnvelope, LiveMatchPayload};
use crate::data::models::{CompetitionRecord, Country, Federation, MatchRow, Season};

use super::errors::ApiError;
use super::source::SportsDataSource;
use super::wire::{CompetitionDto, CountryDto, FederationDto, MatchDto, Results, SeasonDto};

type DirectLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

const PAGE_SIZE: &str = "1000";

/// Async REST client for the FIFA metadata and live endpoints.
pub struct FifaClient {
    base_url: String,
    live_url: String,
    client: Client,
    rate_limiter: Arc<DirectLimiter>,
    max_retries: u32,
}

impl FifaClient {
    pub fn new(
        base_url: &str,
        live_url: &str,
        rate_limit: u32,
        max_retries: u32,
        timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(20)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota = Quota::per_second(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            live_url: live_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter,
            max_retries: max_retries.max(1),
        })
    }

    /// Create with default settings.
    pub fn with_defaults(base_url: &str, live_url: &str) -> Result<Self, ApiError> {
        Self::new(base_url, live_url, 10, 3, 30)
    }

    // =========================================================================
    // Core request method
    // =========================================================================

    /// GET `url` and return the raw body of a successful response.
    async fn request(&self, url: &str, params: &[(&str, &str)]) -> Result<String, ApiError> {
        let mut last_error: Option<ApiError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.until_ready().await;

            debug!(url = %url, attempt = attempt + 1, "API request");

            let result = self
                .client
                .get(url)
                .query(&[("language", "en")])
                .query(params)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .text()
                            .await
                            .map_err(|e| ApiError::Network(e.to_string()));
                    }

                    if status.as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(1);
                        warn!(retry_after, attempt = attempt + 1, "Rate limited");
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        last_error = Some(ApiError::RateLimited { retry_after });
                        continue;
                    }

                    if status.is_server_error() {
                        let delay_ms = 500u64.saturating_mul(2u64.saturating_pow(attempt));
                        warn!(
                            status_code = status.as_u16(),
                            delay_ms,
                            attempt = attempt + 1,
                            "Server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        last_error = Some(ApiError::Http {
                            status_code: status.as_u16(),
                            message: status.to_string(),
                        });
                        continue;
                    }

                    // Client errors are not retried.
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(ApiError::from_response(status.as_u16(), url, &body_text));
                }
                Err(e) => {
                    let delay_ms = 500u64.saturating_mul(2u64.saturating_pow(attempt));
                    warn!(
                        error = %e,
                        delay_ms,
                        attempt = attempt + 1,
                        "Network error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                    last_error = Some(if e.is_timeout() {
                        ApiError::Timeout(e.to_string())
                    } else {
                        ApiError::Network(e.to_string())
                    });
                }
            }
        }

        Err(ApiError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let body = self.request(url, params).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    async fn get_results<D, M>(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<M>, ApiError>
    where
        D: DeserializeOwned,
        M: From<D>,
    {
        let url = format!("{}{}", self.base_url, path);
        let rows: Results<D> = self.get_json(&url, params).await?;
        Ok(rows.results.into_iter().map(M::from).collect())
    }
}

// =============================================================================
// SportsDataSource
// =============================================================================

#[async_trait]
impl SportsDataSource for FifaClient {
    async fn fetch_federations(&self) -> Result<Vec<Federation>, ApiError> {
        self.get_results::<FederationDto, _>("/confederations", &[]).await
    }

    async fn fetch_countries(&self) -> Result<Vec<Country>, ApiError> {
        self.get_results::<CountryDto, _>("/countries", &[("count", PAGE_SIZE)])
            .await
    }

    async fn fetch_competitions(&self) -> Result<Vec<CompetitionRecord>, ApiError> {
        self.get_results::<CompetitionDto, _>(
            "/competitions/all",
            &[("count", PAGE_SIZE), ("footballType", "0")],
        )
        .await
    }

    async fn fetch_seasons(&self, competition_id: &str) -> Result<Vec<Season>, ApiError> {
        self.get_results::<SeasonDto, _>(
            "/seasons",
            &[("idCompetition", competition_id), ("count", PAGE_SIZE)],
        )
        .await
    }

    async fn fetch_matches(
        &self,
        competition_id: &str,
        season_id: &str,
    ) -> Result<Vec<MatchRow>, ApiError> {
        self.get_results::<MatchDto, _>(
            "/calendar/matches",
            &[
                ("idCompetition", competition_id),
                ("idSeason", season_id),
                ("count", PAGE_SIZE),
            ],
        )
        .await
    }

    async fn fetch_live_match(&self, match_id: &str) -> Result<LiveMatchPayload, ApiError> {
        let url = format!("{}/{}", self.live_url, match_id);
        let envelope: LiveEnvelope = self.get_json(&url, &[]).await?;
        Ok(envelope.data)
    }
}
