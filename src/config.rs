//! Configuration management.
//!
//! Loads settings from environment variables and an optional .env file.

use std::str::FromStr;
use std::time::Duration;

use crate::live::PollerConfig;
use crate::schedule::{MaintenanceConfig, SchedulerConfig, WindowConfig};

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Settings {
    // Chat platform
    pub chat_mode: ChatMode,
    pub discord_token: String,
    pub discord_api_url: String,
    pub default_category: String,

    // Sports data API
    pub sports_api_url: String,
    pub live_api_url: String,
    pub api_rate_limit: u32,
    pub api_max_retries: u32,
    pub api_timeout_secs: u64,

    // Persistence and bootstrap
    pub store_path: String,
    pub watch_competitions: Vec<BootstrapWatch>,
    /// WATCH_COMPETITIONS entries that did not parse.
    pub invalid_watch_entries: Vec<String>,

    // Windows
    pub window_lead_minutes: u64,
    pub window_trail_minutes: u64,
    pub window_extended_trail_minutes: u64,

    // Scheduler
    pub scheduler_tick_secs: u64,
    pub scheduler_pass_sleep_secs: u64,
    pub scheduler_slow_pass_secs: u64,
    pub scheduler_throttle_secs: u64,
    pub scheduler_error_backoff_secs: u64,
    pub readiness_timeout_secs: u64,

    // Live polling
    pub poll_prematch_interval_secs: u64,
    pub poll_live_interval_secs: u64,
    pub poll_extra_cycles: u32,
    pub send_retry_backoff_secs: u64,

    // Maintenance
    pub maintenance_hour_utc: u32,
    pub maintenance_concurrency: usize,
    pub refresh_on_startup: bool,

    // Logging
    pub log_level: String,
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Paper,
    Discord,
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(Self::Paper),
            "discord" => Ok(Self::Discord),
            _ => Err(format!("Invalid chat mode: {s}")),
        }
    }
}

/// Bootstrap watcher: `competition@server[#category]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapWatch {
    pub competition_id: String,
    pub server_id: String,
    pub category: Option<String>,
}

impl FromStr for BootstrapWatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, category) = match s.split_once('#') {
            Some((rest, cat)) => (rest, Some(cat.trim()).filter(|c| !c.is_empty())),
            None => (s, None),
        };
        let (competition, server) = rest
            .split_once('@')
            .ok_or_else(|| format!("Invalid watch entry (want competition@server): {s}"))?;
        let (competition, server) = (competition.trim(), server.trim());
        if competition.is_empty() || server.is_empty() {
            return Err(format!("Invalid watch entry (want competition@server): {s}"));
        }
        Ok(Self {
            competition_id: competition.to_string(),
            server_id: server.to_string(),
            category: category.map(str::to_string),
        })
    }
}

impl Settings {
    /// Load settings from environment variables (and .env file).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let (watch_competitions, invalid_watch_entries) = parse_watch_entries(env_csv("WATCH_COMPETITIONS"));

        Self {
            chat_mode: env_str("CHAT_MODE", "paper").parse().unwrap_or(ChatMode::Paper),
            discord_token: env_str("DISCORD_TOKEN", ""),
            discord_api_url: env_str("DISCORD_API_URL", "https://discord.com/api/v10"),
            default_category: env_str("DEFAULT_CATEGORY", ""),

            sports_api_url: env_str("SPORTS_API_URL", "https://api.fifa.com/api/v1"),
            live_api_url: env_str("LIVE_API_URL", "https://api.fifa.com/api/v1/live/football"),
            api_rate_limit: env_u32("API_RATE_LIMIT", 10),
            api_max_retries: env_u32("API_MAX_RETRIES", 3),
            api_timeout_secs: env_u64("API_TIMEOUT_SECONDS", 30),

            store_path: env_str("STORE_PATH", ""),
            watch_competitions,
            invalid_watch_entries,

            window_lead_minutes: env_u64("WINDOW_LEAD_MINUTES", 60),
            window_trail_minutes: env_u64("WINDOW_TRAIL_MINUTES", 180),
            window_extended_trail_minutes: env_u64("WINDOW_EXTENDED_TRAIL_MINUTES", 300),

            scheduler_tick_secs: env_u64("SCHEDULER_TICK_SECONDS", 10),
            scheduler_pass_sleep_secs: env_u64("SCHEDULER_PASS_SLEEP_SECONDS", 60),
            scheduler_slow_pass_secs: env_u64("SCHEDULER_SLOW_PASS_SECONDS", 30),
            scheduler_throttle_secs: env_u64("SCHEDULER_THROTTLE_SECONDS", 5),
            scheduler_error_backoff_secs: env_u64("SCHEDULER_ERROR_BACKOFF_SECONDS", 5),
            readiness_timeout_secs: env_u64("READINESS_TIMEOUT_SECONDS", 120),

            poll_prematch_interval_secs: env_u64("POLL_PREMATCH_INTERVAL_SECONDS", 600),
            poll_live_interval_secs: env_u64("POLL_LIVE_INTERVAL_SECONDS", 20),
            poll_extra_cycles: env_u32("POLL_EXTRA_CYCLES", 3),
            send_retry_backoff_secs: env_u64("SEND_RETRY_BACKOFF_SECONDS", 10),

            maintenance_hour_utc: env_u32("MAINTENANCE_HOUR_UTC", 0),
            maintenance_concurrency: env_u64("MAINTENANCE_CONCURRENCY", 4) as usize,
            refresh_on_startup: env_bool("REFRESH_ON_STARTUP", true),

            log_level: env_str("LOG_LEVEL", "info"),
            log_json: env_bool("LOG_JSON", false),
        }
    }

    /// Validate configuration for critical requirements.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.chat_mode == ChatMode::Discord && self.discord_token.is_empty() {
            errors.push("DISCORD_TOKEN is required in discord mode".to_string());
        }

        if self.maintenance_hour_utc > 23 {
            errors.push("MAINTENANCE_HOUR_UTC must be in [0, 23]".to_string());
        }

        if self.window_trail_minutes == 0 {
            errors.push("WINDOW_TRAIL_MINUTES must be positive".to_string());
        }

        if self.window_extended_trail_minutes < self.window_trail_minutes {
            errors.push("WINDOW_EXTENDED_TRAIL_MINUTES must be >= WINDOW_TRAIL_MINUTES".to_string());
        }

        if self.poll_live_interval_secs == 0 || self.poll_prematch_interval_secs == 0 {
            errors.push("Poll intervals must be positive".to_string());
        }

        if self.api_max_retries == 0 || self.api_max_retries > MAX_API_RETRIES {
            errors.push(format!("API_MAX_RETRIES must be in [1, {MAX_API_RETRIES}]"));
        }

        if !self.invalid_watch_entries.is_empty() {
            errors.push(format!(
                "WATCH_COMPETITIONS has invalid entries: {}",
                self.invalid_watch_entries.join(", ")
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn default_category(&self) -> Option<String> {
        Some(self.default_category.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }

    pub fn store_path(&self) -> Option<&str> {
        Some(self.store_path.as_str()).filter(|p| !p.is_empty())
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            lead: minutes(self.window_lead_minutes),
            trail: minutes(self.window_trail_minutes),
            extended_trail: minutes(self.window_extended_trail_minutes),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            prematch_interval: Duration::from_secs(self.poll_prematch_interval_secs),
            live_interval: Duration::from_secs(self.poll_live_interval_secs),
            extra_cycles: self.poll_extra_cycles,
            send_retry_backoff: Duration::from_secs(self.send_retry_backoff_secs),
            trail: minutes(self.window_trail_minutes),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick: Duration::from_secs(self.scheduler_tick_secs),
            pass_sleep: Duration::from_secs(self.scheduler_pass_sleep_secs),
            slow_pass: Duration::from_secs(self.scheduler_slow_pass_secs),
            throttle: Duration::from_secs(self.scheduler_throttle_secs),
            error_backoff: Duration::from_secs(self.scheduler_error_backoff_secs),
            readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
        }
    }

    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            hour_utc: self.maintenance_hour_utc,
            concurrency: self.maintenance_concurrency.max(1),
        }
    }
}

/// Upper bound for API_MAX_RETRIES; the backoff doubles per attempt.
const MAX_API_RETRIES: u32 = 10;

/// Upper bound for configured minute values: one century.
const MAX_MINUTES: u64 = 60 * 24 * 365 * 100;

fn minutes(m: u64) -> chrono::Duration {
    chrono::Duration::minutes(m.min(MAX_MINUTES) as i64)
}

// =============================================================================
// Environment helpers
// =============================================================================

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_csv(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| split_csv(&v))
        .unwrap_or_default()
}

/// Split entries into parsed watchers and the raw text of those that failed.
fn parse_watch_entries(entries: Vec<String>) -> (Vec<BootstrapWatch>, Vec<String>) {
    let mut parsed = Vec::new();
    let mut invalid = Vec::new();
    for entry in entries {
        match entry.parse::<BootstrapWatch>() {
            Ok(watch) => parsed.push(watch),
            Err(_) => invalid.push(entry),
        }
    }
    (parsed, invalid)
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
