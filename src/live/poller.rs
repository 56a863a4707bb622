//! Per-match live poller.
//!
//! Polls the live endpoint for one match, diffs the event list against what
//! it has already seen and posts each new event to the matchday channel.
//! State is published through a `watch` channel; the scheduler only reads it.
//!
//! Lifecycle: `NotStarted -> Live -> Finished`. Any fetch or decode error
//! ends the poller. After the feed reports the match finished, a few extra
//! polls pick up late corrections before exiting.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::source::SportsDataSource;
use crate::chat::errors::ChatError;
use crate::chat::render::{render_event, render_lineups, score_title};
use crate::chat::{ChannelManager, ChatMessage};
use crate::data::events::EventTracker;
use crate::data::live::LiveMatchPayload;
use crate::data::models::{MatchId, MatchRow};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval before lineups are out and the match is live.
    pub prematch_interval: Duration,
    pub live_interval: Duration,
    /// Polls to run after the feed first reports the match finished.
    pub extra_cycles: u32,
    /// Wait before the single delivery retry.
    pub send_retry_backoff: Duration,
    /// Kickoff plus this is when a match counts as over.
    pub trail: chrono::Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            prematch_interval: Duration::from_secs(600),
            live_interval: Duration::from_secs(20),
            extra_cycles: 3,
            send_retry_backoff: Duration::from_secs(10),
            trail: chrono::Duration::hours(3),
        }
    }
}

// =============================================================================
// Published state
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    NotStarted,
    Live,
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMatchState {
    pub match_id: MatchId,
    pub lifecycle: Lifecycle,
    /// Raised once the first payload is processed, or on exit.
    pub ready: bool,
    pub running: bool,
    /// At least one event has been delivered to the channel.
    pub started: bool,
    /// The match aired and its scheduled end has elapsed.
    pub passed: bool,
    pub went_live: bool,
    pub minute: Option<String>,
    pub title: String,
    pub goals: Vec<String>,
}

/// Where a poller delivers its messages.
#[derive(Debug, Clone)]
pub struct MatchTarget {
    pub row: MatchRow,
    pub server_id: String,
    pub channel_name: String,
    pub competition_name: String,
}

/// Scheduler-side handle of a running poller.
pub struct PollerHandle {
    pub match_id: MatchId,
    pub state: watch::Receiver<LiveMatchState>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn snapshot(&self) -> LiveMatchState {
        self.state.borrow().clone()
    }

    /// The poller task has returned.
    pub fn has_exited(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// A receiver for readiness rendezvous outside any lock.
    pub fn subscribe(&self) -> watch::Receiver<LiveMatchState> {
        self.state.clone()
    }
}

/// Wait until the poller reports ready, bounded by `timeout`.
pub async fn wait_ready(mut state: watch::Receiver<LiveMatchState>, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, state.wait_for(|s| s.ready)).await,
        Ok(Ok(_))
    )
}

// =============================================================================
// Poller
// =============================================================================

pub struct MatchPoller {
    target: MatchTarget,
    source: Arc<dyn SportsDataSource>,
    channels: Arc<ChannelManager>,
    config: PollerConfig,
    state: watch::Sender<LiveMatchState>,
}

impl MatchPoller {
    pub fn spawn(
        target: MatchTarget,
        source: Arc<dyn SportsDataSource>,
        channels: Arc<ChannelManager>,
        config: PollerConfig,
    ) -> PollerHandle {
        let initial = LiveMatchState {
            match_id: target.row.id.clone(),
            title: target.row.title(),
            ..LiveMatchState::default()
        };
        let (tx, rx) = watch::channel(initial);
        let match_id = target.row.id.clone();

        let poller = Self {
            target,
            source,
            channels,
            config,
            state: tx,
        };
        PollerHandle {
            match_id,
            state: rx,
            task: tokio::spawn(poller.run()),
        }
    }

    async fn run(self) {
        let match_id = self.target.row.id.clone();
        info!(
            match_id = %match_id,
            channel = %self.target.channel_name,
            title = %self.target.row.title(),
            "MatchPoller starting"
        );

        let mut tracker = EventTracker::new();
        let mut lineups_posted = false;
        let mut went_live = false;
        let mut remaining_after_finish: Option<u32> = None;

        loop {
            let payload = match self.source.fetch_live_match(&match_id).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(match_id = %match_id, error = %e, "Live fetch failed, poller exiting");
                    break;
                }
            };

            went_live |= payload.is_live;
            if payload.is_finished && !went_live {
                info!(match_id = %match_id, "Match finished without going live");
                break;
            }

            self.state.send_modify(|s| {
                s.lifecycle = Lifecycle::Live;
                s.running = true;
                s.ready = true;
                s.went_live = went_live;
                s.minute = payload.minute.clone();
                s.title = score_title(&payload, None);
            });

            if !lineups_posted && payload.has_lineup {
                if let Some(message) = render_lineups(&self.target.competition_name, &payload) {
                    self.deliver(&message).await;
                }
                lineups_posted = true;
            }

            self.process_events(&mut tracker, &payload).await;

            if payload.is_finished {
                let left = remaining_after_finish.get_or_insert(self.config.extra_cycles);
                if *left == 0 {
                    info!(match_id = %match_id, "Match finished, poller exiting");
                    break;
                }
                *left -= 1;
            }

            let interval = if lineups_posted || payload.is_live {
                self.config.live_interval
            } else {
                self.config.prematch_interval
            };
            debug!(match_id = %match_id, interval_ms = interval.as_millis() as u64, "Next live poll");
            tokio::time::sleep(interval).await;
        }

        let passed = went_live && Utc::now() >= self.target.row.kickoff + self.config.trail;
        self.state.send_modify(|s| {
            s.lifecycle = Lifecycle::Finished;
            s.running = false;
            s.started = false;
            s.ready = true;
            s.went_live = went_live;
            s.passed = passed;
        });
        info!(match_id = %match_id, passed, went_live, "MatchPoller stopped");
    }

    async fn process_events(&self, tracker: &mut EventTracker, payload: &LiveMatchPayload) {
        let fresh = tracker.diff(&payload.events);
        if fresh.is_empty() {
            return;
        }
        debug!(match_id = %self.target.row.id, count = fresh.len(), "New match events");

        for event in fresh {
            let rendered = render_event(&event, payload);
            if let Some(goal) = &rendered.goal {
                let goal = goal.clone();
                self.state.send_modify(|s| s.goals.push(goal));
            }
            let title = rendered.title.clone();
            let delivered = self
                .deliver(&rendered.into_message(&self.target.competition_name))
                .await;
            self.state.send_modify(|s| {
                s.title = title;
                s.started |= delivered;
            });
        }
    }

    /// Post into the matchday channel, retrying once after the backoff.
    async fn deliver(&self, message: &ChatMessage) -> bool {
        match self.try_deliver(message).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(
                    match_id = %self.target.row.id,
                    channel = %self.target.channel_name,
                    error = %e,
                    "Send failed, retrying"
                );
            }
        }

        tokio::time::sleep(self.config.send_retry_backoff).await;
        match self.try_deliver(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    match_id = %self.target.row.id,
                    channel = %self.target.channel_name,
                    error = %e,
                    title = %message.title,
                    "Send failed twice, dropping message"
                );
                false
            }
        }
    }

    async fn try_deliver(&self, message: &ChatMessage) -> Result<(), ChatError> {
        let channel = self
            .channels
            .find_channel(&self.target.server_id, &self.target.channel_name)
            .await?
            .ok_or_else(|| ChatError::NotFound(self.target.channel_name.clone()))?;
        self.channels.post(&channel, message).await
    }
}
