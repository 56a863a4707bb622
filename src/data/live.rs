//! Live match payload, decoded strictly at the API boundary.
//!
//! A payload that does not match these types is a decode error, which
//! the poller treats as terminal for its match.

use serde::Deserialize;

use super::models::lenient;

/// Envelope returned by the live endpoint: `{"match": {...}}`.
#[derive(Debug, Deserialize)]
pub struct LiveEnvelope {
    #[serde(rename = "match")]
    pub data: LiveMatchPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMatchPayload {
    pub is_finished: bool,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub has_lineup: bool,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub minute: Option<String>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub score_home: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub score_away: Option<u32>,
    pub team_home_name: String,
    pub team_away_name: String,
    #[serde(default)]
    pub lineups: Option<Lineups>,
}

impl LiveMatchPayload {
    pub fn score(&self) -> (u32, u32) {
        (self.score_home.unwrap_or(0), self.score_away.unwrap_or(0))
    }
}

/// One raw event record from the live feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default, alias = "idEvent", deserialize_with = "lenient::opt_string")]
    pub event_id: Option<String>,
    pub event_code: i64,
    #[serde(default)]
    pub event_description: Option<String>,
    #[serde(default)]
    pub event_description_short: Option<String>,
    #[serde(default)]
    pub phase_description_short: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub minute: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub player_to_name: Option<String>,
}

impl EventRecord {
    /// Identity used for deduplication. Upstream ids win; records without
    /// one get a key built from every field that distinguishes events.
    pub fn identity(&self) -> String {
        if let Some(id) = &self.event_id {
            return id.clone();
        }
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.event_code,
            self.phase_description_short.as_deref().unwrap_or(""),
            self.minute.as_deref().unwrap_or(""),
            self.team_name.as_deref().unwrap_or(""),
            self.player_name.as_deref().unwrap_or(""),
            self.player_to_name.as_deref().unwrap_or(""),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Lineups {
    pub teams: LineupTeams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineupTeams {
    #[serde(default)]
    pub home: Vec<LineupPlayer>,
    #[serde(default)]
    pub away: Vec<LineupPlayer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupPlayer {
    pub person_name: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub shirt_number: Option<String>,
    #[serde(default)]
    pub is_captain: bool,
    #[serde(default)]
    pub is_goal_keeper: bool,
    #[serde(default)]
    pub is_coach: bool,
    #[serde(default)]
    pub starting_line_up: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "match": {
            "isFinished": false,
            "isLive": true,
            "hasLineup": true,
            "minute": "23'",
            "scoreHome": 1,
            "scoreAway": "0",
            "teamHomeName": "Arsenal",
            "teamAwayName": "Chelsea",
            "events": [
                {"eventId": 901, "eventCode": 13, "phaseDescriptionShort": "1H", "minute": "1'"},
                {"idEvent": "902", "eventCode": 3, "minute": 22, "teamName": "Arsenal", "playerName": "Saka"}
            ],
            "lineups": {"teams": {"home": [
                {"personName": "Ramsdale", "shirtNumber": 1, "isGoalKeeper": true, "startingLineUp": true}
            ], "away": []}}
        }
    }"#;

    #[test]
    fn test_decode_live_payload() {
        let env: LiveEnvelope = serde_json::from_str(PAYLOAD).unwrap();
        let p = env.data;
        assert!(p.is_live);
        assert_eq!(p.score(), (1, 0));
        assert_eq!(p.minute.as_deref(), Some("23'"));
        assert_eq!(p.events.len(), 2);
        assert_eq!(p.events[0].identity(), "901");
        assert_eq!(p.events[1].identity(), "902");
        assert_eq!(p.events[1].minute.as_deref(), Some("22"));
        let keeper = &p.lineups.unwrap().teams.home[0];
        assert_eq!(keeper.shirt_number.as_deref(), Some("1"));
        assert!(keeper.is_goal_keeper);
    }

    #[test]
    fn test_decode_rejects_missing_required_fields() {
        let bad = r#"{"match": {"isLive": true}}"#;
        assert!(serde_json::from_str::<LiveEnvelope>(bad).is_err());
        assert!(serde_json::from_str::<LiveEnvelope>("<html>404</html>").is_err());
    }

    #[test]
    fn test_identity_without_upstream_id_is_stable() {
        let rec = EventRecord {
            event_id: None,
            event_code: 4,
            event_description: None,
            event_description_short: None,
            phase_description_short: Some("2H".to_string()),
            minute: Some("61'".to_string()),
            team_name: Some("Chelsea".to_string()),
            player_name: Some("Mount".to_string()),
            player_to_name: Some("Havertz".to_string()),
        };
        assert_eq!(rec.identity(), rec.clone().identity());
        assert_eq!(rec.identity(), "4|2H|61'|Chelsea|Mount|Havertz");
    }
}
