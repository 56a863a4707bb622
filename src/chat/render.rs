//! Message rendering for live match events and lineups.

use crate::data::events::{EventKind, MatchEvent};
use crate::data::live::{LineupPlayer, LiveMatchPayload};

use super::ChatMessage;

/// A rendered event plus, for goals, the short goal notation kept for
/// score queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    pub title: String,
    pub content: String,
    pub goal: Option<String>,
}

impl RenderedEvent {
    pub fn into_message(self, competition: &str) -> ChatMessage {
        ChatMessage {
            author: competition.to_string(),
            title: self.title,
            content: self.content,
        }
    }
}

/// `**Home** 1 : 0 **Away**`, bracketing the side that just scored.
pub fn score_title(payload: &LiveMatchPayload, scoring_team: Option<&str>) -> String {
    let (home, away) = payload.score();
    let score = match scoring_team {
        Some(team) if team == payload.team_home_name => format!("[{home}] : {away}"),
        Some(_) => format!("{home} : [{away}]"),
        None => format!("{home} : {away}"),
    };
    format!(
        "**{}** {} **{}**",
        payload.team_home_name, score, payload.team_away_name
    )
}

pub fn render_event(event: &MatchEvent, payload: &LiveMatchPayload) -> RenderedEvent {
    let scoring = (event.kind == EventKind::Goal).then_some(event.team.as_str());
    let title = score_title(payload, scoring);
    let prefix = format!("{}{}", event.kind.icon(), event.minute);
    let (player, team, player_to) = (&event.player, &event.team, &event.player_to);

    let body = match event.kind {
        EventKind::KickoffFirstHalf => " **KICKOFF** The match is underway!".to_string(),
        EventKind::KickoffSecondHalf => " **KICKOFF** Second Half!".to_string(),
        EventKind::HalfTime => " **HALF TIME!**".to_string(),
        EventKind::FullTime => " **FULL TIME**!".to_string(),
        EventKind::Goal => format!(" **GOAL**! {player} scores for **{team}**"),
        EventKind::YellowCard => format!(" **YELLOW CARD:** {player}(**{team}**)"),
        EventKind::SecondYellow => format!(" **SECOND YELLOW CARD**: {player}(**{team}**)"),
        EventKind::RedCard => format!(" **RED CARD**: {player} (**{team}**)"),
        EventKind::Substitution => {
            format!(" **SUBSTITUTION** **{team}**:{player} **IN**, {player_to} **OUT**")
        }
        EventKind::MissedPenalty => {
            format!(" **PENALTY MISSED!** {player} has missed a penalty (**{team}**)")
        }
        EventKind::Unclassified => String::new(),
    };

    let goal = (event.kind == EventKind::Goal).then(|| format!("{prefix} {player}"));

    RenderedEvent {
        title,
        content: format!("{prefix}{body}"),
        goal,
    }
}

/// Starting XI and coach for both teams. `None` when the payload carries no
/// usable lineup.
pub fn render_lineups(competition: &str, payload: &LiveMatchPayload) -> Option<ChatMessage> {
    let lineups = payload.lineups.as_ref()?;
    if lineups.teams.home.is_empty() && lineups.teams.away.is_empty() {
        return None;
    }

    let mut content = format!(
        "**{} vs {}**\n\n",
        payload.team_home_name, payload.team_away_name
    );
    content.push_str(&team_block(&payload.team_home_name, &lineups.teams.home));
    content.push_str("\n\n");
    content.push_str(&team_block(&payload.team_away_name, &lineups.teams.away));

    Some(ChatMessage {
        author: competition.to_string(),
        title: "Lineups".to_string(),
        content,
    })
}

fn team_block(team: &str, players: &[LineupPlayer]) -> String {
    let mut block = format!("__{team}__\n**Starting lineup:**\n");
    for p in players.iter().filter(|p| p.starting_line_up && !p.is_coach) {
        block.push_str(&format!(
            "**{}** - {}",
            p.shirt_number.as_deref().unwrap_or("-"),
            p.person_name
        ));
        if p.is_goal_keeper {
            block.push_str(" (GK)");
        }
        if p.is_captain {
            block.push_str(" (C)");
        }
        block.push('\n');
    }
    if let Some(coach) = players.iter().find(|p| p.is_coach) {
        block.push_str(&format!("\n**Coach:** {}", coach.person_name));
    }
    block
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::live::{LineupTeams, Lineups};

    fn payload(home: u32, away: u32) -> LiveMatchPayload {
        LiveMatchPayload {
            is_finished: false,
            is_live: true,
            has_lineup: false,
            minute: Some("55'".to_string()),
            events: Vec::new(),
            score_home: Some(home),
            score_away: Some(away),
            team_home_name: "Roma".to_string(),
            team_away_name: "Lazio".to_string(),
            lineups: None,
        }
    }

    fn event(kind: EventKind, team: &str) -> MatchEvent {
        MatchEvent {
            id: "1".to_string(),
            kind,
            minute: "54'".to_string(),
            team: team.to_string(),
            player: "Dybala".to_string(),
            player_to: "Abraham".to_string(),
        }
    }

    #[test]
    fn test_goal_brackets_scoring_side() {
        let home_goal = render_event(&event(EventKind::Goal, "Roma"), &payload(1, 0));
        assert_eq!(home_goal.title, "**Roma** [1] : 0 **Lazio**");
        assert!(home_goal.content.ends_with("54' **GOAL**! Dybala scores for **Roma**"));
        assert_eq!(home_goal.goal.as_deref(), Some("\u{26bd} 54' Dybala"));

        let away_goal = render_event(&event(EventKind::Goal, "Lazio"), &payload(1, 1));
        assert_eq!(away_goal.title, "**Roma** 1 : [1] **Lazio**");
    }

    #[test]
    fn test_non_goal_has_plain_title() {
        let sub = render_event(&event(EventKind::Substitution, "Roma"), &payload(0, 0));
        assert_eq!(sub.title, "**Roma** 0 : 0 **Lazio**");
        assert!(sub.content.contains("**SUBSTITUTION** **Roma**:Dybala **IN**, Abraham **OUT**"));
        assert!(sub.goal.is_none());
    }

    #[test]
    fn test_lineups_list_starters_and_coach() {
        let player = |name: &str, num: &str, gk: bool, captain: bool, coach: bool, starting: bool| LineupPlayer {
            person_name: name.to_string(),
            shirt_number: Some(num.to_string()),
            is_captain: captain,
            is_goal_keeper: gk,
            is_coach: coach,
            starting_line_up: starting,
        };
        let mut p = payload(0, 0);
        p.lineups = Some(Lineups {
            teams: LineupTeams {
                home: vec![
                    player("Rui Patricio", "1", true, false, false, true),
                    player("Pellegrini", "7", false, true, false, true),
                    player("Shomurodov", "14", false, false, false, false),
                    player("Mourinho", "", false, false, true, false),
                ],
                away: Vec::new(),
            },
        });
        let msg = render_lineups("Serie A", &p).unwrap();
        assert_eq!(msg.author, "Serie A");
        assert!(msg.content.contains("**1** - Rui Patricio (GK)"));
        assert!(msg.content.contains("**7** - Pellegrini (C)"));
        assert!(!msg.content.contains("Shomurodov"));
        assert!(msg.content.contains("**Coach:** Mourinho"));
    }

    #[test]
    fn test_lineups_absent() {
        assert!(render_lineups("Serie A", &payload(0, 0)).is_none());
    }
}
