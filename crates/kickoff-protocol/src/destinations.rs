// Application destinations handled by the service's @MessageMapping endpoints.

use kickoff_core::{LeagueId, MatchId, PlayerId};
use serde::Serialize;

// match room
pub const MATCH_JOIN: &str = "/app/match.join";
pub const MATCH_LEAVE: &str = "/app/match.leave";
pub const MATCH_CHAT: &str = "/app/match.chat";
pub const MATCH_PREDICTION: &str = "/app/match.prediction";
pub const MATCH_REACTION: &str = "/app/match.reaction";
pub const MATCH_REQUEST_DATA: &str = "/app/match.request-data";

// follow
pub const LEAGUE_SUBSCRIBE: &str = "/app/league.subscribe";
pub const PLAYER_SUBSCRIBE: &str = "/app/player.subscribe";

// keepalive
pub const PING: &str = "/app/ping";

/// Payload for [`MATCH_JOIN`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMatch<'a> {
    pub match_id: MatchId,
    pub username: &'a str,
}

/// Payload for [`MATCH_CHAT`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChat<'a> {
    pub match_id: MatchId,
    pub message: &'a str,
}

/// Payload for [`LEAGUE_SUBSCRIBE`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowLeague<'a> {
    pub league_id: LeagueId,
    pub username: &'a str,
}

/// Payload for [`PLAYER_SUBSCRIBE`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowPlayer<'a> {
    pub player_id: PlayerId,
    pub username: &'a str,
}

/// Payload for [`MATCH_PREDICTION`]. The service reads the kind from `type`
/// (`"score"`, `"winner"`, `"next_goal"`, …).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPrediction<'a> {
    pub match_id: MatchId,
    pub prediction: &'a str,
    #[serde(rename = "type")]
    pub prediction_type: &'a str,
}

/// Payload for [`MATCH_REACTION`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReaction<'a> {
    pub match_id: MatchId,
    pub emoji: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<&'a str>,
}

/// Payload for [`MATCH_REQUEST_DATA`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatchData {
    pub match_id: MatchId,
}

/// Payload for [`PING`]: client wall-clock in epoch milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct Ping {
    pub ping: i64,
}

impl Ping {
    pub fn now() -> Self {
        Self {
            ping: chrono::Utc::now().timestamp_millis(),
        }
    }
}
