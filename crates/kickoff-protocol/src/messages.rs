//! JSON envelopes carried in MESSAGE frame bodies.
//!
//! Every envelope has a `type` discriminator. Decoding reads the discriminator
//! first and only then deserializes the body for that kind, so a kind added on
//! the server decodes to [`LiveMessage::Unknown`] instead of failing.

use kickoff_core::{LeagueId, MatchId, PlayerId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Discriminator values, exactly as the service emits them.
pub mod kinds {
    pub const MATCH_UPDATE: &str = "MATCH_UPDATE";
    pub const MATCH_EVENT: &str = "MATCH_EVENT";
    pub const MATCH_STATUS_CHANGE: &str = "MATCH_STATUS_CHANGE";
    pub const STANDINGS_UPDATE: &str = "STANDINGS_UPDATE";
    pub const PLAYER_STATS_UPDATE: &str = "PLAYER_STATS_UPDATE";
    pub const NOTIFICATION: &str = "NOTIFICATION";
    pub const SYSTEM_ALERT: &str = "SYSTEM_ALERT";
    pub const PRIVATE_MESSAGE: &str = "PRIVATE_MESSAGE";
    pub const CHAT_MESSAGE: &str = "CHAT_MESSAGE";
    pub const MATCH_PREDICTION: &str = "MATCH_PREDICTION";
    pub const MATCH_REACTION: &str = "MATCH_REACTION";
    pub const MATCH_COMMENTARY: &str = "MATCH_COMMENTARY";
    pub const INJURY_UPDATE: &str = "INJURY_UPDATE";
    pub const TRANSFER_NEWS: &str = "TRANSFER_NEWS";
    pub const USER_JOINED: &str = "USER_JOINED";
    pub const USER_LEFT: &str = "USER_LEFT";
    pub const LEAGUE_SUBSCRIBED: &str = "LEAGUE_SUBSCRIBED";
    pub const PLAYER_SUBSCRIBED: &str = "PLAYER_SUBSCRIBED";
    pub const PONG: &str = "PONG";
    pub const ERROR: &str = "ERROR";
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    MatchUpdate(MatchUpdate),
    MatchEvent(MatchEvent),
    MatchStatusChange(MatchStatusChange),
    StandingsUpdate(StandingsUpdate),
    PlayerStatsUpdate(PlayerStatsUpdate),
    Notification(Notification),
    SystemAlert(SystemAlert),
    PrivateMessage(PrivateMessage),
    ChatMessage(ChatMessage),
    MatchPrediction(MatchPrediction),
    MatchReaction(MatchReaction),
    MatchCommentary(MatchCommentary),
    InjuryUpdate(InjuryUpdate),
    TransferNews(TransferNews),
    UserJoined(Presence),
    UserLeft(Presence),
    LeagueSubscribed(Presence),
    PlayerSubscribed(Presence),
    Pong(Pong),
    Error(ServerError),
    /// A discriminator this client does not model. The raw body is kept.
    Unknown { kind: String, body: Value },
}

impl LiveMessage {
    /// Decode a MESSAGE body.
    pub fn decode(body: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingDiscriminator)?
            .to_string();

        let msg = match kind.as_str() {
            kinds::MATCH_UPDATE => LiveMessage::MatchUpdate(serde_json::from_value(value)?),
            kinds::MATCH_EVENT => LiveMessage::MatchEvent(serde_json::from_value(value)?),
            kinds::MATCH_STATUS_CHANGE => {
                LiveMessage::MatchStatusChange(serde_json::from_value(value)?)
            }
            kinds::STANDINGS_UPDATE => LiveMessage::StandingsUpdate(serde_json::from_value(value)?),
            kinds::PLAYER_STATS_UPDATE => {
                LiveMessage::PlayerStatsUpdate(serde_json::from_value(value)?)
            }
            kinds::NOTIFICATION => LiveMessage::Notification(serde_json::from_value(value)?),
            kinds::SYSTEM_ALERT => LiveMessage::SystemAlert(serde_json::from_value(value)?),
            kinds::PRIVATE_MESSAGE => LiveMessage::PrivateMessage(serde_json::from_value(value)?),
            kinds::CHAT_MESSAGE => LiveMessage::ChatMessage(serde_json::from_value(value)?),
            kinds::MATCH_PREDICTION => LiveMessage::MatchPrediction(serde_json::from_value(value)?),
            kinds::MATCH_REACTION => LiveMessage::MatchReaction(serde_json::from_value(value)?),
            kinds::MATCH_COMMENTARY => LiveMessage::MatchCommentary(serde_json::from_value(value)?),
            kinds::INJURY_UPDATE => LiveMessage::InjuryUpdate(serde_json::from_value(value)?),
            kinds::TRANSFER_NEWS => LiveMessage::TransferNews(serde_json::from_value(value)?),
            kinds::USER_JOINED => LiveMessage::UserJoined(serde_json::from_value(value)?),
            kinds::USER_LEFT => LiveMessage::UserLeft(serde_json::from_value(value)?),
            kinds::LEAGUE_SUBSCRIBED => LiveMessage::LeagueSubscribed(serde_json::from_value(value)?),
            kinds::PLAYER_SUBSCRIBED => LiveMessage::PlayerSubscribed(serde_json::from_value(value)?),
            kinds::PONG => LiveMessage::Pong(serde_json::from_value(value)?),
            kinds::ERROR => LiveMessage::Error(serde_json::from_value(value)?),
            _ => LiveMessage::Unknown { kind, body: value },
        };
        Ok(msg)
    }

    /// The wire discriminator of this message.
    pub fn kind(&self) -> &str {
        match self {
            LiveMessage::MatchUpdate(_) => kinds::MATCH_UPDATE,
            LiveMessage::MatchEvent(_) => kinds::MATCH_EVENT,
            LiveMessage::MatchStatusChange(_) => kinds::MATCH_STATUS_CHANGE,
            LiveMessage::StandingsUpdate(_) => kinds::STANDINGS_UPDATE,
            LiveMessage::PlayerStatsUpdate(_) => kinds::PLAYER_STATS_UPDATE,
            LiveMessage::Notification(_) => kinds::NOTIFICATION,
            LiveMessage::SystemAlert(_) => kinds::SYSTEM_ALERT,
            LiveMessage::PrivateMessage(_) => kinds::PRIVATE_MESSAGE,
            LiveMessage::ChatMessage(_) => kinds::CHAT_MESSAGE,
            LiveMessage::MatchPrediction(_) => kinds::MATCH_PREDICTION,
            LiveMessage::MatchReaction(_) => kinds::MATCH_REACTION,
            LiveMessage::MatchCommentary(_) => kinds::MATCH_COMMENTARY,
            LiveMessage::InjuryUpdate(_) => kinds::INJURY_UPDATE,
            LiveMessage::TransferNews(_) => kinds::TRANSFER_NEWS,
            LiveMessage::UserJoined(_) => kinds::USER_JOINED,
            LiveMessage::UserLeft(_) => kinds::USER_LEFT,
            LiveMessage::LeagueSubscribed(_) => kinds::LEAGUE_SUBSCRIBED,
            LiveMessage::PlayerSubscribed(_) => kinds::PLAYER_SUBSCRIBED,
            LiveMessage::Pong(_) => kinds::PONG,
            LiveMessage::Error(_) => kinds::ERROR,
            LiveMessage::Unknown { kind, .. } => kind,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, LiveMessage::Unknown { .. })
    }

    /// Match the message is about, when it is match-scoped.
    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            LiveMessage::MatchUpdate(m) => Some(m.match_id),
            LiveMessage::MatchEvent(m) => Some(m.match_id),
            LiveMessage::MatchStatusChange(m) => Some(m.match_id),
            LiveMessage::ChatMessage(m) => Some(m.match_id),
            LiveMessage::MatchPrediction(m) => Some(m.match_id),
            LiveMessage::MatchReaction(m) => Some(m.match_id),
            LiveMessage::MatchCommentary(m) => Some(m.match_id),
            LiveMessage::UserJoined(p) | LiveMessage::UserLeft(p) => p.match_id,
            _ => None,
        }
    }
}

/// Score and/or status snapshot. Absent fields mean "unchanged".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchUpdate {
    pub match_id: MatchId,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub home_score: Option<i32>,
    #[serde(default)]
    pub away_score: Option<i32>,
    #[serde(default)]
    pub status: Option<MatchStatus>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Timeline event (goal, card, substitution, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    pub match_id: MatchId,
    pub event_type: String,
    /// Display minute, e.g. `"45+2"`. Numbers are accepted too.
    #[serde(default, deserialize_with = "lenient_string")]
    pub minute: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub is_home_team: Option<bool>,
    #[serde(default)]
    pub home_score: Option<i32>,
    #[serde(default)]
    pub away_score: Option<i32>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl MatchEvent {
    pub fn is_goal(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            "GOAL" | "PENALTY_GOAL" | "OWN_GOAL"
        )
    }

    pub fn is_card(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            "YELLOW_CARD" | "RED_CARD" | "BOOKING"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatusChange {
    pub match_id: MatchId,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub old_status: Option<MatchStatus>,
    pub new_status: MatchStatus,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsUpdate {
    pub league_id: LeagueId,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatsUpdate {
    pub player_id: PlayerId,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub league_id: Option<LeagueId>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub season: Option<String>,
    #[serde(default)]
    pub goals: Option<i32>,
    #[serde(default)]
    pub assists: Option<i32>,
    #[serde(default)]
    pub appearances: Option<i32>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub notification_type: NotificationKind,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAlert {
    pub alert: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub match_id: MatchId,
    #[serde(default)]
    pub username: Option<String>,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPrediction {
    pub match_id: MatchId,
    #[serde(default)]
    pub username: Option<String>,
    pub prediction: String,
    #[serde(default)]
    pub prediction_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReaction {
    pub match_id: MatchId,
    #[serde(default)]
    pub username: Option<String>,
    pub emoji: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCommentary {
    pub match_id: MatchId,
    pub commentary: String,
    #[serde(default)]
    pub commentator: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjuryUpdate {
    pub player_id: PlayerId,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub injury_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_return: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferNews {
    pub player_name: String,
    #[serde(default)]
    pub from_team: Option<String>,
    #[serde(default)]
    pub to_team: Option<String>,
    #[serde(default)]
    pub transfer_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Acknowledgements the service broadcasts for join/leave/subscribe actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub match_id: Option<MatchId>,
    #[serde(default)]
    pub league_id: Option<LeagueId>,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Application-level failure reported inside a MESSAGE body (not a STOMP ERROR frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: Option<String>,
}

/// Match lifecycle status. Values the client does not know are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchStatus {
    Scheduled,
    Live,
    HalfTime,
    FullTime,
    Completed,
    Finished,
    Cancelled,
    Postponed,
    Other(String),
}

impl MatchStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::Live => "LIVE",
            MatchStatus::HalfTime => "HALF_TIME",
            MatchStatus::FullTime => "FULL_TIME",
            MatchStatus::Completed => "COMPLETED",
            MatchStatus::Finished => "FINISHED",
            MatchStatus::Cancelled => "CANCELLED",
            MatchStatus::Postponed => "POSTPONED",
            MatchStatus::Other(s) => s,
        }
    }

    /// True once the result can no longer change.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            MatchStatus::FullTime
                | MatchStatus::Completed
                | MatchStatus::Finished
                | MatchStatus::Cancelled
        )
    }
}

impl From<String> for MatchStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "SCHEDULED" => MatchStatus::Scheduled,
            "LIVE" => MatchStatus::Live,
            "HALF_TIME" | "HALFTIME" => MatchStatus::HalfTime,
            "FULL_TIME" | "FULLTIME" => MatchStatus::FullTime,
            "COMPLETED" => MatchStatus::Completed,
            "FINISHED" => MatchStatus::Finished,
            "CANCELLED" => MatchStatus::Cancelled,
            "POSTPONED" => MatchStatus::Postponed,
            _ => MatchStatus::Other(s),
        }
    }
}

impl From<MatchStatus> for String {
    fn from(s: MatchStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation class of a notification (`notificationType` on the wire).
/// Unrecognized values and `null` read as [`Info`](Self::Info).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }

    /// Map a SYSTEM_ALERT severity onto a notification class.
    pub fn from_severity(severity: &str) -> Self {
        match severity.to_ascii_lowercase().as_str() {
            "critical" | "high" | "error" | "fatal" => NotificationKind::Error,
            "warning" | "warn" | "medium" => NotificationKind::Warning,
            "success" | "ok" | "resolved" => NotificationKind::Success,
            _ => NotificationKind::Info,
        }
    }
}

impl From<String> for NotificationKind {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "success" => NotificationKind::Success,
            "warning" => NotificationKind::Warning,
            "error" => NotificationKind::Error,
            _ => NotificationKind::Info,
        }
    }
}

impl From<Option<String>> for NotificationKind {
    fn from(s: Option<String>) -> Self {
        s.map(Self::from).unwrap_or_default()
    }
}

impl From<NotificationKind> for String {
    fn from(k: NotificationKind) -> Self {
        k.as_str().to_string()
    }
}

/// Accept a string, a number or null where the server is inconsistent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
