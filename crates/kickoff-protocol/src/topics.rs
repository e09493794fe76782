//! Broker topic names.
//!
//! Broadcast channels carry every entity's updates; the per-entity builders
//! name the narrow channels the service also publishes to.

use kickoff_core::{LeagueId, MatchId, PlayerId};

/// Reserved local topic: a handler registered here sees every decoded message.
/// Never sent to the broker.
pub const WILDCARD: &str = "*";

pub const ALL_MATCHES: &str = "/topic/matches";
pub const ALL_EVENTS: &str = "/topic/events";
pub const MATCH_STATUS: &str = "/topic/match-status";
pub const MATCH_CHAT: &str = "/topic/match/chat";
pub const MATCH_PREDICTIONS: &str = "/topic/match/predictions";
pub const MATCH_REACTIONS: &str = "/topic/match/reactions";
pub const NOTIFICATIONS: &str = "/topic/notifications";
pub const SYSTEM: &str = "/topic/system";
pub const PUBLIC: &str = "/topic/public";
pub const PLAYER_STATS: &str = "/topic/player-stats";
pub const INJURIES: &str = "/topic/injuries";
pub const TRANSFERS: &str = "/topic/transfers";
pub const PONG: &str = "/topic/pong";
pub const PRIVATE_MESSAGES: &str = "/user/queue/messages";

pub fn match_updates(id: MatchId) -> String {
    format!("/topic/match/{}", id)
}

pub fn match_events(id: MatchId) -> String {
    format!("/topic/match/{}/events", id)
}

pub fn match_status(id: MatchId) -> String {
    format!("/topic/match/{}/status", id)
}

pub fn match_chat(id: MatchId) -> String {
    format!("/topic/match/{}/chat", id)
}

pub fn match_predictions(id: MatchId) -> String {
    format!("/topic/match/{}/predictions", id)
}

pub fn match_reactions(id: MatchId) -> String {
    format!("/topic/match/{}/reactions", id)
}

pub fn match_commentary(id: MatchId) -> String {
    format!("/topic/match/{}/commentary", id)
}

pub fn league_standings(id: LeagueId) -> String {
    format!("/topic/league/{}/standings", id)
}

pub fn player_stats(id: PlayerId) -> String {
    format!("/topic/player/{}/stats", id)
}

pub fn player_injury(id: PlayerId) -> String {
    format!("/topic/player/{}/injury", id)
}

/// Broadcast channel a per-match room topic is carved out of.
///
/// The service publishes chat, predictions and reactions for every match on
/// one channel each; `/topic/match/{id}/chat` and friends exist only on the
/// client and are filled from the broadcast by match id.
pub fn broadcast_source(topic: &str) -> Option<&'static str> {
    let rest = topic.strip_prefix("/topic/match/")?;
    let (id, room) = rest.split_once('/')?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match room {
        "chat" => Some(MATCH_CHAT),
        "predictions" => Some(MATCH_PREDICTIONS),
        "reactions" => Some(MATCH_REACTIONS),
        _ => None,
    }
}

/// True for topics that only exist client-side.
pub fn is_local(topic: &str) -> bool {
    topic == WILDCARD || broadcast_source(topic).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_topics_are_local() {
        let id = MatchId(7);
        assert_eq!(broadcast_source(&match_chat(id)), Some(MATCH_CHAT));
        assert_eq!(broadcast_source(&match_predictions(id)), Some(MATCH_PREDICTIONS));
        assert_eq!(broadcast_source(&match_reactions(id)), Some(MATCH_REACTIONS));
        assert!(is_local(&match_chat(id)));
        assert!(is_local(WILDCARD));
    }

    #[test]
    fn published_topics_go_on_the_wire() {
        let id = MatchId(7);
        for topic in [
            MATCH_CHAT.to_string(),
            MATCH_PREDICTIONS.to_string(),
            match_updates(id),
            match_events(id),
            match_status(id),
            match_commentary(id),
            "/topic/match/x/chat".to_string(),
        ] {
            assert!(!is_local(&topic), "{} should be attached", topic);
        }
    }
}
