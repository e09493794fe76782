//! Inbound frame decoding and topic routing.

use std::sync::Mutex;

use kickoff_protocol::frames::{self, Command, Inbound};
use kickoff_protocol::messages::LiveMessage;
use kickoff_protocol::topics;
use tracing::{debug, warn};

use crate::registry::Handler;
use crate::state::LiveStore;

/// What one inbound text message turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Heartbeat,
    /// A decoded MESSAGE and the number of handlers it reached.
    Delivered { kind: String, handlers: usize },
    /// A STOMP ERROR frame from the broker.
    BrokerError(String),
    /// Undecodable or irrelevant; already logged.
    Dropped,
}

/// Decodes inbound frames, folds them into the store and fans them out.
pub struct MessageDispatcher<'a> {
    store: &'a Mutex<LiveStore>,
}

impl<'a> MessageDispatcher<'a> {
    pub fn new(store: &'a Mutex<LiveStore>) -> Self {
        Self { store }
    }

    /// Process one raw text message.
    ///
    /// `lookup` resolves a list of topics to handlers; it is called once, and
    /// the handlers are invoked after it returns so callers can hold a lock
    /// inside `lookup` without handlers running under it.
    pub fn ingest<L>(&self, raw: &str, lookup: L) -> Ingested
    where
        L: FnOnce(&[String]) -> Vec<Handler>,
    {
        let frame = match frames::parse(raw) {
            Ok(Inbound::Heartbeat) => return Ingested::Heartbeat,
            Ok(Inbound::Frame(frame)) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return Ingested::Dropped;
            }
        };

        match frame.command {
            Command::Message => {}
            Command::Error => {
                let reason = frame
                    .get("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone());
                warn!(reason = %reason, "broker sent ERROR frame");
                return Ingested::BrokerError(reason);
            }
            other => {
                debug!(command = other.as_str(), "ignoring frame");
                return Ingested::Dropped;
            }
        }

        let destination = frame.get("destination");
        let msg = match LiveMessage::decode(&frame.body) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    destination = destination.unwrap_or("-"),
                    error = %e,
                    "dropping undecodable message"
                );
                return Ingested::Dropped;
            }
        };

        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .apply(&msg);

        let targets = route(destination, &msg);
        let handlers = lookup(&targets);
        for handler in &handlers {
            handler(&msg);
        }
        Ingested::Delivered {
            kind: msg.kind().to_string(),
            handlers: handlers.len(),
        }
    }
}

/// Topics a message is delivered to, in invocation order: the wire topic,
/// the wildcard, then the per-entity topics derived from embedded ids.
///
/// Unknown kinds only reach the wildcard.
pub fn route(wire_topic: Option<&str>, msg: &LiveMessage) -> Vec<String> {
    if msg.is_unknown() {
        warn!(kind = msg.kind(), "unknown message type");
        return vec![topics::WILDCARD.to_string()];
    }

    let mut out = Vec::with_capacity(3);
    if let Some(topic) = wire_topic {
        out.push(topic.to_string());
    }
    out.push(topics::WILDCARD.to_string());
    for topic in entity_topics(msg) {
        if !out.contains(&topic) {
            out.push(topic);
        }
    }
    out
}

/// Narrow per-entity topics a message also belongs to.
pub fn entity_topics(msg: &LiveMessage) -> Vec<String> {
    match msg {
        LiveMessage::MatchUpdate(m) => vec![topics::match_updates(m.match_id)],
        LiveMessage::MatchEvent(m) => vec![topics::match_events(m.match_id)],
        LiveMessage::MatchStatusChange(m) => vec![topics::match_status(m.match_id)],
        LiveMessage::ChatMessage(m) => vec![topics::match_chat(m.match_id)],
        LiveMessage::MatchPrediction(m) => vec![topics::match_predictions(m.match_id)],
        LiveMessage::MatchReaction(m) => vec![topics::match_reactions(m.match_id)],
        LiveMessage::MatchCommentary(m) => vec![topics::match_commentary(m.match_id)],
        LiveMessage::StandingsUpdate(s) => vec![topics::league_standings(s.league_id)],
        LiveMessage::PlayerStatsUpdate(p) => vec![topics::player_stats(p.player_id)],
        LiveMessage::InjuryUpdate(i) => vec![topics::player_injury(i.player_id)],
        _ => Vec::new(),
    }
}
