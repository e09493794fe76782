//! Reconciled live state built from dispatched messages.
//!
//! Updates are partial: a field absent from a message leaves the stored
//! value untouched. Histories are bounded and evict oldest first.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use kickoff_core::{LiveConfig, MatchId};
use kickoff_protocol::messages::{
    ChatMessage, MatchCommentary, MatchEvent, MatchStatus, NotificationKind,
};
use kickoff_protocol::LiveMessage;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub home: i32,
    pub away: i32,
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.home, self.away)
    }
}

/// Everything known about one match. Created on the first update for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub match_id: MatchId,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub score: Score,
    pub status: Option<MatchStatus>,
    pub events: VecDeque<MatchEvent>,
    pub last_event: Option<MatchEvent>,
    pub chat: VecDeque<ChatMessage>,
    pub commentary: VecDeque<MatchCommentary>,
    /// Reaction count per emoji.
    pub reactions: BTreeMap<String, u32>,
    pub predictions: u32,
}

impl MatchState {
    fn new(match_id: MatchId) -> Self {
        Self {
            match_id,
            home_team: None,
            away_team: None,
            score: Score::default(),
            status: None,
            events: VecDeque::new(),
            last_event: None,
            chat: VecDeque::new(),
            commentary: VecDeque::new(),
            reactions: BTreeMap::new(),
            predictions: 0,
        }
    }

    fn merge_score(&mut self, home: Option<i32>, away: Option<i32>) {
        if let Some(h) = home {
            self.score.home = h;
        }
        if let Some(a) = away {
            self.score.away = a;
        }
    }

    fn merge_teams(&mut self, home: &Option<String>, away: &Option<String>) {
        if home.is_some() {
            self.home_team.clone_from(home);
        }
        if away.is_some() {
            self.away_team.clone_from(away);
        }
    }

    pub fn goals(&self) -> impl Iterator<Item = &MatchEvent> {
        self.events.iter().filter(|e| e.is_goal())
    }
}

/// A notification as kept in the global list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    /// Monotonic per-store id, used by `mark_read`.
    pub id: u64,
    pub title: Option<String>,
    pub message: String,
    pub kind: NotificationKind,
    pub received_at: DateTime<Utc>,
    pub read: bool,
}

/// History caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub events: usize,
    pub chat: usize,
    pub notifications: usize,
}

impl From<&LiveConfig> for Limits {
    fn from(cfg: &LiveConfig) -> Self {
        Self {
            events: cfg.event_history,
            chat: cfg.chat_history,
            notifications: cfg.notification_history,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&LiveConfig::default())
    }
}

/// Per-match state plus the match-independent notification list.
#[derive(Debug, Default)]
pub struct LiveStore {
    limits: Limits,
    matches: HashMap<MatchId, MatchState>,
    notifications: VecDeque<NotificationEntry>,
    next_notification: u64,
}

impl LiveStore {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    /// Fold one message into the store. Kinds that carry no state are ignored.
    ///
    /// Nothing is deduplicated: applying the same event twice records it twice.
    pub fn apply(&mut self, msg: &LiveMessage) {
        match msg {
            LiveMessage::MatchUpdate(u) => {
                let m = self.entry(u.match_id);
                m.merge_teams(&u.home_team, &u.away_team);
                m.merge_score(u.home_score, u.away_score);
                if let Some(status) = &u.status {
                    m.status = Some(status.clone());
                }
            }
            LiveMessage::MatchEvent(ev) => {
                let cap = self.limits.events;
                let m = self.entry(ev.match_id);
                m.merge_score(ev.home_score, ev.away_score);
                push_bounded(&mut m.events, ev.clone(), cap);
                m.last_event = Some(ev.clone());
            }
            LiveMessage::MatchStatusChange(c) => {
                let m = self.entry(c.match_id);
                m.merge_teams(&c.home_team, &c.away_team);
                m.status = Some(c.new_status.clone());
            }
            LiveMessage::ChatMessage(c) => {
                let cap = self.limits.chat;
                push_bounded(&mut self.entry(c.match_id).chat, c.clone(), cap);
            }
            LiveMessage::MatchCommentary(c) => {
                let cap = self.limits.events;
                push_bounded(&mut self.entry(c.match_id).commentary, c.clone(), cap);
            }
            LiveMessage::MatchReaction(r) => {
                *self
                    .entry(r.match_id)
                    .reactions
                    .entry(r.emoji.clone())
                    .or_insert(0) += 1;
            }
            LiveMessage::MatchPrediction(p) => {
                self.entry(p.match_id).predictions += 1;
            }
            LiveMessage::Notification(n) => {
                self.push_notification(n.title.clone(), n.message.clone(), n.notification_type);
            }
            LiveMessage::SystemAlert(a) => {
                let kind = a
                    .severity
                    .as_deref()
                    .map(NotificationKind::from_severity)
                    .unwrap_or_default();
                self.push_notification(Some("System alert".to_string()), a.alert.clone(), kind);
            }
            _ => {}
        }
    }

    pub fn match_state(&self, id: MatchId) -> Option<&MatchState> {
        self.matches.get(&id)
    }

    pub fn match_ids(&self) -> Vec<MatchId> {
        let mut ids: Vec<MatchId> = self.matches.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Oldest first.
    pub fn notifications(&self) -> impl Iterator<Item = &NotificationEntry> {
        self.notifications.iter()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// Returns false if no notification has that id (evicted or never existed).
    pub fn mark_read(&mut self, id: u64) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in self.notifications.iter_mut() {
            n.read = true;
        }
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
    }

    fn entry(&mut self, id: MatchId) -> &mut MatchState {
        self.matches.entry(id).or_insert_with(|| MatchState::new(id))
    }

    fn push_notification(&mut self, title: Option<String>, message: String, kind: NotificationKind) {
        let entry = NotificationEntry {
            id: self.next_notification,
            title,
            message,
            kind,
            received_at: Utc::now(),
            read: false,
        };
        self.next_notification += 1;
        push_bounded(&mut self.notifications, entry, self.limits.notifications);
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    buf.push_back(item);
    while buf.len() > cap {
        buf.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(store: &mut LiveStore, body: &str) {
        store.apply(&LiveMessage::decode(body).unwrap());
    }

    #[test]
    fn partial_updates_merge() {
        let mut store = LiveStore::default();
        apply(&mut store, r#"{"type":"MATCH_UPDATE","matchId":1,"homeScore":2}"#);
        apply(&mut store, r#"{"type":"MATCH_UPDATE","matchId":1,"awayScore":1}"#);
        let m = store.match_state(MatchId(1)).unwrap();
        assert_eq!(m.score, Score { home: 2, away: 1 });
        assert_eq!(m.status, None);
    }

    #[test]
    fn event_history_is_bounded() {
        let mut store = LiveStore::default();
        for minute in 1..=60 {
            apply(
                &mut store,
                &format!(
                    r#"{{"type":"MATCH_EVENT","matchId":5,"eventType":"FOUL","minute":{}}}"#,
                    minute
                ),
            );
        }
        let m = store.match_state(MatchId(5)).unwrap();
        assert_eq!(m.events.len(), 50);
        assert_eq!(m.events.front().unwrap().minute.as_deref(), Some("11"));
        assert_eq!(m.last_event.as_ref().unwrap().minute.as_deref(), Some("60"));
    }

    #[test]
    fn event_carries_score() {
        let mut store = LiveStore::default();
        apply(
            &mut store,
            r#"{"type":"MATCH_EVENT","matchId":3,"eventType":"GOAL","minute":"12","homeScore":1,"awayScore":0}"#,
        );
        let m = store.match_state(MatchId(3)).unwrap();
        assert_eq!(m.score, Score { home: 1, away: 0 });
        assert_eq!(m.goals().count(), 1);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut store = LiveStore::default();
        let body = r#"{"type":"MATCH_EVENT","matchId":3,"eventType":"GOAL"}"#;
        apply(&mut store, body);
        apply(&mut store, body);
        assert_eq!(store.match_state(MatchId(3)).unwrap().events.len(), 2);
    }

    #[test]
    fn chat_is_bounded_separately() {
        let mut store = LiveStore::new(Limits {
            events: 50,
            chat: 3,
            notifications: 50,
        });
        for i in 0..5 {
            apply(
                &mut store,
                &format!(r#"{{"type":"CHAT_MESSAGE","matchId":9,"message":"m{}"}}"#, i),
            );
        }
        let chat: Vec<_> = store
            .match_state(MatchId(9))
            .unwrap()
            .chat
            .iter()
            .map(|c| c.message.as_str())
            .collect();
        assert_eq!(chat, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn status_change_and_teams() {
        let mut store = LiveStore::default();
        apply(
            &mut store,
            r#"{"type":"MATCH_UPDATE","matchId":4,"homeTeam":"Ahly","awayTeam":"Zamalek"}"#,
        );
        apply(
            &mut store,
            r#"{"type":"MATCH_STATUS_CHANGE","matchId":4,"oldStatus":"LIVE","newStatus":"FINISHED"}"#,
        );
        let m = store.match_state(MatchId(4)).unwrap();
        assert_eq!(m.home_team.as_deref(), Some("Ahly"));
        assert_eq!(m.status, Some(MatchStatus::Finished));
        assert!(m.status.as_ref().unwrap().is_final());
    }

    #[test]
    fn reactions_and_predictions_are_tallied() {
        let mut store = LiveStore::default();
        apply(&mut store, r#"{"type":"MATCH_REACTION","matchId":2,"emoji":"⚽"}"#);
        apply(&mut store, r#"{"type":"MATCH_REACTION","matchId":2,"emoji":"⚽"}"#);
        apply(&mut store, r#"{"type":"MATCH_REACTION","matchId":2,"emoji":"😡"}"#);
        apply(&mut store, r#"{"type":"MATCH_PREDICTION","matchId":2,"prediction":"2-1"}"#);
        let m = store.match_state(MatchId(2)).unwrap();
        assert_eq!(m.reactions.get("⚽"), Some(&2));
        assert_eq!(m.reactions.get("😡"), Some(&1));
        assert_eq!(m.predictions, 1);
    }

    #[test]
    fn notifications_bounded_and_classified() {
        let mut store = LiveStore::default();
        for i in 0..55 {
            apply(
                &mut store,
                &format!(
                    r#"{{"type":"NOTIFICATION","message":"n{}","notificationType":"success"}}"#,
                    i
                ),
            );
        }
        apply(
            &mut store,
            r#"{"type":"SYSTEM_ALERT","alert":"maintenance","severity":"high"}"#,
        );
        let all: Vec<_> = store.notifications().collect();
        assert_eq!(all.len(), 50);
        assert_eq!(all[0].message, "n6");
        assert_eq!(all[0].kind, NotificationKind::Success);
        assert_eq!(all[49].message, "maintenance");
        assert_eq!(all[49].kind, NotificationKind::Error);
    }

    #[test]
    fn mark_read_and_clear() {
        let mut store = LiveStore::default();
        apply(&mut store, r#"{"type":"NOTIFICATION","message":"a"}"#);
        apply(&mut store, r#"{"type":"NOTIFICATION","message":"b"}"#);
        assert_eq!(store.unread_count(), 2);
        let first = store.notifications().next().unwrap().id;
        assert!(store.mark_read(first));
        assert!(!store.mark_read(999));
        assert_eq!(store.unread_count(), 1);
        store.mark_all_read();
        assert_eq!(store.unread_count(), 0);
        store.clear_notifications();
        assert_eq!(store.notifications().count(), 0);
    }

    #[test]
    fn stateless_kinds_create_nothing() {
        let mut store = LiveStore::default();
        apply(&mut store, r#"{"type":"PONG"}"#);
        apply(&mut store, r#"{"type":"USER_JOINED","matchId":8,"username":"x"}"#);
        assert!(store.match_ids().is_empty());
    }
}
