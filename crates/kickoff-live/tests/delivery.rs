mod common;

use std::sync::{Arc, Mutex};

use common::{client, next_server, MockConnector};
use kickoff_core::MatchId;
use kickoff_live::{Delivery, Ingested};
use kickoff_protocol::frames::Command;
use kickoff_protocol::LiveMessage;
use serde_json::{json, Value};
use tokio::sync::mpsc;

fn body(frame: &kickoff_protocol::Frame) -> Value {
    serde_json::from_str(&frame.body).unwrap()
}

#[tokio::test(start_paused = true)]
async fn queued_messages_flush_in_order_exactly_once() {
    let (connector, mut servers) = MockConnector::new();
    let client = client(connector);

    for name in ["a", "b", "c"] {
        let d = client.send(&format!("/app/{}", name), json!({ "n": name }));
        assert_eq!(d, Delivery::Queued);
    }
    assert_eq!(client.pending_outbound(), 3);

    client.connect().await.unwrap();
    assert_eq!(client.pending_outbound(), 0);

    let mut server = next_server(&mut servers).await;
    assert_eq!(server.next_frame().await.command, Command::Connect);
    for name in ["a", "b", "c"] {
        let f = server.next_frame().await;
        assert_eq!(f.command, Command::Send);
        assert_eq!(f.get("destination"), Some(format!("/app/{}", name).as_str()));
        assert_eq!(f.get("content-type"), Some("application/json"));
        assert_eq!(body(&f)["n"], name);
    }
    assert!(server.drain_raw().is_empty());

    assert_eq!(client.send("/app/d", json!({})), Delivery::Sent);
    assert_eq!(server.next_frame().await.get("destination"), Some("/app/d"));
}

#[tokio::test(start_paused = true)]
async fn replay_happens_before_flush() {
    let (connector, mut servers) = MockConnector::new();
    let client = client(connector);

    client.join_match(MatchId(7), "alice").unwrap();
    client.subscribe_to_match_chat(MatchId(7), |_| {});
    client.connect().await.unwrap();

    let mut server = next_server(&mut servers).await;
    let commands: Vec<Command> = [
        server.next_frame().await,
        server.next_frame().await,
        server.next_frame().await,
    ]
    .iter()
    .map(|f| f.command)
    .collect();
    assert_eq!(commands, vec![Command::Connect, Command::Subscribe, Command::Send]);
}

#[tokio::test(start_paused = true)]
async fn convenience_wrappers_hit_service_destinations() {
    let (connector, mut servers) = MockConnector::new();
    let client = client(connector);
    client.connect().await.unwrap();
    let mut server = next_server(&mut servers).await;
    server.next_frame().await; // CONNECT

    client.join_match(MatchId(7), "alice").unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/match.join"));
    assert_eq!(body(&f), json!({ "matchId": 7, "username": "alice" }));

    client.leave_match();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/match.leave"));
    assert_eq!(body(&f), json!({}));

    client.send_chat_message(MatchId(7), "what a goal").unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/match.chat"));
    assert_eq!(body(&f)["message"], "what a goal");

    client.submit_prediction(MatchId(7), "2-1", "score").unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/match.prediction"));
    assert_eq!(body(&f)["type"], "score");

    client.send_reaction(MatchId(7), "⚽", Some("ev-9")).unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/match.reaction"));
    assert_eq!(body(&f)["eventId"], "ev-9");

    client.subscribe_to_league(kickoff_core::LeagueId(3), "alice").unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/league.subscribe"));
    assert_eq!(body(&f)["leagueId"], 3);

    client.subscribe_to_player(kickoff_core::PlayerId(11), "alice").unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/player.subscribe"));
    assert_eq!(body(&f)["playerId"], 11);

    client.request_match_data(MatchId(7)).unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/match.request-data"));

    client.ping().unwrap();
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/app/ping"));
    assert!(body(&f)["ping"].is_i64());
}

#[tokio::test(start_paused = true)]
async fn only_the_latest_handler_receives() {
    let (connector, mut servers) = MockConnector::new();
    let client = client(connector);
    let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

    let first = tx.clone();
    client.subscribe("/topic/matches", move |_| {
        let _ = first.send("first");
    });
    let second = tx.clone();
    client.subscribe("/topic/matches", move |_| {
        let _ = second.send("second");
    });

    client.connect().await.unwrap();
    let mut server = next_server(&mut servers).await;
    server.next_frame().await; // CONNECT
    assert_eq!(server.next_frame().await.command, Command::Subscribe);
    assert!(server.drain_raw().is_empty(), "topic subscribed twice on the wire");

    server.push_message("/topic/matches", r#"{"type":"MATCH_UPDATE","matchId":1}"#);
    server.push_message("/topic/matches", r#"{"type":"MATCH_UPDATE","matchId":2}"#);
    assert_eq!(rx.recv().await, Some("second"));
    assert_eq!(rx.recv().await, Some("second"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn unknown_kind_reaches_wildcard_only() {
    let (connector, mut servers) = MockConnector::new();
    let client = client(connector);
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();

    let wild = tx.clone();
    client.subscribe_all(move |m| {
        let _ = wild.send(("*".into(), m.kind().to_string()));
    });
    let topic = tx.clone();
    client.subscribe_to_all_matches(move |m| {
        let _ = topic.send(("matches".into(), m.kind().to_string()));
    });

    client.connect().await.unwrap();
    let server = next_server(&mut servers).await;
    server.push_message("/topic/matches", r#"{"type":"HALFTIME_SHOW","matchId":1}"#);
    server.push_message("/topic/matches", r#"{"type":"MATCH_UPDATE","matchId":1}"#);

    let mut got = Vec::new();
    for _ in 0..3 {
        got.push(rx.recv().await.unwrap());
    }
    assert_eq!(
        got,
        vec![
            ("*".to_string(), "HALFTIME_SHOW".to_string()),
            ("matches".to_string(), "MATCH_UPDATE".to_string()),
            ("*".to_string(), "MATCH_UPDATE".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn broadcast_event_reaches_per_match_topic() {
    let (connector, mut servers) = MockConnector::new();
    let client = client(connector);
    let (tx, mut rx) = mpsc::unbounded_channel::<LiveMessage>();

    client.subscribe_to_match_events(MatchId(7), move |m| {
        let _ = tx.send(m.clone());
    });
    client.connect().await.unwrap();
    let server = next_server(&mut servers).await;

    server.push_message(
        "/topic/events",
        r#"{"type":"MATCH_EVENT","matchId":7,"eventType":"GOAL","minute":"23","homeScore":1,"awayScore":0}"#,
    );
    let LiveMessage::MatchEvent(ev) = rx.recv().await.unwrap() else {
        panic!("expected a match event");
    };
    assert!(ev.is_goal());

    // state was updated before the handler ran
    let state = client.match_state(MatchId(7)).unwrap();
    assert_eq!((state.score.home, state.score.away), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn match_rooms_listen_on_broadcast_channels() {
    let (connector, mut servers) = MockConnector::new();
    let client = client(connector);
    let (tx, mut rx) = mpsc::unbounded_channel::<(&'static str, String)>();

    let chat = tx.clone();
    client.subscribe_to_match_chat(MatchId(7), move |m| {
        let _ = chat.send(("chat", m.kind().to_string()));
    });
    let reactions = tx.clone();
    client.subscribe_to_match_reactions(MatchId(7), move |m| {
        let _ = reactions.send(("reactions", m.kind().to_string()));
    });
    client.connect().await.unwrap();

    let mut server = next_server(&mut servers).await;
    server.next_frame().await; // CONNECT
    let mut destinations = Vec::new();
    for _ in 0..2 {
        let f = server.next_frame().await;
        assert_eq!(f.command, Command::Subscribe);
        destinations.push(f.get("destination").unwrap_or_default().to_string());
    }
    assert_eq!(destinations, vec!["/topic/match/chat", "/topic/match/reactions"]);
    assert!(server.drain_raw().is_empty());

    // attaches straight away while connected
    let predictions = tx.clone();
    client.subscribe_to_match_predictions(MatchId(7), move |m| {
        let _ = predictions.send(("predictions", m.kind().to_string()));
    });
    let f = server.next_frame().await;
    assert_eq!(f.get("destination"), Some("/topic/match/predictions"));

    // another match's room rides the same channel
    client.subscribe_to_match_chat(MatchId(8), |_| {});
    assert!(server.drain_raw().is_empty());

    server.push_message(
        "/topic/match/chat",
        r#"{"type":"CHAT_MESSAGE","matchId":8,"username":"bob","message":"elsewhere"}"#,
    );
    server.push_message(
        "/topic/match/chat",
        r#"{"type":"CHAT_MESSAGE","matchId":7,"username":"ann","message":"come on"}"#,
    );
    server.push_message(
        "/topic/match/reactions",
        r#"{"type":"MATCH_REACTION","matchId":7,"emoji":"🔥"}"#,
    );
    server.push_message(
        "/topic/match/predictions",
        r#"{"type":"MATCH_PREDICTION","matchId":7,"prediction":"2-1","predictionType":"score"}"#,
    );

    let mut got = Vec::new();
    for _ in 0..3 {
        got.push(rx.recv().await.unwrap());
    }
    assert_eq!(
        got,
        vec![
            ("chat", "CHAT_MESSAGE".to_string()),
            ("reactions", "MATCH_REACTION".to_string()),
            ("predictions", "MATCH_PREDICTION".to_string()),
        ]
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(client.match_state(MatchId(7)).unwrap().chat.len(), 1);
}

#[test]
fn partial_updates_merge_through_ingest() {
    let (connector, _servers) = MockConnector::new();
    let client = client(connector);

    let frame = |body: &str| {
        format!(
            "MESSAGE\ndestination:/topic/matches\nsubscription:sub-0\nmessage-id:1\n\n{}\0",
            body
        )
    };
    client.ingest(&frame(r#"{"type":"MATCH_UPDATE","matchId":4,"homeScore":2}"#));
    client.ingest(&frame(r#"{"type":"MATCH_UPDATE","matchId":4,"awayScore":1}"#));

    let state = client.match_state(MatchId(4)).unwrap();
    assert_eq!(state.score.to_string(), "2:1");
}

#[test]
fn event_history_keeps_most_recent_fifty() {
    let (connector, _servers) = MockConnector::new();
    let client = client(connector);

    for i in 0..60 {
        let raw = format!(
            "MESSAGE\ndestination:/topic/events\n\n{{\"type\":\"MATCH_EVENT\",\"matchId\":1,\"eventType\":\"CORNER\",\"description\":\"e{}\"}}\0",
            i
        );
        assert!(matches!(client.ingest(&raw), Ingested::Delivered { .. }));
    }
    let state = client.match_state(MatchId(1)).unwrap();
    assert_eq!(state.events.len(), 50);
    assert_eq!(state.events.front().unwrap().description.as_deref(), Some("e10"));
    assert_eq!(state.last_event.unwrap().description.as_deref(), Some("e59"));
}

#[test]
fn malformed_frames_do_not_disturb_state() {
    let (connector, _servers) = MockConnector::new();
    let client = client(connector);
    let seen = Arc::new(Mutex::new(0usize));
    let s = seen.clone();
    client.subscribe_all(move |_| *s.lock().unwrap() += 1);

    assert_eq!(client.ingest("NOPE\n\n\0"), Ingested::Dropped);
    assert_eq!(
        client.ingest("MESSAGE\ndestination:/topic/x\n\n{\"matchId\":1}\0"),
        Ingested::Dropped
    );
    assert_eq!(*seen.lock().unwrap(), 0);
    assert!(client.tracked_matches().is_empty());
}

#[test]
fn notifications_are_kept_and_marked() {
    let (connector, _servers) = MockConnector::new();
    let client = client(connector);
    client.ingest(
        "MESSAGE\ndestination:/topic/notifications\n\n{\"type\":\"NOTIFICATION\",\"title\":\"Kickoff\",\"message\":\"Derby starts\",\"notificationType\":\"info\"}\0",
    );
    client.ingest(
        "MESSAGE\ndestination:/topic/system\n\n{\"type\":\"SYSTEM_ALERT\",\"alert\":\"Degraded feed\",\"severity\":\"warning\"}\0",
    );

    let all = client.notifications();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].kind, kickoff_protocol::NotificationKind::Warning);
    assert_eq!(client.unread_notifications(), 2);
    assert!(client.mark_notification_read(all[0].id));
    assert_eq!(client.unread_notifications(), 1);
    client.clear_notifications();
    assert!(client.notifications().is_empty());
}
