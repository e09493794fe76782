//! kickoff-watch: follow live matches from a terminal.
//!
//! Usage:
//!   kickoff-watch --match 42 --match 43 --join --username alice
//!   kickoff-watch --topic /topic/notifications --url ws://live.example.com/ws/websocket

use anyhow::Result;
use clap::Parser;
use kickoff_core::{KickoffConfig, MatchId};
use kickoff_live::{ConnectionStatus, LiveClient, MatchState};
use kickoff_protocol::LiveMessage;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kickoff-watch", version)]
#[command(about = "Print live match updates as they arrive")]
struct Args {
    /// WebSocket URL of the update service (overrides the config file)
    #[arg(long)]
    url: Option<String>,

    /// Path to kickoff.toml
    #[arg(long, env = "KICKOFF_CONFIG")]
    config: Option<String>,

    /// Match id to follow; repeatable
    #[arg(long = "match", value_name = "ID")]
    matches: Vec<i64>,

    /// Extra topic to subscribe to; repeatable
    #[arg(long = "topic", value_name = "TOPIC")]
    topics: Vec<String>,

    /// Name used when joining match rooms
    #[arg(long, default_value = "watcher")]
    username: String,

    /// Announce presence in every followed match room
    #[arg(long)]
    join: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kickoff_watch=info,kickoff_live=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = KickoffConfig::load(args.config.as_deref())
        .unwrap_or_else(|e| {
            warn!("Config load failed ({}), using defaults", e);
            KickoffConfig::default()
        })
        .live;
    if let Some(url) = &args.url {
        config.url = url.clone();
    }

    let client = LiveClient::from_config(config);
    let (tx, mut rx) = mpsc::unbounded_channel::<LiveMessage>();
    for topic in watch_topics(&args) {
        let tx = tx.clone();
        client.subscribe(&topic, move |msg| {
            let _ = tx.send(msg.clone());
        });
    }
    drop(tx);

    if let Err(e) = client.connect().await {
        warn!(error = %e, "initial connect failed, retrying in background");
    }
    if args.join {
        for id in &args.matches {
            client.join_match(MatchId(*id), &args.username)?;
        }
    }

    let mut status = client.status_watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            msg = rx.recv() => match msg {
                Some(msg) => {
                    println!("{}", render(&msg));
                    if let Some(state) = msg.match_id().and_then(|id| client.match_state(id)) {
                        println!("{}", score_line(&state));
                    }
                }
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = status.borrow_and_update().clone();
                if snap.status == ConnectionStatus::Failed {
                    client.disconnect();
                    anyhow::bail!(
                        "gave up reconnecting: {}",
                        snap.last_error.unwrap_or_else(|| "unknown error".into())
                    );
                }
            }
        }
    }

    if args.join && client.is_connected() {
        client.leave_match();
    }
    client.disconnect();
    Ok(())
}

/// Topics to subscribe to, in order. With nothing selected, follow every match.
fn watch_topics(args: &Args) -> Vec<String> {
    use kickoff_protocol::topics;

    let mut out = Vec::new();
    for id in &args.matches {
        let id = MatchId(*id);
        out.push(topics::match_updates(id));
        out.push(topics::match_events(id));
        out.push(topics::match_status(id));
        out.push(topics::match_chat(id));
        out.push(topics::match_commentary(id));
    }
    out.extend(args.topics.iter().cloned());
    if out.is_empty() {
        out.push(topics::ALL_MATCHES.to_string());
        out.push(topics::ALL_EVENTS.to_string());
        out.push(topics::NOTIFICATIONS.to_string());
    }
    out
}

fn render(msg: &LiveMessage) -> String {
    match msg {
        LiveMessage::MatchEvent(ev) => {
            let marker = if ev.is_goal() {
                "GOAL"
            } else if ev.is_card() {
                "CARD"
            } else {
                "    "
            };
            format!(
                "{:>6}' {} {} {}",
                ev.minute.as_deref().unwrap_or("-"),
                marker,
                ev.event_type,
                ev.description.as_deref().unwrap_or("")
            )
        }
        LiveMessage::MatchStatusChange(c) => format!("status -> {}", c.new_status),
        LiveMessage::ChatMessage(c) => format!(
            "<{}> {}",
            c.username.as_deref().unwrap_or("anonymous"),
            c.message
        ),
        LiveMessage::MatchCommentary(c) => format!("» {}", c.commentary),
        LiveMessage::Notification(n) => format!(
            "[{}] {}{}",
            n.notification_type.as_str(),
            n.title.as_deref().map(|t| format!("{}: ", t)).unwrap_or_default(),
            n.message
        ),
        LiveMessage::SystemAlert(a) => format!("[system] {}", a.alert),
        LiveMessage::Unknown { kind, body } => format!("[{}] {}", kind, body),
        other => format!("[{}]", other.kind()),
    }
}

fn score_line(state: &MatchState) -> String {
    let status = state
        .status
        .as_ref()
        .map(|s| s.as_str())
        .unwrap_or("?");
    format!(
        "#{} {} {} {} ({})",
        state.match_id,
        state.home_team.as_deref().unwrap_or("home"),
        state.score,
        state.away_team.as_deref().unwrap_or("away"),
        status
    )
}
