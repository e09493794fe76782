#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kickoff_core::LiveConfig;
use kickoff_live::{ConnectionStatus, Connector, LiveClient, LiveError, Link, LinkEvent};
use kickoff_protocol::frames::{self, Frame, Inbound};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How the fake broker answers the next connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    /// Transport opens and CONNECTED is queued.
    Accept,
    /// Transport refuses to open.
    Refuse,
    /// Transport opens but the broker never answers CONNECT.
    Silent,
}

/// The broker side of one accepted connection.
pub struct ServerEnd {
    pub sent: mpsc::UnboundedReceiver<String>,
    pub push: mpsc::UnboundedSender<LinkEvent>,
}

impl ServerEnd {
    /// Next non-heartbeat frame the client wrote.
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            let raw = tokio::time::timeout(Duration::from_secs(120), self.sent.recv())
                .await
                .expect("timed out waiting for a client frame")
                .expect("client closed the link");
            match frames::parse(&raw).expect("client wrote an invalid frame") {
                Inbound::Heartbeat => continue,
                Inbound::Frame(frame) => return frame,
            }
        }
    }

    /// Everything written so far, raw, without waiting.
    pub fn drain_raw(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(raw) = self.sent.try_recv() {
            out.push(raw);
        }
        out
    }

    pub fn push_message(&self, destination: &str, body: &str) {
        let raw = format!(
            "MESSAGE\ndestination:{}\ncontent-type:application/json\nsubscription:sub-0\nmessage-id:m-1\n\n{}\0",
            destination, body
        );
        let _ = self.push.send(LinkEvent::Frame(raw));
    }

    pub fn close(&self, reason: &str) {
        let _ = self.push.send(LinkEvent::Closed(Some(reason.to_string())));
    }
}

pub struct MockConnector {
    script: Mutex<VecDeque<Answer>>,
    default_answer: Mutex<Answer>,
    server_heart_beat: String,
    calls: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::with_heart_beat("0,0")
    }

    /// Broker that advertises `heart_beat` in CONNECTED.
    pub fn with_heart_beat(heart_beat: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default_answer: Mutex::new(Answer::Accept),
            server_heart_beat: heart_beat.to_string(),
            calls: Mutex::new(Vec::new()),
            servers: tx,
        });
        (connector, rx)
    }

    /// Queue answers for the next attempts; afterwards the default applies.
    pub fn script(&self, answers: &[Answer]) {
        self.script.lock().unwrap().extend(answers.iter().copied());
    }

    pub fn set_default(&self, answer: Answer) {
        *self.default_answer.lock().unwrap() = answer;
    }

    /// Instants at which `connect` was called.
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Link, LiveError> {
        self.calls.lock().unwrap().push(Instant::now());
        let answer = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.default_answer.lock().unwrap());

        if let Answer::Refuse = answer {
            return Err(LiveError::ConnectionFailed("connection refused".into()));
        }

        let (link, peer) = Link::pair();
        if let Answer::Accept = answer {
            let connected = format!(
                "CONNECTED\nversion:1.2\nheart-beat:{}\n\n\0",
                self.server_heart_beat
            );
            let _ = peer.events.send(LinkEvent::Frame(connected));
        }
        let _ = self.servers.send(ServerEnd {
            sent: peer.sent,
            push: peer.events,
        });
        Ok(link)
    }
}

pub fn test_config() -> LiveConfig {
    LiveConfig {
        max_reconnect_attempts: 3,
        ..LiveConfig::default()
    }
}

pub fn client(connector: Arc<MockConnector>) -> LiveClient {
    LiveClient::new(test_config(), connector)
}

/// Wait until the latest published status is `want`.
pub async fn wait_for_status(client: &LiveClient, want: ConnectionStatus) {
    let mut rx = client.status_watch();
    let wait = async {
        loop {
            if rx.borrow_and_update().status == want {
                return;
            }
            rx.changed().await.expect("status channel closed");
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .unwrap_or_else(|_| panic!("status never became {}", want));
}

pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(Duration::from_secs(600), servers.recv())
        .await
        .expect("timed out waiting for a connection attempt")
        .expect("connector dropped")
}
