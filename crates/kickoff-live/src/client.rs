//! The live-update client facade.
//!
//! One [`LiveClient`] owns one logical connection. Handles are cheap to
//! clone and share a single state: the connection status, the subscription
//! registry and the outbound queue sit behind one mutex, the reconciled
//! match state behind another. Inbound frames are processed by a single
//! session task in arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use kickoff_core::{ClientId, LeagueId, ListenerId, LiveConfig, MatchId, PlayerId, SubscriptionId};
use kickoff_protocol::destinations::{
    self, FollowLeague, FollowPlayer, JoinMatch, Ping, RequestMatchData, SendChat, SendReaction,
    SubmitPrediction,
};
use kickoff_protocol::frames::{self, Command, Frame, HeartBeat, Inbound, HEARTBEAT_FRAME};
use kickoff_protocol::{topics, LiveMessage};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{backoff_delay, transition, ConnEvent, ConnectionSnapshot, ConnectionStatus};
use crate::dispatch::{Ingested, MessageDispatcher};
use crate::error::LiveError;
use crate::queue::{OutboundMessage, OutboundQueue};
use crate::registry::SubscriptionRegistry;
use crate::state::{Limits, LiveStore, MatchState, NotificationEntry};
use crate::transport::{Connector, Link, LinkEvent};
use crate::ws::WsConnector;

/// Callback for connection status changes.
pub type StatusListener = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// What `send` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the live connection.
    Sent,
    /// Buffered until the next successful connect.
    Queued,
}

struct Shared {
    status: ConnectionStatus,
    attempt: u32,
    last_error: Option<String>,
    writer: Option<mpsc::UnboundedSender<String>>,
    /// Bumped by every `connect()`/`disconnect()`; tasks from an older epoch stand down.
    epoch: u64,
    cancel: CancellationToken,
    registry: SubscriptionRegistry,
    queue: OutboundQueue,
}

impl Shared {
    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.status,
            attempt: self.attempt,
            last_error: self.last_error.clone(),
        }
    }

    /// Feed `event` to the state machine, recording the snapshot if the status moved.
    fn advance(&mut self, event: ConnEvent, changes: &mut Vec<ConnectionSnapshot>) -> bool {
        match transition(self.status, event) {
            Some(next) => {
                if next != self.status {
                    self.status = next;
                    changes.push(self.snapshot());
                }
                true
            }
            None => {
                debug!(status = %self.status, event = ?event, "transition not applicable");
                false
            }
        }
    }
}

struct Inner {
    id: ClientId,
    config: LiveConfig,
    connector: Arc<dyn Connector>,
    shared: Mutex<Shared>,
    store: Mutex<LiveStore>,
    listeners: Mutex<Vec<(ListenerId, StatusListener)>>,
    next_listener: AtomicU64,
    status_tx: watch::Sender<ConnectionSnapshot>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // wakes a parked session or backoff so the background task exits
        self.shared
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel
            .cancel();
    }
}

/// An established STOMP session, handed from the handshake to the session loop.
struct Session {
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    writer: mpsc::UnboundedSender<String>,
    heart_beat: HeartBeat,
}

/// Handle to the live-update client.
///
/// The background connection task only holds a weak reference: once the
/// last handle is dropped the session is closed and retries stop.
#[derive(Clone)]
pub struct LiveClient {
    inner: Arc<Inner>,
}

impl LiveClient {
    pub fn new(config: LiveConfig, connector: Arc<dyn Connector>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionSnapshot::default());
        let shared = Shared {
            status: ConnectionStatus::Disconnected,
            attempt: 0,
            last_error: None,
            writer: None,
            epoch: 0,
            cancel: CancellationToken::new(),
            registry: SubscriptionRegistry::new(),
            queue: OutboundQueue::new(config.outbound_queue_cap),
        };
        let store = LiveStore::new(Limits::from(&config));
        Self {
            inner: Arc::new(Inner {
                id: ClientId::new(),
                config,
                connector,
                shared: Mutex::new(shared),
                store: Mutex::new(store),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                status_tx,
            }),
        }
    }

    /// Client talking WebSocket to `config.url`.
    pub fn from_config(config: LiveConfig) -> Self {
        let connector =
            WsConnector::new(config.url.clone()).with_auth_token(config.auth_token.clone());
        Self::new(config, Arc::new(connector))
    }

    pub fn id(&self) -> &ClientId {
        &self.inner.id
    }

    pub fn config(&self) -> &LiveConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Open the connection and complete the STOMP handshake.
    ///
    /// Returns immediately when already connected or connecting. From
    /// `Failed` or `Disconnected` the retry budget starts over; from
    /// `Reconnecting` the pending backoff is cut short.
    ///
    /// On failure the error is returned and the client keeps retrying in
    /// the background with exponential backoff.
    pub async fn connect(&self) -> Result<(), LiveError> {
        let mut changes = Vec::new();
        let (epoch, cancel) = {
            let mut s = self.shared();
            if matches!(
                s.status,
                ConnectionStatus::Connected | ConnectionStatus::Connecting
            ) {
                return Ok(());
            }
            if s.status != ConnectionStatus::Reconnecting {
                s.attempt = 0;
            }
            s.cancel.cancel();
            s.cancel = CancellationToken::new();
            s.epoch += 1;
            s.advance(ConnEvent::Connect, &mut changes);
            (s.epoch, s.cancel.clone())
        };
        self.emit(changes);
        info!(client = %self.inner.id, url = %self.inner.config.url, "connecting");

        match self.establish(epoch, &cancel).await {
            Ok(session) => {
                let weak = Arc::downgrade(&self.inner);
                tokio::spawn(Self::supervise(weak, Some(session), epoch, cancel));
                Ok(())
            }
            Err(e) => {
                if self.attempt_failed(epoch, &e) {
                    let weak = Arc::downgrade(&self.inner);
                    tokio::spawn(Self::supervise(weak, None, epoch, cancel));
                }
                Err(e)
            }
        }
    }

    /// Close the connection and stop any pending reconnect.
    ///
    /// Subscriptions stay registered and are replayed by the next `connect()`.
    /// Queued outbound messages are kept.
    pub fn disconnect(&self) {
        let mut changes = Vec::new();
        {
            let mut s = self.shared();
            s.cancel.cancel();
            s.epoch += 1;
            if let Some(writer) = s.writer.take() {
                if send_frame(&writer, &Frame::disconnect()).is_err() {
                    debug!("link already closed while disconnecting");
                }
            }
            s.registry.detach_all();
            s.advance(ConnEvent::Disconnect, &mut changes);
        }
        if !changes.is_empty() {
            info!(client = %self.inner.id, "disconnected");
        }
        self.emit(changes);
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared().status
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.shared().snapshot()
    }

    /// Receiver that always holds the latest [`ConnectionSnapshot`].
    pub fn status_watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.status_tx.subscribe()
    }

    pub fn on_status_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Register `handler` for `topic`, replacing any previous handler.
    ///
    /// Attaches right away when connected; otherwise the topic is attached
    /// on the next successful connect.
    ///
    /// Per-match room topics (chat, predictions, reactions) are filled from
    /// their broadcast channel, which gets registered alongside if absent.
    /// Unsubscribing the room leaves the broadcast feed in place.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        let mut s = self.shared();
        let id = s.registry.register(topic, Arc::new(handler));
        let source = topics::broadcast_source(topic);
        if let Some(source) = source {
            if !s.registry.contains(source) {
                debug!(topic, source, "feeding room topic from broadcast channel");
                s.registry.register(source, Arc::new(|_: &LiveMessage| {}));
            }
        }
        if s.status == ConnectionStatus::Connected {
            if let Some(writer) = s.writer.clone() {
                for wire_topic in std::iter::once(topic).chain(source) {
                    let attached = s.registry.attach(wire_topic, |wire_id, dest| {
                        send_frame(&writer, &Frame::subscribe(wire_id, dest))
                    });
                    if let Err(e) = attached {
                        warn!(topic = wire_topic, error = %e, "subscribe failed, will retry on reconnect");
                    }
                }
            }
        }
        debug!(topic, id = %id, "subscription registered");
        id
    }

    /// Remove `topic`. Unknown topics are ignored.
    pub fn unsubscribe(&self, topic: &str) {
        let mut s = self.shared();
        match s.registry.remove(topic) {
            Some(Some(wire_id)) => {
                if let Some(writer) = &s.writer {
                    if send_frame(writer, &Frame::unsubscribe(&wire_id)).is_err() {
                        debug!(topic, "link closed before UNSUBSCRIBE");
                    }
                }
            }
            Some(None) => {}
            None => debug!(topic, "unsubscribe for unknown topic"),
        }
    }

    /// Topics in registration order.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.shared().registry.topics()
    }

    /// Handler for every decoded message, regardless of topic.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(topics::WILDCARD, handler)
    }

    pub fn subscribe_to_match_updates<F>(&self, match_id: MatchId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::match_updates(match_id), handler)
    }

    pub fn subscribe_to_match_events<F>(&self, match_id: MatchId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::match_events(match_id), handler)
    }

    pub fn subscribe_to_match_status<F>(&self, match_id: MatchId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::match_status(match_id), handler)
    }

    pub fn subscribe_to_match_chat<F>(&self, match_id: MatchId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::match_chat(match_id), handler)
    }

    pub fn subscribe_to_match_predictions<F>(&self, match_id: MatchId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::match_predictions(match_id), handler)
    }

    pub fn subscribe_to_match_reactions<F>(&self, match_id: MatchId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::match_reactions(match_id), handler)
    }

    pub fn subscribe_to_match_commentary<F>(&self, match_id: MatchId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::match_commentary(match_id), handler)
    }

    pub fn subscribe_to_all_matches<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(topics::ALL_MATCHES, handler)
    }

    pub fn subscribe_to_all_events<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(topics::ALL_EVENTS, handler)
    }

    pub fn subscribe_to_notifications<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(topics::NOTIFICATIONS, handler)
    }

    pub fn subscribe_to_system<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(topics::SYSTEM, handler)
    }

    pub fn subscribe_to_standings<F>(&self, league_id: LeagueId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::league_standings(league_id), handler)
    }

    pub fn subscribe_to_player_stats<F>(&self, player_id: PlayerId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::player_stats(player_id), handler)
    }

    pub fn subscribe_to_player_injuries<F>(&self, player_id: PlayerId, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(&topics::player_injury(player_id), handler)
    }

    pub fn subscribe_to_transfers<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveMessage) + Send + Sync + 'static,
    {
        self.subscribe(topics::TRANSFERS, handler)
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Send a JSON payload to an application destination, or queue it while
    /// not connected.
    pub fn send(&self, destination: &str, payload: Value) -> Delivery {
        let mut s = self.shared();
        if s.status == ConnectionStatus::Connected {
            if let Some(writer) = &s.writer {
                if send_frame(writer, &Frame::send_json(destination, &payload)).is_ok() {
                    return Delivery::Sent;
                }
            }
        }
        s.queue.push(OutboundMessage::new(destination, payload));
        debug!(destination, pending = s.queue.len(), "outbound message queued");
        Delivery::Queued
    }

    /// Serialize `payload` and [`send`](Self::send) it.
    pub fn send_payload<T: Serialize>(
        &self,
        destination: &str,
        payload: &T,
    ) -> Result<Delivery, LiveError> {
        let value = serde_json::to_value(payload)?;
        Ok(self.send(destination, value))
    }

    pub fn pending_outbound(&self) -> usize {
        self.shared().queue.len()
    }

    pub fn join_match(&self, match_id: MatchId, username: &str) -> Result<Delivery, LiveError> {
        self.send_payload(destinations::MATCH_JOIN, &JoinMatch { match_id, username })
    }

    pub fn leave_match(&self) -> Delivery {
        self.send(destinations::MATCH_LEAVE, Value::Object(Default::default()))
    }

    pub fn send_chat_message(
        &self,
        match_id: MatchId,
        message: &str,
    ) -> Result<Delivery, LiveError> {
        self.send_payload(destinations::MATCH_CHAT, &SendChat { match_id, message })
    }

    /// Ask the service to follow a league (`/app/league.subscribe`).
    pub fn subscribe_to_league(
        &self,
        league_id: LeagueId,
        username: &str,
    ) -> Result<Delivery, LiveError> {
        self.send_payload(
            destinations::LEAGUE_SUBSCRIBE,
            &FollowLeague {
                league_id,
                username,
            },
        )
    }

    /// Ask the service to follow a player (`/app/player.subscribe`).
    pub fn subscribe_to_player(
        &self,
        player_id: PlayerId,
        username: &str,
    ) -> Result<Delivery, LiveError> {
        self.send_payload(
            destinations::PLAYER_SUBSCRIBE,
            &FollowPlayer {
                player_id,
                username,
            },
        )
    }

    pub fn submit_prediction(
        &self,
        match_id: MatchId,
        prediction: &str,
        prediction_type: &str,
    ) -> Result<Delivery, LiveError> {
        self.send_payload(
            destinations::MATCH_PREDICTION,
            &SubmitPrediction {
                match_id,
                prediction,
                prediction_type,
            },
        )
    }

    pub fn send_reaction(
        &self,
        match_id: MatchId,
        emoji: &str,
        event_id: Option<&str>,
    ) -> Result<Delivery, LiveError> {
        self.send_payload(
            destinations::MATCH_REACTION,
            &SendReaction {
                match_id,
                emoji,
                event_id,
            },
        )
    }

    pub fn request_match_data(&self, match_id: MatchId) -> Result<Delivery, LiveError> {
        self.send_payload(destinations::MATCH_REQUEST_DATA, &RequestMatchData { match_id })
    }

    pub fn ping(&self) -> Result<Delivery, LiveError> {
        self.send_payload(destinations::PING, &Ping::now())
    }

    // -----------------------------------------------------------------------
    // Inbound and state
    // -----------------------------------------------------------------------

    /// Decode one raw frame, fold it into the match state and run the handlers.
    ///
    /// The session task calls this for every inbound frame; it is public so
    /// frames from another source can be fed through the same path.
    pub fn ingest(&self, raw: &str) -> Ingested {
        MessageDispatcher::new(&self.inner.store).ingest(raw, |targets| {
            let s = self.shared();
            targets
                .iter()
                .filter_map(|topic| s.registry.handler(topic))
                .collect()
        })
    }

    pub fn match_state(&self, match_id: MatchId) -> Option<MatchState> {
        self.store().match_state(match_id).cloned()
    }

    pub fn tracked_matches(&self) -> Vec<MatchId> {
        self.store().match_ids()
    }

    /// Oldest first.
    pub fn notifications(&self) -> Vec<NotificationEntry> {
        self.store().notifications().cloned().collect()
    }

    pub fn unread_notifications(&self) -> usize {
        self.store().unread_count()
    }

    pub fn mark_notification_read(&self, id: u64) -> bool {
        self.store().mark_read(id)
    }

    pub fn mark_all_notifications_read(&self) {
        self.store().mark_all_read()
    }

    pub fn clear_notifications(&self) {
        self.store().clear_notifications()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> MutexGuard<'_, LiveStore> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, StatusListener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish status changes. Never called with `shared` locked.
    fn emit(&self, changes: Vec<ConnectionSnapshot>) {
        for snapshot in changes {
            info!(
                client = %self.inner.id,
                status = %snapshot.status,
                attempt = snapshot.attempt,
                "connection status changed"
            );
            let status = snapshot.status;
            self.inner.status_tx.send_replace(snapshot);
            let listeners: Vec<StatusListener> =
                self.listeners().iter().map(|(_, l)| Arc::clone(l)).collect();
            for listener in listeners {
                listener(status);
            }
        }
    }

    /// Open a transport and run the handshake, then replay subscriptions and
    /// flush the queue before reporting `Connected`.
    async fn establish(&self, epoch: u64, cancel: &CancellationToken) -> Result<Session, LiveError> {
        let limit = self.inner.config.connect_timeout();
        let (link, heart_beat) = tokio::select! {
            _ = cancel.cancelled() => return Err(LiveError::Cancelled),
            res = tokio::time::timeout(limit, self.handshake()) => match res {
                Ok(handshake) => handshake?,
                Err(_) => {
                    return Err(LiveError::Timeout {
                        ms: self.inner.config.connect_timeout_ms,
                    })
                }
            },
        };
        let Link { outbound, inbound } = link;

        let mut changes = Vec::new();
        {
            let mut s = self.shared();
            if s.epoch != epoch {
                return Err(LiveError::Cancelled);
            }
            let replayed = s
                .registry
                .replay(|wire_id, topic| send_frame(&outbound, &Frame::subscribe(wire_id, topic)));
            let flushed = match s.queue.drain_with(|m| {
                send_frame(&outbound, &Frame::send_json(&m.destination, &m.payload))
            }) {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, pending = s.queue.len(), "outbound flush interrupted");
                    0
                }
            };
            s.writer = Some(outbound.clone());
            s.attempt = 0;
            s.last_error = None;
            s.advance(ConnEvent::HandshakeOk, &mut changes);
            info!(client = %self.inner.id, replayed, flushed, "connected");
        }
        self.emit(changes);

        Ok(Session {
            inbound,
            writer: outbound,
            heart_beat,
        })
    }

    /// CONNECT / CONNECTED exchange. Returns the link and the agreed heart-beat.
    async fn handshake(&self) -> Result<(Link, HeartBeat), LiveError> {
        let cfg = &self.inner.config;
        let mut link = self.inner.connector.connect().await?;

        let ours = HeartBeat::new(cfg.heartbeat_interval_ms, cfg.heartbeat_interval_ms);
        let connect = Frame::connect(&stomp_host(&cfg.url), ours, cfg.auth_token.as_deref());
        send_frame(&link.outbound, &connect)?;

        loop {
            let raw = match link.inbound.recv().await {
                Some(LinkEvent::Frame(raw)) => raw,
                Some(LinkEvent::Closed(reason)) => {
                    return Err(LiveError::ConnectionFailed(
                        reason.unwrap_or_else(|| "closed during handshake".to_string()),
                    ))
                }
                None => return Err(LiveError::Closed),
            };
            match frames::parse(&raw) {
                Ok(Inbound::Heartbeat) => continue,
                Ok(Inbound::Frame(frame)) if frame.command == Command::Connected => {
                    let theirs = frame
                        .get("heart-beat")
                        .and_then(HeartBeat::parse)
                        .unwrap_or_default();
                    let agreed = HeartBeat::negotiate(ours, theirs);
                    debug!(
                        version = frame.get("version").unwrap_or("?"),
                        outgoing_ms = agreed.outgoing_ms,
                        incoming_ms = agreed.incoming_ms,
                        "handshake complete"
                    );
                    return Ok((link, agreed));
                }
                Ok(Inbound::Frame(frame)) if frame.command == Command::Error => {
                    let reason = frame
                        .get("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.clone());
                    return Err(LiveError::HandshakeRejected(reason));
                }
                Ok(Inbound::Frame(frame)) => {
                    debug!(command = frame.command.as_str(), "ignoring frame before CONNECTED");
                }
                Err(e) => return Err(LiveError::HandshakeRejected(e.to_string())),
            }
        }
    }

    /// Background task for one epoch: runs sessions and retries until
    /// cancelled, superseded, out of attempts or the client is dropped.
    async fn supervise(
        weak: Weak<Inner>,
        mut session: Option<Session>,
        epoch: u64,
        cancel: CancellationToken,
    ) {
        loop {
            if let Some(active) = session.take() {
                let outcome = Self::run_session(&weak, active, &cancel).await;
                let Some(client) = Self::upgrade(&weak) else {
                    return;
                };
                match outcome {
                    Ok(()) => return,
                    Err(e) => {
                        if !client.attempt_failed(epoch, &e) {
                            return;
                        }
                    }
                }
            }

            let Some(delay) = Self::upgrade(&weak).and_then(|client| client.pending_backoff(epoch))
            else {
                return;
            };
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(client) = Self::upgrade(&weak) else {
                return;
            };
            if !client.advance_if_current(epoch, ConnEvent::BackoffElapsed) {
                return;
            }
            match client.establish(epoch, &cancel).await {
                Ok(next) => session = Some(next),
                Err(LiveError::Cancelled) => return,
                Err(e) => {
                    if !client.attempt_failed(epoch, &e) {
                        return;
                    }
                }
            }
        }
    }

    /// Pump one connected session. `Ok` means it was cancelled on purpose or
    /// the client went away.
    async fn run_session(
        weak: &Weak<Inner>,
        session: Session,
        cancel: &CancellationToken,
    ) -> Result<(), LiveError> {
        let Session {
            mut inbound,
            writer,
            heart_beat,
        } = session;

        let send_every = Duration::from_millis(heart_beat.outgoing_ms.max(1));
        let expect_every = Duration::from_millis(heart_beat.incoming_ms.max(1));
        let mut send_tick = tokio::time::interval_at(Instant::now() + send_every, send_every);
        send_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut check_tick = tokio::time::interval_at(Instant::now() + expect_every, expect_every);
        check_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),

                event = inbound.recv() => match event {
                    Some(LinkEvent::Frame(raw)) => {
                        last_seen = Instant::now();
                        let Some(client) = Self::upgrade(weak) else {
                            return Ok(());
                        };
                        if let Ingested::BrokerError(reason) = client.ingest(&raw) {
                            return Err(LiveError::ConnectionFailed(reason));
                        }
                    }
                    Some(LinkEvent::Closed(reason)) => {
                        return Err(LiveError::ConnectionFailed(
                            reason.unwrap_or_else(|| "closed by peer".to_string()),
                        ));
                    }
                    None => return Err(LiveError::Closed),
                },

                _ = send_tick.tick(), if heart_beat.outgoing_ms > 0 => {
                    if writer.send(HEARTBEAT_FRAME.to_string()).is_err() {
                        return Err(LiveError::Closed);
                    }
                }

                _ = check_tick.tick(), if heart_beat.incoming_ms > 0 => {
                    let silent = last_seen.elapsed();
                    if silent >= expect_every * 2 {
                        let ms = silent.as_millis() as u64;
                        warn!(silent_ms = ms, "missed heartbeats");
                        return Err(LiveError::Timeout { ms });
                    }
                }
            }
        }
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<LiveClient> {
        weak.upgrade().map(|inner| LiveClient { inner })
    }

    /// Delay before the next attempt, if this epoch is still waiting on one.
    fn pending_backoff(&self, epoch: u64) -> Option<Duration> {
        let s = self.shared();
        if s.epoch != epoch || s.status != ConnectionStatus::Reconnecting {
            return None;
        }
        Some(backoff_delay(self.inner.config.reconnect_base_delay(), s.attempt))
    }

    /// Record a failed attempt or lost session. Returns true when another
    /// attempt should be scheduled.
    fn attempt_failed(&self, epoch: u64, err: &LiveError) -> bool {
        let max = self.inner.config.max_reconnect_attempts;
        let mut changes = Vec::new();
        let retry = {
            let mut s = self.shared();
            if s.epoch != epoch {
                return false;
            }
            s.writer = None;
            s.registry.detach_all();
            s.last_error = Some(err.to_string());
            s.attempt += 1;
            s.advance(ConnEvent::TransportLost, &mut changes);

            if s.attempt > max {
                s.advance(ConnEvent::RetriesExhausted, &mut changes);
                error!(client = %self.inner.id, attempts = max, error = %err, "reconnect attempts exhausted");
                false
            } else {
                let delay = backoff_delay(self.inner.config.reconnect_base_delay(), s.attempt);
                warn!(
                    client = %self.inner.id,
                    attempt = s.attempt,
                    max,
                    error = %err,
                    retry_after_ms = delay.as_millis() as u64,
                    "connection lost, retrying with backoff"
                );
                true
            }
        };
        self.emit(changes);
        retry
    }

    fn advance_if_current(&self, epoch: u64, event: ConnEvent) -> bool {
        let mut changes = Vec::new();
        let ok = {
            let mut s = self.shared();
            s.epoch == epoch && s.advance(event, &mut changes)
        };
        self.emit(changes);
        ok
    }
}

fn send_frame(writer: &mpsc::UnboundedSender<String>, frame: &Frame) -> Result<(), LiveError> {
    writer.send(frame.encode()).map_err(|_| LiveError::Closed)
}

/// Host part of a ws:// URL, used for the STOMP `host` header.
fn stomp_host(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    host.split(':').next().unwrap_or(host).to_string()
}
