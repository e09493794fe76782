//! Connection lifecycle: status values, the transition table and backoff.

use std::time::Duration;

use serde::Serialize;

/// Coarse connection status, as collaborators observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Not connected and not trying to be.
    Disconnected,
    /// A transport is being opened or the STOMP handshake is in flight.
    Connecting,
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Retry budget exhausted. Only a manual `connect()` leaves this state.
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    /// Caller asked for a connection.
    Connect,
    /// CONNECTED received.
    HandshakeOk,
    /// Transport error, abrupt close, handshake failure or missed heartbeats.
    TransportLost,
    BackoffElapsed,
    RetriesExhausted,
    /// Caller asked to disconnect.
    Disconnect,
}

/// The transition table. `None` means the event is not valid in that state.
pub fn transition(from: ConnectionStatus, event: ConnEvent) -> Option<ConnectionStatus> {
    use ConnEvent as E;
    use ConnectionStatus as S;

    match (from, event) {
        (_, E::Disconnect) => Some(S::Disconnected),
        (S::Disconnected | S::Failed | S::Reconnecting, E::Connect) => Some(S::Connecting),
        (S::Connecting, E::HandshakeOk) => Some(S::Connected),
        (S::Connecting | S::Connected, E::TransportLost) => Some(S::Reconnecting),
        (S::Reconnecting, E::BackoffElapsed) => Some(S::Connecting),
        (S::Reconnecting, E::RetriesExhausted) => Some(S::Failed),
        _ => None,
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

/// Point-in-time view of the connection, published on the status watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl ConnectionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt: 0,
            last_error: None,
        }
    }
}
