use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::LiveError;

/// An action message waiting for a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub destination: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(destination: impl Into<String>, payload: Value) -> Self {
        Self {
            destination: destination.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// FIFO buffer of outbound messages issued while disconnected.
///
/// Bounded by `cap`; pushing onto a full queue evicts the oldest entry.
/// A cap of 0 means unbounded.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    items: VecDeque<OutboundMessage>,
    cap: usize,
}

impl OutboundQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::new(),
            cap,
        }
    }

    /// Append a message. Returns the evicted message if the queue was full.
    pub fn push(&mut self, msg: OutboundMessage) -> Option<OutboundMessage> {
        let evicted = if self.cap > 0 && self.items.len() >= self.cap {
            self.items.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            warn!(
                destination = %old.destination,
                cap = self.cap,
                "outbound queue full, dropping oldest message"
            );
        }
        self.items.push_back(msg);
        evicted
    }

    /// Hand messages to `send` oldest first.
    ///
    /// Stops at the first failure; the failed message stays at the head so
    /// the next drain starts with it. Returns how many were sent.
    pub fn drain_with<F>(&mut self, mut send: F) -> Result<usize, LiveError>
    where
        F: FnMut(&OutboundMessage) -> Result<(), LiveError>,
    {
        let mut sent = 0;
        while let Some(head) = self.items.front() {
            send(head)?;
            self.items.pop_front();
            sent += 1;
        }
        Ok(sent)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.items.iter()
    }
}
