//! Topic subscriptions that outlive any single connection.

use std::sync::Arc;

use kickoff_core::SubscriptionId;
use kickoff_protocol::topics;
use kickoff_protocol::LiveMessage;
use tracing::{debug, warn};

use crate::error::LiveError;

/// Callback invoked for every message routed to a topic.
pub type Handler = Arc<dyn Fn(&LiveMessage) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    topic: String,
    handler: Handler,
    /// Wire subscription id while attached to the current connection.
    live_ref: Option<String>,
}

/// Ordered set of topic subscriptions, one handler per topic.
///
/// The set is connection-independent. Only the `live_ref` of each entry is
/// tied to a connection and gets rebuilt by [`replay`](Self::replay).
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Entry>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    ///
    /// An existing subscription keeps its id, position and wire attachment;
    /// only the handler is replaced.
    pub fn register(&mut self, topic: &str, handler: Handler) -> SubscriptionId {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.topic == topic) {
            debug!(topic, id = %entry.id, "replacing subscription handler");
            entry.handler = handler;
            return entry.id;
        }
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            topic: topic.to_string(),
            handler,
            live_ref: None,
        });
        id
    }

    /// Remove `topic`. Returns the wire id to UNSUBSCRIBE when it was attached.
    pub fn remove(&mut self, topic: &str) -> Option<Option<String>> {
        let pos = self.entries.iter().position(|e| e.topic == topic)?;
        Some(self.entries.remove(pos).live_ref)
    }

    /// Attach a single topic if it is not attached yet.
    pub fn attach<F>(&mut self, topic: &str, attach: F) -> Result<(), LiveError>
    where
        F: FnOnce(&str, &str) -> Result<(), LiveError>,
    {
        let Some(entry) = self.entries.iter_mut().find(|e| e.topic == topic) else {
            return Ok(());
        };
        if entry.live_ref.is_some() || topics::is_local(&entry.topic) {
            return Ok(());
        }
        let wire_id = entry.id.to_string();
        attach(&wire_id, &entry.topic)?;
        entry.live_ref = Some(wire_id);
        Ok(())
    }

    /// Re-attach every detached topic in registration order.
    ///
    /// A failed attach leaves that entry detached for the next replay and
    /// does not stop the remaining ones. Returns how many were attached.
    pub fn replay<F>(&mut self, mut attach: F) -> usize
    where
        F: FnMut(&str, &str) -> Result<(), LiveError>,
    {
        let mut attached = 0;
        for entry in self.entries.iter_mut() {
            if entry.live_ref.is_some() || topics::is_local(&entry.topic) {
                continue;
            }
            let wire_id = entry.id.to_string();
            match attach(&wire_id, &entry.topic) {
                Ok(()) => {
                    entry.live_ref = Some(wire_id);
                    attached += 1;
                }
                Err(e) => {
                    warn!(topic = %entry.topic, error = %e, "failed to re-attach subscription");
                }
            }
        }
        attached
    }

    /// Forget every wire attachment. Entries and handlers stay.
    pub fn detach_all(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.live_ref = None;
        }
    }

    pub fn handler(&self, topic: &str) -> Option<Handler> {
        self.entries
            .iter()
            .find(|e| e.topic == topic)
            .map(|e| Arc::clone(&e.handler))
    }

    pub fn is_attached(&self, topic: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.topic == topic && e.live_ref.is_some())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.iter().any(|e| e.topic == topic)
    }

    /// Topics in registration order.
    pub fn topics(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.topic.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
