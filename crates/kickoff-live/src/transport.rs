use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LiveError;

/// What the transport reports back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One text message from the peer (a STOMP frame or a heartbeat EOL).
    Frame(String),
    /// The peer went away. Carries the close reason or transport error if any.
    Closed(Option<String>),
}

/// An open, frame-oriented duplex link.
///
/// Dropping `outbound` asks the transport to close.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    /// Create a link and the peer-side halves that drive it.
    pub fn pair() -> (Self, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            LinkPeer {
                sent: out_rx,
                events: in_tx,
            },
        )
    }
}

/// Transport side of a [`Link`]: reads what the client sent, pushes what arrived.
pub struct LinkPeer {
    pub sent: mpsc::UnboundedReceiver<String>,
    pub events: mpsc::UnboundedSender<LinkEvent>,
}

/// Opens links to the update service.
///
/// Implementations must be `Send + Sync` so a single connector can be shared
/// by the client's reconnect task.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh transport. Called once per connection attempt.
    async fn connect(&self) -> Result<Link, LiveError>;
}
