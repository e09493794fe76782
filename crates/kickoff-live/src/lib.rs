pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod registry;
pub mod state;
pub mod transport;
pub mod ws;

pub use client::{Delivery, LiveClient, StatusListener};
pub use connection::{ConnectionSnapshot, ConnectionStatus};
pub use dispatch::{Ingested, MessageDispatcher};
pub use error::LiveError;
pub use queue::{OutboundMessage, OutboundQueue};
pub use registry::{Handler, SubscriptionRegistry};
pub use state::{LiveStore, MatchState, NotificationEntry, Score};
pub use transport::{Connector, Link, LinkEvent, LinkPeer};
pub use ws::WsConnector;
