pub mod config;
pub mod error;
pub mod types;

pub use config::{KickoffConfig, LiveConfig};
pub use error::{KickoffError, Result};
pub use types::{ClientId, LeagueId, ListenerId, MatchId, PlayerId, SubscriptionId};
