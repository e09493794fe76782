pub mod destinations;
pub mod error;
pub mod frames;
pub mod messages;
pub mod topics;

pub use error::FrameError;
pub use frames::{Command, Frame, HeartBeat, Inbound};
pub use messages::{LiveMessage, MatchStatus, NotificationKind};
