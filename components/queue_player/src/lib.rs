mod config;
mod coordinator;
mod error;
mod queue;
mod router;
mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::PlayerConfig;
pub use coordinator::Coordinator;
pub use error::PlayerError;
pub use queue::{read_playlist, Queue};
pub use router::{Inbox, Request, Responder, Router};
pub use state::{Phase, PlayerState, Snapshot};
