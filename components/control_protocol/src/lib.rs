mod error;
mod protocol;

pub use error::ProtocolError;
pub use protocol::{Command, CommandName, Response, Status};
