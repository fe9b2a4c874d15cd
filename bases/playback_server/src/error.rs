use control_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid port range {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("No free port in {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("No complete envelope within {0:?}")]
    ReadTimeout(Duration),
}
