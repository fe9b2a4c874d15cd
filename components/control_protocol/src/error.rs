use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Envelope exceeds {limit} bytes")]
    EnvelopeTooLarge { limit: usize },
}

impl ProtocolError {
    /// True when the bytes seen so far are a valid prefix of an envelope
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::Decode(e) if e.is_eof())
    }
}
