use control_protocol::CommandName;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a command is refused. The display text is what the client sees.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("{0} is missing its payload")]
    MissingPayload(CommandName),

    #[error("There is no song currently playing")]
    NothingPlaying,

    #[error("The queue is currently empty")]
    QueueEmpty,

    #[error("{0} is not supported")]
    Unsupported(CommandName),

    #[error("{0} is handled by the listener")]
    ListenerOnly(CommandName),

    #[error("failed to read playlist {path}: {source}")]
    Playlist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PlayerError {
    pub fn playlist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlayerError::Playlist {
            path: path.into(),
            source,
        }
    }
}
