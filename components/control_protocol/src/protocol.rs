use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Command names accepted on the control socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    Skip,
    Clear,
    Pause,
    Shutdown,
    LoopSong,
    AddQueue,
    SetVolume,
    AddPlaylist,
    LoopPlaylist,
}

impl CommandName {
    pub const ALL: [CommandName; 9] = [
        CommandName::Skip,
        CommandName::Clear,
        CommandName::Pause,
        CommandName::Shutdown,
        CommandName::LoopSong,
        CommandName::AddQueue,
        CommandName::SetVolume,
        CommandName::AddPlaylist,
        CommandName::LoopPlaylist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Skip => "SKIP",
            CommandName::Clear => "CLEAR",
            CommandName::Pause => "PAUSE",
            CommandName::Shutdown => "SHUTDOWN",
            CommandName::LoopSong => "LOOP_SONG",
            CommandName::AddQueue => "ADD_QUEUE",
            CommandName::SetVolume => "SET_VOLUME",
            CommandName::AddPlaylist => "ADD_PLAYLIST",
            CommandName::LoopPlaylist => "LOOP_PLAYLIST",
        }
    }

    /// Commands whose handler reads the payload field
    pub fn takes_payload(&self) -> bool {
        matches!(
            self,
            CommandName::AddQueue | CommandName::AddPlaylist | CommandName::SetVolume
        )
    }
}

impl FromStr for CommandName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_owned()))
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a request. The name stays a plain string here so that
/// malformed JSON and names outside the allow-list fail differently.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

/// A validated request received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: CommandName,
    pub payload: Option<String>,
}

impl Command {
    pub fn new(name: CommandName) -> Self {
        Self {
            name,
            payload: None,
        }
    }

    pub fn with_payload(name: CommandName, payload: impl Into<String>) -> Self {
        Self {
            name,
            payload: Some(payload.into()),
        }
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        let name = envelope.command.parse()?;

        Ok(Self {
            name,
            payload: envelope.payload,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let envelope = Envelope {
            command: self.name.as_str().to_owned(),
            payload: self.payload.clone(),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Err,
}

/// Acknowledgement written back for every routed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(rename = "errmsg", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            message: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            status: Status::Err,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
