use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    Paused,
}

/// Player flags. `paused` is only ever set while `active`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerState {
    pub active: bool,
    pub paused: bool,
    pub loop_track: bool,
    pub loop_queue: bool,
}

impl PlayerState {
    pub fn phase(&self) -> Phase {
        match (self.active, self.paused) {
            (false, _) => Phase::Idle,
            (true, false) => Phase::Playing,
            (true, true) => Phase::Paused,
        }
    }
}

/// Point-in-time view published by the coordinator after every event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub state: PlayerState,
    pub now_playing: Option<PathBuf>,
    pub queue: Vec<PathBuf>,
}

impl Snapshot {
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}
