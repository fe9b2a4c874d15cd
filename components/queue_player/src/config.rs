use std::time::Duration;

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Upper bound between idle checks when no event wakes the coordinator
    pub poll_interval: Duration,
}

impl PlayerConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// A zero interval is raised to [`Self::MIN_POLL_INTERVAL`]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Self::MIN_POLL_INTERVAL),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::with_poll_interval(Self::DEFAULT_POLL_INTERVAL)
    }
}
