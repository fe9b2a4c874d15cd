use clap::Parser;
use queue_player::PlayerConfig;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// First port tried on 127.0.0.1
    pub port_start: u16,

    /// Last port tried, inclusive
    pub port_end: u16,

    /// How long a client may take to deliver its envelope
    pub read_timeout: Duration,

    /// Envelopes larger than this are dropped
    pub max_envelope_bytes: usize,

    pub player: PlayerConfig,
}

/// Queue player daemon, controlled with one JSON command per TCP connection
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// First port of the range to listen on
    #[arg(long, default_value_t = Config::DEFAULT_PORT_START)]
    pub port_start: u16,

    /// Last port of the range to listen on (inclusive)
    #[arg(long, default_value_t = Config::DEFAULT_PORT_END)]
    pub port_end: u16,

    /// Upper bound between idle queue checks
    #[arg(long, default_value_t = 250, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Time allowed for a client to send its command
    #[arg(long, default_value_t = 5000)]
    pub read_timeout_ms: u64,

    /// Largest accepted command envelope
    #[arg(long, default_value_t = Config::DEFAULT_MAX_ENVELOPE_BYTES)]
    pub max_envelope_bytes: usize,
}

impl Config {
    pub const DEFAULT_PORT_START: u16 = 6990;
    pub const DEFAULT_PORT_END: u16 = 7000;
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_MAX_ENVELOPE_BYTES: usize = 64 * 1024;

    /// Create configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Self {
        Self {
            port_start: args.port_start,
            port_end: args.port_end,
            read_timeout: Duration::from_millis(args.read_timeout_ms),
            max_envelope_bytes: args.max_envelope_bytes,
            player: PlayerConfig::with_poll_interval(Duration::from_millis(
                args.poll_interval_ms,
            )),
        }
    }

    /// Listen on a single port. Port 0 lets the OS pick one.
    pub fn on_port(port: u16) -> Self {
        Self {
            port_start: port,
            port_end: port,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_start: Self::DEFAULT_PORT_START,
            port_end: Self::DEFAULT_PORT_END,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            max_envelope_bytes: Self::DEFAULT_MAX_ENVELOPE_BYTES,
            player: PlayerConfig::default(),
        }
    }
}
