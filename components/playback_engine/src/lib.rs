mod error;
mod format;
mod output;
mod resample;
mod session;
mod source;

pub use error::PlaybackError;
pub use format::AudioFormat;
pub use output::{DeviceOutput, Output, CHANNELS, TARGET_SAMPLE_RATE};
pub use session::{Session, SessionControl, SessionEnd, Wake};
