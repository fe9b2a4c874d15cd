use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Track not found: {0}")]
    TrackNotFound(PathBuf),

    #[error("Unsupported format for {0}: only .mp3 and .flac files are supported")]
    UnsupportedFormat(PathBuf),

    #[error("Resampler error: {0}")]
    Resample(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Playback session ended without reporting back")]
    SessionLost,
}

impl From<cpal::BuildStreamError> for PlaybackError {
    fn from(err: cpal::BuildStreamError) -> Self {
        PlaybackError::AudioDevice(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for PlaybackError {
    fn from(err: cpal::PlayStreamError) -> Self {
        PlaybackError::AudioDevice(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for PlaybackError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        PlaybackError::Decoder(err.to_string())
    }
}
