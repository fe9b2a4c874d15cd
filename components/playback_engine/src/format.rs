use crate::error::PlaybackError;
use std::path::Path;

/// Container formats the decoder is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
}

impl AudioFormat {
    /// Resolve the format from the file extension, ignoring ASCII case.
    pub fn from_path(path: &Path) -> Result<Self, PlaybackError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| PlaybackError::UnsupportedFormat(path.to_path_buf()))?;

        if extension.eq_ignore_ascii_case("mp3") {
            Ok(AudioFormat::Mp3)
        } else if extension.eq_ignore_ascii_case("flac") {
            Ok(AudioFormat::Flac)
        } else {
            Err(PlaybackError::UnsupportedFormat(path.to_path_buf()))
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
        }
    }
}
