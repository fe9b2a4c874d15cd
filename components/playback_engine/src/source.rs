use crate::error::PlaybackError;
use crate::format::AudioFormat;
use std::path::Path;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

/// A decoded track read packet by packet.
///
/// The format reader owns the open file, so dropping the source closes it.
pub struct TrackSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    audio_channels: u16,
}

impl std::fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSource")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("audio_channels", &self.audio_channels)
            .finish_non_exhaustive()
    }
}

impl TrackSource {
    pub fn open(path: &Path, format: AudioFormat) -> Result<Self, PlaybackError> {
        tracing::debug!("Opening file: {:?}", path);

        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PlaybackError::TrackNotFound(path.to_path_buf()),
            _ => PlaybackError::Io(e),
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(format.extension());

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let track = probed
            .format
            .default_track()
            .ok_or_else(|| PlaybackError::Decoder("No default track found".into()))?;

        let track_id = track.id;
        let audio_channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);

        let decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        Ok(Self {
            format_reader: probed.format,
            decoder,
            track_id,
            sample_rate,
            audio_channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn audio_channels(&self) -> u16 {
        self.audio_channels
    }

    /// Decode the next packet as interleaved stereo at the source rate.
    /// Returns `None` at end of stream.
    pub fn next_stereo(&mut self) -> Result<Option<Vec<f32>>, PlaybackError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None)
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::warn!("Skipping undecodable packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);

            return Ok(Some(to_stereo(samples.samples(), spec.channels.count())));
        }
    }
}

/// Mono is duplicated, anything wider keeps its first two channels.
pub(crate) fn to_stereo(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.iter().flat_map(|&s| [s, s]).collect(),
        2 => interleaved.to_vec(),
        n => interleaved
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn mono_is_duplicated() {
        assert_eq!(to_stereo(&[0.1, 0.2], 1), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn stereo_passes_through() {
        assert_eq!(to_stereo(&[0.1, 0.2, 0.3, 0.4], 2), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn surround_keeps_front_pair() {
        let frames = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        assert_eq!(to_stereo(&frames, 6), vec![1.0, 2.0, 7.0, 8.0]);
    }

    #[test]
    fn missing_file_is_track_not_found() {
        let path = Path::new("/this/file/does/not/exist.flac");
        assert_matches!(
            TrackSource::open(path, AudioFormat::Flac),
            Err(PlaybackError::TrackNotFound(p)) if p == path
        );
    }

    #[test]
    fn garbage_file_is_a_decoder_error() {
        let mut file = tempfile::Builder::new().suffix(".flac").tempfile().unwrap();
        file.write_all(b"definitely not a flac stream").unwrap();

        assert_matches!(
            TrackSource::open(file.path(), AudioFormat::Flac),
            Err(PlaybackError::Decoder(_))
        );
    }
}
