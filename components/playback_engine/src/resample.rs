//! Streaming stereo resampling onto the output rate.

use crate::error::PlaybackError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

const CHUNK_FRAMES: usize = 1024;
const STEREO: usize = 2;

/// Feeds rubato fixed-size chunks out of arbitrarily sized decoder packets.
/// Passes samples through untouched when the rates already match.
pub struct StereoResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: [Vec<f32>; STEREO],
}

impl StereoResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, PlaybackError> {
        let inner = if input_rate == output_rate {
            None
        } else {
            tracing::debug!("Resampling from {}Hz to {}Hz", input_rate, output_rate);
            let resampler = FastFixedIn::<f32>::new(
                output_rate as f64 / input_rate as f64,
                1.0,
                PolynomialDegree::Cubic,
                CHUNK_FRAMES,
                STEREO,
            )
            .map_err(|e| PlaybackError::Resample(e.to_string()))?;
            Some(resampler)
        };

        Ok(Self {
            inner,
            pending: [Vec::new(), Vec::new()],
        })
    }

    /// Resample interleaved stereo. May hold back up to one chunk of input.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, PlaybackError> {
        let Self { inner, pending } = self;
        let Some(resampler) = inner.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        for frame in interleaved.chunks_exact(STEREO) {
            pending[0].push(frame[0]);
            pending[1].push(frame[1]);
        }

        let mut output = Vec::new();
        while pending[0].len() >= CHUNK_FRAMES {
            let chunk = [&pending[0][..CHUNK_FRAMES], &pending[1][..CHUNK_FRAMES]];
            let planar = resampler
                .process(&chunk[..], None)
                .map_err(|e| PlaybackError::Resample(e.to_string()))?;
            interleave_into(&planar, &mut output);

            for channel in pending.iter_mut() {
                channel.drain(..CHUNK_FRAMES);
            }
        }

        Ok(output)
    }

    /// Drain whatever input is still held back
    pub fn flush(&mut self) -> Result<Vec<f32>, PlaybackError> {
        let Self { inner, pending } = self;
        let Some(resampler) = inner.as_mut() else {
            return Ok(Vec::new());
        };
        if pending[0].is_empty() {
            return Ok(Vec::new());
        }

        let chunk = [pending[0].as_slice(), pending[1].as_slice()];
        let planar = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(|e| PlaybackError::Resample(e.to_string()))?;

        let mut output = Vec::new();
        interleave_into(&planar, &mut output);
        for channel in pending.iter_mut() {
            channel.clear();
        }

        Ok(output)
    }
}

fn interleave_into(planar: &[Vec<f32>], output: &mut Vec<f32>) {
    let (left, right) = (&planar[0], &planar[1]);
    output.reserve(left.len() * STEREO);
    for (l, r) in left.iter().zip(right) {
        output.push(*l);
        output.push(*r);
    }
}
