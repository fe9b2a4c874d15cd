use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam::channel::{bounded, Sender};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::PlaybackError;
use crate::format::AudioFormat;
use crate::resample::StereoResampler;
use crate::session::{Session, SessionControl, Wake};
use crate::source::TrackSource;

pub const TARGET_SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 2; // Stereo
const RING_CAPACITY: usize = TARGET_SAMPLE_RATE as usize * CHANNELS as usize / 2; // 500ms
const FEED_BACKOFF: Duration = Duration::from_millis(20);

/// Starts playback sessions on an audio sink.
pub trait Output: Send + Sync {
    /// Begin rendering `path`. Fails without claiming the sink when the track
    /// cannot be opened.
    fn start(&self, path: &Path) -> Result<Session, PlaybackError>;
}

/// Plays tracks on the host's default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceOutput;

impl DeviceOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Output for DeviceOutput {
    fn start(&self, path: &Path) -> Result<Session, PlaybackError> {
        let format = AudioFormat::from_path(path)?;
        let source = TrackSource::open(path, format)?;
        tracing::info!(
            "Starting playback of {} ({:?}, {}Hz, {} channels)",
            path.display(),
            format,
            source.sample_rate(),
            source.audio_channels()
        );

        Session::spawn(path.to_path_buf(), move |control| render(source, control))
    }
}

/// Decode, resample and push samples into the device until the track is
/// drained, then wait for either the device to finish or a cancel.
fn render(mut source: TrackSource, control: &SessionControl) -> Result<Wake, PlaybackError> {
    let mut resampler = StereoResampler::new(source.sample_rate(), TARGET_SAMPLE_RATE)?;

    let (mut producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
    let (finished_tx, finished_rx) = bounded(1);
    let drained = Arc::new(AtomicBool::new(false));

    let stream = open_stream(consumer, control.paused(), Arc::clone(&drained), finished_tx)?;
    stream.play()?;

    while let Some(samples) = source.next_stereo()? {
        let samples = resampler.process(&samples)?;
        if !feed(&mut producer, &samples, control) {
            return Ok(Wake::Cancelled);
        }
    }

    let tail = resampler.flush()?;
    if !feed(&mut producer, &tail, control) {
        return Ok(Wake::Cancelled);
    }

    drained.store(true, Ordering::Release);
    Ok(control.wait_for(&finished_rx))
}

/// Push everything into the ring buffer, backing off while it is full.
/// Returns `false` when the session was cancelled first.
fn feed(producer: &mut HeapProducer<f32>, mut samples: &[f32], control: &SessionControl) -> bool {
    while !samples.is_empty() {
        let written = producer.push_slice(samples);
        samples = &samples[written..];

        if !samples.is_empty() && control.cancelled_within(FEED_BACKOFF) {
            return false;
        }
    }

    !control.is_cancelled()
}

fn open_stream(
    mut consumer: HeapConsumer<f32>,
    paused: Arc<AtomicBool>,
    drained: Arc<AtomicBool>,
    finished: Sender<()>,
) -> Result<Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError::AudioDevice("No output device found".into()))?;
    tracing::debug!("Output device: {}", device.name().unwrap_or_default());

    let config = StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(TARGET_SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if paused.load(Ordering::Relaxed) {
                data.fill(0.0);
                return;
            }

            let read = consumer.pop_slice(data);
            data[read..].fill(0.0);

            if consumer.is_empty() && drained.load(Ordering::Acquire) {
                let _ = finished.try_send(());
            }
        },
        |err| tracing::error!("Audio stream error: {}", err),
        None,
    )?;

    Ok(stream)
}
