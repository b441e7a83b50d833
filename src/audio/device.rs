use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::VecDeque;
use std::time::Duration;

use super::batch::{SampleBatch, StreamFormat};
use super::capture::{Capture, CaptureError, CaptureSource};

/// Callback buffers waiting for the producer before new ones are dropped.
const CHANNEL_CAPACITY: usize = 64;
/// How long one `next_batch` call waits for the device before reporting `Pending`.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which device to capture from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelection {
    DefaultInput,
    /// First input device whose name contains this text.
    Named(String),
    /// Whatever the default output device is playing. Supported by hosts that
    /// expose loopback capture on output devices (WASAPI); on PulseAudio or
    /// PipeWire pick the sink's `.monitor` input with `Named` instead.
    Loopback,
}

#[derive(Debug)]
enum Chunk {
    Samples(Vec<f32>),
    Failed(String),
}

/// Live capture through the platform audio host.
pub struct DeviceSource {
    name: String,
    format: StreamFormat,
    stream: Option<cpal::Stream>,
    rx: Receiver<Chunk>,
    pending: VecDeque<SampleBatch>,
}

impl DeviceSource {
    pub fn open(selection: &DeviceSelection, requested: StreamFormat) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match selection {
            DeviceSelection::DefaultInput => host.default_input_device(),
            DeviceSelection::Loopback => host.default_output_device(),
            DeviceSelection::Named(wanted) => host
                .input_devices()
                .map_err(|e| CaptureError::Init(format!("Failed to list input devices: {}", e)))?
                .find(|d| d.name().map(|n| n.contains(wanted.as_str())).unwrap_or(false)),
        }
        .ok_or_else(|| CaptureError::Init(format!("No audio device for {:?}", selection)))?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = match selection {
            DeviceSelection::Loopback => device.default_output_config(),
            _ => device.default_input_config(),
        }
        .map_err(|e| CaptureError::Init(format!("Failed to query {}: {}", name, e)))?;
        let native = StreamFormat {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
        };

        let ranges: Vec<ConfigRange> = match selection {
            DeviceSelection::Loopback => device
                .supported_output_configs()
                .map(|configs| configs.map(|c| ConfigRange::from(&c)).collect()),
            _ => device
                .supported_input_configs()
                .map(|configs| configs.map(|c| ConfigRange::from(&c)).collect()),
        }
        .unwrap_or_else(|e| {
            log::debug!("Could not list configs for {}: {}", name, e);
            Vec::new()
        });

        let (format, sample_format) =
            choose_format(requested, &ranges, native, supported.sample_format());
        if format != requested {
            log::warn!(
                "{} does not support {}Hz/{}ch, capturing at its native {}Hz/{}ch",
                name,
                requested.sample_rate,
                requested.channels,
                format.sample_rate,
                format.channels
            );
        }

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, tx),
            other => {
                return Err(CaptureError::Init(format!(
                    "Unsupported sample format {:?} on {}",
                    other, name
                )))
            }
        }
        .map_err(|e| {
            CaptureError::Init(format!(
                "Failed to open {} at {}Hz/{}ch: {}",
                name, format.sample_rate, format.channels, e
            ))
        })?;

        stream
            .play()
            .map_err(|e| CaptureError::Init(format!("Failed to start {}: {}", name, e)))?;

        Ok(Self {
            name,
            format,
            stream: Some(stream),
            rx,
            pending: VecDeque::new(),
        })
    }

    /// Names of input devices on the default host.
    pub fn list_inputs() -> Vec<String> {
        cpal::default_host()
            .input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }
}

/// One supported stream configuration range, reduced to what format choice needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ConfigRange {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    sample_format: SampleFormat,
}

impl From<&cpal::SupportedStreamConfigRange> for ConfigRange {
    fn from(range: &cpal::SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate().0,
            max_rate: range.max_sample_rate().0,
            sample_format: range.sample_format(),
        }
    }
}

impl ConfigRange {
    fn accepts(&self, format: StreamFormat) -> bool {
        self.channels == format.channels
            && (self.min_rate..=self.max_rate).contains(&format.sample_rate)
    }
}

/// Keep the requested format when some supported range accepts it, preferring
/// the device's default sample type. Otherwise fall back to the device's native
/// format, which shared-mode and loopback streams usually require.
fn choose_format(
    requested: StreamFormat,
    ranges: &[ConfigRange],
    native: StreamFormat,
    native_sample: SampleFormat,
) -> (StreamFormat, SampleFormat) {
    let mut accepting = ranges.iter().filter(|range| {
        range.accepts(requested)
            && matches!(
                range.sample_format,
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            )
    });
    let preferred = accepting
        .clone()
        .find(|range| range.sample_format == native_sample)
        .or_else(|| accepting.next());
    match preferred {
        Some(range) => (requested, range.sample_format),
        None => (native, native_sample),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: Sender<Chunk>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let err_tx = tx.clone();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
            // Never block the audio callback; a full channel means the producer is behind.
            if let Err(TrySendError::Full(_)) = tx.try_send(Chunk::Samples(samples)) {
                log::trace!("Capture channel full, dropping callback buffer");
            }
        },
        move |err| {
            let _ = err_tx.try_send(Chunk::Failed(err.to_string()));
        },
        None,
    )
}

impl CaptureSource for DeviceSource {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn next_batch(&mut self) -> Result<Capture, CaptureError> {
        if let Some(batch) = self.pending.pop_front() {
            return Ok(Capture::Batch(batch));
        }

        match self.rx.recv_timeout(POLL_INTERVAL) {
            Ok(Chunk::Samples(samples)) => {
                if samples.iter().all(|&s| s == 0.0) {
                    return Ok(Capture::Silent);
                }
                self.pending
                    .extend(SampleBatch::split(self.format.channels, &samples));
                Ok(self
                    .pending
                    .pop_front()
                    .map_or(Capture::Pending, Capture::Batch))
            }
            Ok(Chunk::Failed(reason)) => Err(CaptureError::Read(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(Capture::Pending),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::Read(format!("{} stream closed", self.name)))
            }
        }
    }

    fn release(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        if let Err(e) = stream.pause() {
            log::debug!("Pausing {} failed: {}", self.name, e);
        }
        drop(stream);
        let discarded = self.rx.try_iter().count();
        log::debug!(
            "Released {} ({} undelivered buffers discarded)",
            self.name,
            discarded
        );
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEREO_44K: StreamFormat = StreamFormat {
        sample_rate: 44100,
        channels: 2,
    };
    const STEREO_48K: StreamFormat = StreamFormat {
        sample_rate: 48000,
        channels: 2,
    };

    fn range(channels: u16, min_rate: u32, max_rate: u32, sample_format: SampleFormat) -> ConfigRange {
        ConfigRange {
            channels,
            min_rate,
            max_rate,
            sample_format,
        }
    }

    fn scripted(format: StreamFormat) -> (Sender<Chunk>, DeviceSource) {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let source = DeviceSource {
            name: "scripted".into(),
            format,
            stream: None,
            rx,
            pending: VecDeque::new(),
        };
        (tx, source)
    }

    #[test]
    fn keeps_requested_format_when_supported() {
        let ranges = [
            range(2, 8000, 48000, SampleFormat::I16),
            range(2, 8000, 48000, SampleFormat::F32),
        ];
        assert_eq!(
            choose_format(STEREO_44K, &ranges, STEREO_48K, SampleFormat::F32),
            (STEREO_44K, SampleFormat::F32)
        );
    }

    #[test]
    fn takes_any_handled_sample_type_for_requested_format() {
        let ranges = [
            range(2, 44100, 44100, SampleFormat::I32),
            range(2, 44100, 44100, SampleFormat::I16),
        ];
        assert_eq!(
            choose_format(STEREO_44K, &ranges, STEREO_48K, SampleFormat::F32),
            (STEREO_44K, SampleFormat::I16)
        );
    }

    #[test]
    fn falls_back_to_native_mix_format() {
        // Shared-mode loopback typically offers only the mix format.
        let ranges = [range(2, 48000, 48000, SampleFormat::F32)];
        assert_eq!(
            choose_format(STEREO_44K, &ranges, STEREO_48K, SampleFormat::F32),
            (STEREO_48K, SampleFormat::F32)
        );

        let mono_only = [range(1, 8000, 96000, SampleFormat::F32)];
        assert_eq!(
            choose_format(STEREO_44K, &mono_only, STEREO_48K, SampleFormat::F32),
            (STEREO_48K, SampleFormat::F32)
        );
        assert_eq!(
            choose_format(STEREO_44K, &[], STEREO_48K, SampleFormat::I16),
            (STEREO_48K, SampleFormat::I16)
        );
    }

    #[test]
    fn splits_callback_buffers_into_bounded_batches() {
        let (tx, mut source) = scripted(STEREO_44K);
        tx.send(Chunk::Samples(vec![0.25; 2500 * 2])).unwrap();

        let mut frames = Vec::new();
        for _ in 0..3 {
            match source.next_batch().unwrap() {
                Capture::Batch(batch) => frames.push(batch.frames()),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(frames, vec![1024, 1024, 452]);
        assert!(source.pending.is_empty());
        assert!(matches!(source.next_batch().unwrap(), Capture::Pending));
    }

    #[test]
    fn all_zero_buffer_is_silent() {
        let (tx, mut source) = scripted(STEREO_44K);
        tx.send(Chunk::Samples(vec![0.0; 512 * 2])).unwrap();
        tx.send(Chunk::Samples(vec![0.0, 0.1])).unwrap();
        assert!(matches!(source.next_batch().unwrap(), Capture::Silent));
        match source.next_batch().unwrap() {
            Capture::Batch(batch) => assert_eq!(batch.samples(), &[0.0, 0.1]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn stream_error_becomes_read_error() {
        let (tx, mut source) = scripted(STEREO_44K);
        tx.send(Chunk::Failed("device unplugged".into())).unwrap();
        assert_eq!(
            source.next_batch().unwrap_err(),
            CaptureError::Read("device unplugged".into())
        );
    }

    #[test]
    fn closed_channel_becomes_read_error() {
        let (tx, mut source) = scripted(STEREO_44K);
        tx.send(Chunk::Samples(vec![0.5; 4])).unwrap();
        drop(tx);
        assert!(matches!(source.next_batch().unwrap(), Capture::Batch(_)));
        assert!(matches!(
            source.next_batch(),
            Err(CaptureError::Read(reason)) if reason.contains("closed")
        ));
    }

    #[test]
    fn release_without_stream_is_a_no_op() {
        let (_tx, mut source) = scripted(STEREO_44K);
        source.release();
        source.release();
        assert!(source.stream.is_none());
    }
}
