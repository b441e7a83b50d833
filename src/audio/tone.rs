use std::f64::consts::PI;
use std::time::{Duration, Instant};

use super::batch::{SampleBatch, StreamFormat, MAX_BATCH_FRAMES};
use super::capture::{Capture, CaptureError, CaptureSource};

/// Synthetic sine source, useful without an audio device.
pub struct ToneSource {
    format: StreamFormat,
    frequency_hz: f32,
    amplitude: f32,
    frame: u64,
    /// Pace batches at the sample rate instead of producing as fast as asked.
    realtime: bool,
    next_due: Option<Instant>,
}

impl ToneSource {
    pub fn new(format: StreamFormat, frequency_hz: f32, amplitude: f32, realtime: bool) -> Self {
        Self {
            format,
            frequency_hz,
            amplitude,
            frame: 0,
            realtime,
            next_due: None,
        }
    }

    fn batch_duration(&self) -> Duration {
        Duration::from_secs_f64(MAX_BATCH_FRAMES as f64 / self.format.sample_rate as f64)
    }

    fn synthesize(&mut self) -> SampleBatch {
        let channels = self.format.channels as usize;
        let rate = self.format.sample_rate as f64;
        let mut samples = Vec::with_capacity(MAX_BATCH_FRAMES * channels);
        for i in 0..MAX_BATCH_FRAMES as u64 {
            let t = (self.frame + i) as f64 / rate;
            let value = self.amplitude * (2.0 * PI * self.frequency_hz as f64 * t).sin() as f32;
            samples.extend(std::iter::repeat(value).take(channels));
        }
        self.frame += MAX_BATCH_FRAMES as u64;
        SampleBatch::new(self.format.channels, samples)
    }
}

impl CaptureSource for ToneSource {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn next_batch(&mut self) -> Result<Capture, CaptureError> {
        if self.realtime {
            let now = Instant::now();
            let due = *self.next_due.get_or_insert(now);
            if due > now {
                std::thread::sleep(due - now);
            }
            self.next_due = Some(due + self.batch_duration());
        }
        Ok(Capture::Batch(self.synthesize()))
    }

    fn describe(&self) -> String {
        format!("{:.1}Hz test tone", self.frequency_hz)
    }
}
