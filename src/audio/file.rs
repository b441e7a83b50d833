use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::batch::{SampleBatch, StreamFormat, MAX_BATCH_FRAMES};
use super::capture::{Capture, CaptureError, CaptureSource};

pub struct DecodedAudio {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub format: StreamFormat,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }
}

pub fn decode_audio(path: &Path) -> Result<DecodedAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()) as u16;
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let audio = DecodedAudio {
        samples,
        format: StreamFormat {
            sample_rate,
            channels,
        },
    };
    log::info!(
        "Decoded {}: {} frames, {}Hz, {} ch, {:.1}s",
        path.display(),
        audio.frames(),
        sample_rate,
        channels,
        audio.frames() as f32 / sample_rate as f32
    );
    Ok(audio)
}

/// Replays a decoded file as if it were a live capture.
pub struct FileSource {
    path: PathBuf,
    audio: DecodedAudio,
    position: usize,
    looping: bool,
    realtime: bool,
    next_due: Option<Instant>,
}

impl FileSource {
    pub fn open(path: &Path, looping: bool, realtime: bool) -> Result<Self, CaptureError> {
        let audio = decode_audio(path).map_err(|e| CaptureError::Init(format!("{:#}", e)))?;
        if audio.samples.is_empty() {
            return Err(CaptureError::Init(format!(
                "{} contains no audio",
                path.display()
            )));
        }
        Ok(Self::from_decoded(path.to_path_buf(), audio, looping, realtime))
    }

    pub fn from_decoded(path: PathBuf, audio: DecodedAudio, looping: bool, realtime: bool) -> Self {
        Self {
            path,
            audio,
            position: 0,
            looping,
            realtime,
            next_due: None,
        }
    }

    fn pace(&mut self, frames: usize) {
        if !self.realtime {
            return;
        }
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        let period = frames as f64 / self.audio.format.sample_rate as f64;
        self.next_due = Some(due + Duration::from_secs_f64(period));
    }
}

impl CaptureSource for FileSource {
    fn format(&self) -> StreamFormat {
        self.audio.format
    }

    fn next_batch(&mut self) -> Result<Capture, CaptureError> {
        let channels = self.audio.format.channels.max(1) as usize;
        if self.position >= self.audio.samples.len() {
            if !self.looping {
                return Ok(Capture::Ended);
            }
            log::debug!("Looping {}", self.path.display());
            self.position = 0;
        }

        let end = (self.position + MAX_BATCH_FRAMES * channels).min(self.audio.samples.len());
        let chunk = self.audio.samples[self.position..end].to_vec();
        self.position = end;

        let batch = SampleBatch::new(self.audio.format.channels, chunk);
        self.pace(batch.frames());
        if batch.samples().iter().all(|&s| s == 0.0) {
            return Ok(Capture::Silent);
        }
        Ok(Capture::Batch(batch))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
