use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::device::DeviceSelection;
use crate::audio::spectrum::WindowFunction;
use crate::config::{self, resolve_band_edges, Config, ConfigError, VisualizerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "barscope",
    about = "Real-time terminal audio spectrum bars",
    after_help = "Without --device, --loopback, --file or --tone, audio is captured from the \
                  default input device (usually a microphone). Use --loopback to show what \
                  is playing on the default output device, or pick a `.monitor` input with \
                  --device on PulseAudio/PipeWire."
)]
pub struct Cli {
    /// Capture from the first input device whose name contains this text
    #[arg(short, long, conflicts_with_all = ["loopback", "file", "tone"])]
    pub device: Option<String>,

    /// Capture what the default output device is playing instead of the default
    /// input (WASAPI; on PulseAudio/PipeWire use --device with a monitor source)
    #[arg(long, conflicts_with_all = ["file", "tone"])]
    pub loopback: bool,

    /// Replay an audio file (WAV, MP3, FLAC, OGG, AAC) instead of a device
    #[arg(short, long, conflicts_with = "tone")]
    pub file: Option<PathBuf>,

    /// Restart the file when it ends
    #[arg(long, requires = "file")]
    pub loop_file: bool,

    /// Generate a sine test tone at this frequency (Hz)
    #[arg(long)]
    pub tone: Option<f32>,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Capture sample rate in Hz
    #[arg(long, default_value_t = config::DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Capture channel count
    #[arg(long, default_value_t = config::DEFAULT_CHANNELS)]
    pub channels: u16,

    /// Number of frequency bands
    #[arg(short, long, default_value_t = config::DEFAULT_BANDS)]
    pub bands: usize,

    /// Upper edge of the first band in Hz; each following band doubles
    #[arg(long, default_value_t = config::DEFAULT_BAND_BASE_HZ)]
    pub band_base: f32,

    /// Target frequency resolution in Hz (sets how much audio each pass waits for)
    #[arg(long, default_value_t = config::DEFAULT_RESOLUTION_HZ)]
    pub resolution: f32,

    /// Per-tick decay factor for falling bars (0-1)
    #[arg(long, default_value_t = config::DEFAULT_DECAY)]
    pub decay: f32,

    /// Window applied before the transform
    #[arg(long, value_enum, default_value_t = WindowFunction::Rectangular)]
    pub window: WindowFunction,

    /// Display width in columns
    #[arg(long, default_value_t = config::DEFAULT_WIDTH)]
    pub width: usize,

    /// Display height in rows
    #[arg(long, default_value_t = config::DEFAULT_HEIGHT)]
    pub height: usize,

    /// Render tick interval in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_TICK_MS)]
    pub tick_ms: u64,

    /// Character used for filled cells
    #[arg(long, default_value_t = config::DEFAULT_BAR_CHAR)]
    pub bar_char: char,

    /// Run without drawing; log bar levels instead
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<f32>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(skip)]
    band_edges: Option<Vec<f32>>,

    #[arg(skip)]
    empty_char: Option<char>,
}

impl Cli {
    /// Merge a config file: its values apply only where the CLI is at its default.
    pub fn apply_config(&mut self, cfg: Config) {
        if self.sample_rate == config::DEFAULT_SAMPLE_RATE { self.sample_rate = cfg.audio.sample_rate; }
        if self.channels == config::DEFAULT_CHANNELS { self.channels = cfg.audio.channels; }
        if self.resolution == config::DEFAULT_RESOLUTION_HZ { self.resolution = cfg.audio.resolution_hz; }
        if self.bands == config::DEFAULT_BANDS { self.bands = cfg.analysis.bands; }
        if self.band_base == config::DEFAULT_BAND_BASE_HZ { self.band_base = cfg.analysis.band_base_hz; }
        if self.decay == config::DEFAULT_DECAY { self.decay = cfg.analysis.decay; }
        if self.window == WindowFunction::Rectangular { self.window = cfg.analysis.window; }
        if self.width == config::DEFAULT_WIDTH { self.width = cfg.display.width; }
        if self.height == config::DEFAULT_HEIGHT { self.height = cfg.display.height; }
        if self.tick_ms == config::DEFAULT_TICK_MS { self.tick_ms = cfg.display.tick_ms; }
        if self.bar_char == config::DEFAULT_BAR_CHAR { self.bar_char = cfg.display.bar_char; }
        if self.device.is_none() && !self.loopback && self.file.is_none() && self.tone.is_none() {
            self.device = cfg.audio.device;
        }
        if self.band_edges.is_none() {
            self.band_edges = cfg.analysis.band_edges;
        }
        self.empty_char = Some(cfg.display.empty_char);
    }

    pub fn device_selection(&self) -> DeviceSelection {
        match (&self.device, self.loopback) {
            (_, true) => DeviceSelection::Loopback,
            (Some(name), false) => DeviceSelection::Named(name.clone()),
            (None, false) => DeviceSelection::DefaultInput,
        }
    }

    /// How long to run, if `--duration` was given.
    pub fn run_duration(&self) -> Result<Option<Duration>> {
        let Some(secs) = self.duration else {
            return Ok(None);
        };
        if !(secs > 0.0) {
            bail!("--duration must be positive, got {}", secs);
        }
        match Duration::try_from_secs_f32(secs) {
            Ok(duration) => Ok(Some(duration)),
            Err(_) => bail!("--duration {} is too large", secs),
        }
    }

    pub fn visualizer_config(&self) -> Result<VisualizerConfig, ConfigError> {
        let band_edges = resolve_band_edges(self.bands, self.band_base, self.band_edges.as_deref())?;
        let config = VisualizerConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            band_edges,
            width: self.width,
            height: self.height,
            resolution_hz: self.resolution,
            decay: self.decay,
            tick: Duration::from_millis(self.tick_ms),
            window: self.window,
            bar_char: self.bar_char,
            empty_char: self.empty_char.unwrap_or(config::DEFAULT_EMPTY_CHAR),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_default_config() {
        let cli = Cli::parse_from(["barscope"]);
        assert_eq!(cli.visualizer_config(), Ok(VisualizerConfig::default()));
        assert_eq!(cli.device_selection(), DeviceSelection::DefaultInput);
    }

    #[test]
    fn config_file_fills_defaults_only() {
        let mut cli = Cli::parse_from(["barscope", "--width", "100"]);
        let cfg: Config = toml::from_str(
            r#"
            [display]
            width = 80
            height = 30

            [analysis]
            bands = 3
            band_edges = [0.0, 100.0, 1000.0, 10000.0]
            "#,
        )
        .unwrap();
        cli.apply_config(cfg);

        let config = cli.visualizer_config().unwrap();
        assert_eq!(config.width, 100);
        assert_eq!(config.height, 30);
        assert_eq!(config.band_edges, vec![0.0, 100.0, 1000.0, 10000.0]);
    }

    #[test]
    fn duration_must_be_positive_and_finite() {
        let run_for = |arg: &str| Cli::parse_from(["barscope", "--duration", arg]).run_duration();
        assert_eq!(run_for("2.5").unwrap(), Some(Duration::from_millis(2500)));
        assert!(run_for("0").is_err());
        assert!(run_for("NaN").is_err());
        assert!(run_for("inf").is_err());
        assert!(run_for("1e30").is_err());
        assert_eq!(Cli::parse_from(["barscope"]).run_duration().unwrap(), None);
    }

    #[test]
    fn help_names_the_default_capture_device() {
        use clap::CommandFactory;
        let command = Cli::command();
        let help = command.get_after_help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("default input device"));
        assert!(help.contains("--loopback"));
    }

    #[test]
    fn loopback_wins_selection() {
        let cli = Cli::parse_from(["barscope", "--loopback"]);
        assert_eq!(cli.device_selection(), DeviceSelection::Loopback);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cli = Cli::parse_from(["barscope", "--decay", "1.2"]);
        assert_eq!(cli.visualizer_config(), Err(ConfigError::Decay(1.2)));
    }
}
