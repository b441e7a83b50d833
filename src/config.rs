use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::audio::bands::octave_edges;
use crate::audio::batch::StreamFormat;
use crate::audio::queue::ready_threshold;
use crate::audio::spectrum::WindowFunction;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_CHANNELS: u16 = 2;
pub const DEFAULT_BANDS: usize = 10;
pub const DEFAULT_BAND_BASE_HZ: f32 = 50.0;
pub const DEFAULT_WIDTH: usize = 60;
pub const DEFAULT_HEIGHT: usize = 20;
pub const DEFAULT_RESOLUTION_HZ: f32 = 20.0;
pub const DEFAULT_DECAY: f32 = 0.9;
pub const DEFAULT_TICK_MS: u64 = 16;
pub const DEFAULT_BAR_CHAR: char = '█';
pub const DEFAULT_EMPTY_CHAR: char = ' ';

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive")]
    SampleRate,
    #[error("channel count must be positive")]
    Channels,
    #[error("at least one band is required")]
    NoBands,
    #[error("band edges must number bands + 1 ({expected}), got {got}")]
    EdgeCount { expected: usize, got: usize },
    #[error("band edges must start at or above 0 Hz and strictly increase")]
    EdgeOrder,
    #[error("display must be at least 1x1, got {width}x{height}")]
    Display { width: usize, height: usize },
    #[error("frequency resolution must be positive, got {0}")]
    Resolution(f32),
    #[error("decay factor must lie strictly between 0 and 1, got {0}")]
    Decay(f32),
    #[error("render tick must be at least 1 ms")]
    Tick,
}

/// Settings for one run, fixed at startup and shared read-only by every component.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualizerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Band boundaries in Hz; band `i` covers `(edges[i], edges[i + 1]]`.
    pub band_edges: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub resolution_hz: f32,
    pub decay: f32,
    pub tick: Duration,
    pub window: WindowFunction,
    pub bar_char: char,
    pub empty_char: char,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            band_edges: octave_edges(DEFAULT_BANDS, DEFAULT_BAND_BASE_HZ),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            resolution_hz: DEFAULT_RESOLUTION_HZ,
            decay: DEFAULT_DECAY,
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            window: WindowFunction::Rectangular,
            bar_char: DEFAULT_BAR_CHAR,
            empty_char: DEFAULT_EMPTY_CHAR,
        }
    }
}

impl VisualizerConfig {
    pub fn bands(&self) -> usize {
        self.band_edges.len().saturating_sub(1)
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn ready_threshold(&self) -> usize {
        ready_threshold(self.sample_rate, self.resolution_hz)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::SampleRate);
        }
        if self.channels == 0 {
            return Err(ConfigError::Channels);
        }
        if self.band_edges.len() < 2 {
            return Err(ConfigError::NoBands);
        }
        let ordered = self.band_edges[0] >= 0.0
            && self.band_edges.windows(2).all(|pair| pair[0] < pair[1]);
        if !ordered {
            return Err(ConfigError::EdgeOrder);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Display {
                width: self.width,
                height: self.height,
            });
        }
        if !(self.resolution_hz > 0.0) {
            return Err(ConfigError::Resolution(self.resolution_hz));
        }
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(ConfigError::Decay(self.decay));
        }
        if self.tick.is_zero() {
            return Err(ConfigError::Tick);
        }
        Ok(())
    }
}

/// Band edges from either an explicit list or the doubling layout.
pub fn resolve_band_edges(
    bands: usize,
    base_hz: f32,
    explicit: Option<&[f32]>,
) -> Result<Vec<f32>, ConfigError> {
    if bands == 0 {
        return Err(ConfigError::NoBands);
    }
    match explicit {
        Some(edges) if edges.len() != bands + 1 => Err(ConfigError::EdgeCount {
            expected: bands + 1,
            got: edges.len(),
        }),
        Some(edges) => Ok(edges.to_vec()),
        None => Ok(octave_edges(bands, base_hz)),
    }
}

/// On-disk configuration (TOML).
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_resolution")]
    pub resolution_hz: f32,
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_bands")]
    pub bands: usize,
    #[serde(default = "default_band_base")]
    pub band_base_hz: f32,
    #[serde(default)]
    pub band_edges: Option<Vec<f32>>,
    #[serde(default)]
    pub window: WindowFunction,
    #[serde(default = "default_decay")]
    pub decay: f32,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_bar_char")]
    pub bar_char: char,
    #[serde(default = "default_empty_char")]
    pub empty_char: char,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            resolution_hz: default_resolution(),
            device: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            band_base_hz: default_band_base(),
            band_edges: None,
            window: WindowFunction::default(),
            decay: default_decay(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            tick_ms: default_tick_ms(),
            bar_char: default_bar_char(),
            empty_char: default_empty_char(),
        }
    }
}

fn default_sample_rate() -> u32 { DEFAULT_SAMPLE_RATE }
fn default_channels() -> u16 { DEFAULT_CHANNELS }
fn default_resolution() -> f32 { DEFAULT_RESOLUTION_HZ }
fn default_bands() -> usize { DEFAULT_BANDS }
fn default_band_base() -> f32 { DEFAULT_BAND_BASE_HZ }
fn default_decay() -> f32 { DEFAULT_DECAY }
fn default_width() -> usize { DEFAULT_WIDTH }
fn default_height() -> usize { DEFAULT_HEIGHT }
fn default_tick_ms() -> u64 { DEFAULT_TICK_MS }
fn default_bar_char() -> char { DEFAULT_BAR_CHAR }
fn default_empty_char() -> char { DEFAULT_EMPTY_CHAR }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// `./barscope.toml`, then `~/.config/barscope/config.toml`, then the platform config dir.
pub fn discover_config() -> Option<PathBuf> {
    let local = PathBuf::from("barscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("barscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("barscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
