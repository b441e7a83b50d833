use anyhow::Result;
use std::time::{Duration, Instant};

use super::grid::BarGrid;
use super::RenderSink;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(1);

/// Draws nothing; logs a compact bar summary about once per second.
pub struct HeadlessSink {
    last_summary: Option<Instant>,
    frames: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self {
            last_summary: None,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for HeadlessSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSink for HeadlessSink {
    fn present(&mut self, _grid: &BarGrid, bars: &[f32]) -> Result<()> {
        self.frames += 1;
        let due = self
            .last_summary
            .map_or(true, |last| last.elapsed() >= SUMMARY_INTERVAL);
        if due {
            self.last_summary = Some(Instant::now());
            log::info!("bars {}", summarize(bars));
        }
        Ok(())
    }
}

/// One digit 0-9 per bar.
pub fn summarize(bars: &[f32]) -> String {
    bars.iter()
        .map(|&bar| {
            let level = (bar.clamp(0.0, 1.0) * 9.0).round() as u32;
            char::from_digit(level, 10).unwrap_or('?')
        })
        .collect()
}
