use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::audio::animator::Animator;
use crate::audio::bands::BandMapper;
use crate::audio::queue::{AudioQueue, Drained};
use crate::audio::spectrum::SpectrumAnalyzer;
use crate::config::VisualizerConfig;
use crate::render::grid::BarGrid;
use crate::render::RenderSink;

/// Consumer side of the pipeline: spectrum, bands, smoothing and grid.
pub struct Visualizer {
    analyzer: SpectrumAnalyzer,
    mapper: BandMapper,
    animator: Animator,
    grid: BarGrid,
}

impl Visualizer {
    /// `sample_rate` is the rate the source actually delivers, which may differ
    /// from the configured one.
    pub fn new(config: &VisualizerConfig, sample_rate: u32) -> Self {
        let mapper = BandMapper::from_edges(&config.band_edges);
        for (i, band) in mapper.bands().iter().enumerate() {
            log::debug!("Band {}: ({} Hz, {} Hz]", i, band.lower_hz, band.upper_hz);
        }
        Self {
            analyzer: SpectrumAnalyzer::new(sample_rate, config.window),
            animator: Animator::new(mapper.len(), config.decay),
            mapper,
            grid: BarGrid::new(config.width, config.height),
        }
    }

    /// Normalized band values for one drained window, or `None` if it was empty.
    pub fn analyze(&self, drained: &Drained) -> Option<Vec<f32>> {
        let spectrum = self.analyzer.analyze(drained)?;
        log::trace!(
            "Analyzed {} frames over {} bins",
            drained.frames,
            spectrum.len()
        );
        Some(self.mapper.map(&spectrum))
    }

    /// One render tick: smooth toward `fresh` (or decay without it) and redraw.
    pub fn advance(&mut self, fresh: Option<&[f32]>) -> &BarGrid {
        let bars = self.animator.tick(fresh);
        self.grid.draw(bars);
        &self.grid
    }

    pub fn bars(&self) -> &[f32] {
        self.animator.bars()
    }

    pub fn grid(&self) -> &BarGrid {
        &self.grid
    }

    pub fn is_settled(&self) -> bool {
        self.animator.is_settled()
    }
}

/// When the render loop should give up on its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoopLimits {
    pub deadline: Option<Instant>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub passes: u64,
    pub empty_passes: u64,
}

/// Drive the display until shutdown.
///
/// Each tick waits up to one tick interval for the ready signal. When it fires,
/// the queue is drained and analyzed; either way the animator advances and the
/// sink is redrawn, so bars keep falling while no audio arrives. `finished` is
/// polled between ticks and ends the loop once it returns true.
pub fn run_render_loop(
    config: &VisualizerConfig,
    visualizer: &mut Visualizer,
    queue: &AudioQueue,
    sink: &mut dyn RenderSink,
    shutdown: &AtomicBool,
    limits: LoopLimits,
    mut finished: impl FnMut(&Visualizer) -> bool,
) -> Result<LoopStats> {
    let mut stats = LoopStats::default();
    log::info!(
        "Render loop started: {} bands, {}x{}, tick {:?}",
        config.bands(),
        config.width,
        config.height,
        config.tick
    );

    while !shutdown.load(Ordering::Relaxed) {
        let fresh = if queue.wait_ready(config.tick) {
            let drained = queue.drain_all();
            stats.passes += 1;
            let values = visualizer.analyze(&drained);
            if values.is_none() {
                stats.empty_passes += 1;
                log::warn!("Ready signal raised with nothing queued");
            }
            values
        } else {
            None
        };

        visualizer.advance(fresh.as_deref());
        sink.present(visualizer.grid(), visualizer.bars())?;
        stats.ticks += 1;

        if sink.poll_quit()? {
            log::info!("Quit requested");
            break;
        }
        if limits.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("Run duration reached");
            break;
        }
        if finished(visualizer) {
            break;
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    log::info!(
        "Render loop stopped after {} ticks, {} analysis passes",
        stats.ticks,
        stats.passes
    );
    Ok(stats)
}
