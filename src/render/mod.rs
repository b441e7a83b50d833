pub mod grid;
pub mod headless;
pub mod terminal;

use anyhow::Result;

use grid::BarGrid;

/// Something that can show a bar grid.
pub trait RenderSink {
    fn present(&mut self, grid: &BarGrid, bars: &[f32]) -> Result<()>;

    /// Whether the user asked to quit since the last call.
    fn poll_quit(&mut self) -> Result<bool> {
        Ok(false)
    }
}
