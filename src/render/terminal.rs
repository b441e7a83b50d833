use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen, SetTitle,
};
use crossterm::{execute, queue};
use std::io::{self, Stdout, Write};
use std::time::Duration;

use super::grid::BarGrid;
use super::RenderSink;

/// Draws the grid into the terminal's alternate screen.
///
/// Raw mode and the alternate screen are undone on drop, so every exit path
/// leaves the terminal usable.
pub struct TerminalSink {
    out: Stdout,
    filled: char,
    empty: char,
}

impl TerminalSink {
    pub fn new(filled: char, empty: char) -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw terminal mode")?;
        let mut sink = Self {
            out: io::stdout(),
            filled,
            empty,
        };
        execute!(
            sink.out,
            EnterAlternateScreen,
            Hide,
            SetTitle("barscope"),
            Clear(ClearType::All)
        )
        .context("Failed to prepare terminal")?;
        Ok(sink)
    }
}

impl RenderSink for TerminalSink {
    fn present(&mut self, grid: &BarGrid, _bars: &[f32]) -> Result<()> {
        for y in 0..grid.height() {
            let line = grid.row_string(y, self.filled, self.empty);
            queue!(self.out, MoveTo(0, y as u16), Print(line))?;
        }
        self.out.flush().context("Failed to draw frame")?;
        Ok(())
    }

    fn poll_quit(&mut self) -> Result<bool> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(true)
                    }
                    _ => {}
                }
            }
        }
        Ok(false)
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        let _ = execute!(self.out, Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}
