/// Fixed-size filled/empty cell grid handed to a render sink. Row 0 is the top.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarGrid {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl BarGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    #[allow(dead_code)]
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[allow(dead_code)]
    pub fn is_filled(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x]
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|&cell| !cell)
    }

    /// Redraw from bar values in [0, 1]. Column `x` shows bar
    /// `floor(x * bars / width)`; a bar of value `v` fills its bottom
    /// `round(v * height)` rows.
    pub fn draw(&mut self, bars: &[f32]) {
        self.cells.fill(false);
        if bars.is_empty() {
            return;
        }
        for x in 0..self.width {
            let bar = (x * bars.len() / self.width).min(bars.len() - 1);
            let level = (bars[bar].clamp(0.0, 1.0) * self.height as f32).round() as usize;
            for y in self.height - level..self.height {
                self.cells[y * self.width + x] = true;
            }
        }
    }

    pub fn row(&self, y: usize) -> &[bool] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    /// Render one row as text.
    pub fn row_string(&self, y: usize, filled: char, empty: char) -> String {
        self.row(y)
            .iter()
            .map(|&cell| if cell { filled } else { empty })
            .collect()
    }

    #[allow(dead_code)]
    pub fn lines(&self, filled: char, empty: char) -> Vec<String> {
        (0..self.height)
            .map(|y| self.row_string(y, filled, empty))
            .collect()
    }

    /// Filled rows per column, counted from the bottom.
    #[allow(dead_code)]
    pub fn column_heights(&self) -> Vec<usize> {
        (0..self.width)
            .map(|x| (0..self.height).filter(|&y| self.is_filled(x, y)).count())
            .collect()
    }
}
