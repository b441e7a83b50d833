/// Bars below this are treated as fully decayed.
const SETTLE_EPSILON: f32 = 1e-4;

/// Attack/decay smoothing of band values across render ticks.
///
/// A louder band jumps straight to its new value; a quieter one falls by the
/// decay factor each tick.
#[derive(Clone, Debug)]
pub struct Animator {
    decay: f32,
    bars: Vec<f32>,
}

impl Animator {
    pub fn new(bands: usize, decay: f32) -> Self {
        Self {
            decay,
            bars: vec![0.0; bands],
        }
    }

    /// Advance one tick. `fresh` holds this tick's band values, or `None` when no
    /// new spectrum arrived, which counts as all zeros.
    pub fn tick(&mut self, fresh: Option<&[f32]>) -> &[f32] {
        for (i, bar) in self.bars.iter_mut().enumerate() {
            let target = fresh.and_then(|values| values.get(i)).copied().unwrap_or(0.0);
            let decayed = *bar * self.decay;
            let next = if decayed >= target { decayed } else { target };
            *bar = if next < SETTLE_EPSILON { 0.0 } else { next };
        }
        &self.bars
    }

    pub fn bars(&self) -> &[f32] {
        &self.bars
    }

    /// True once every bar has decayed to zero.
    pub fn is_settled(&self) -> bool {
        self.bars.iter().all(|&bar| bar == 0.0)
    }
}
