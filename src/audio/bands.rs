use super::spectrum::Spectrum;

/// A (lower, upper] frequency range shown as one bar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyBand {
    pub lower_hz: f32,
    pub upper_hz: f32,
}

impl FrequencyBand {
    pub fn contains(&self, freq: f32) -> bool {
        self.lower_hz < freq && freq <= self.upper_hz
    }
}

/// Edges 0, base, 2*base, 4*base, ... giving `count` bands of doubling width.
pub fn octave_edges(count: usize, base_hz: f32) -> Vec<f32> {
    let mut edges = Vec::with_capacity(count + 1);
    edges.push(0.0);
    let mut edge = base_hz;
    for _ in 0..count {
        edges.push(edge);
        edge *= 2.0;
    }
    edges
}

/// Aggregates spectral bins into bands and normalizes them against the loudest band.
#[derive(Clone, Debug)]
pub struct BandMapper {
    bands: Vec<FrequencyBand>,
}

impl BandMapper {
    /// `edges` must be strictly increasing; band `i` spans `edges[i]..=edges[i + 1]`.
    pub fn from_edges(edges: &[f32]) -> Self {
        let bands = edges
            .windows(2)
            .map(|pair| FrequencyBand {
                lower_hz: pair[0],
                upper_hz: pair[1],
            })
            .collect();
        Self { bands }
    }

    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Sum each usable bin's magnitude into the band containing its frequency.
    pub fn accumulate(&self, spectrum: &Spectrum) -> Vec<f32> {
        let mut raw = vec![0.0f32; self.bands.len()];
        for (freq, magnitude) in spectrum.usable_bins() {
            if let Some(i) = self.bands.iter().position(|band| band.contains(freq)) {
                raw[i] += magnitude;
            }
        }
        raw
    }

    /// Band values in [0, 1] for one spectrum.
    pub fn map(&self, spectrum: &Spectrum) -> Vec<f32> {
        normalize(self.accumulate(spectrum))
    }
}

/// Divide every value by the maximum. An all-zero input stays all zero.
pub fn normalize(mut raw: Vec<f32>) -> Vec<f32> {
    let max = raw.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for value in &mut raw {
            *value = (*value / max).clamp(0.0, 1.0);
        }
    }
    raw
}
