use rustfft::num_complex::Complex;
use serde::Deserialize;

use super::queue::Drained;

/// Optional taper applied to the window before the transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    #[default]
    Rectangular,
    Hann,
}

/// Magnitude spectrum of one processing pass.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub magnitudes: Vec<f32>,
    pub sample_rate: u32,
}

impl Spectrum {
    /// Length of the (padded) window the spectrum was computed from.
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Center frequency of bin `k` in Hz.
    pub fn bin_frequency(&self, k: usize) -> f32 {
        k as f32 * self.sample_rate as f32 / self.len() as f32
    }

    /// Bins from 1 up to Nyquist, as (frequency, magnitude). The DC term and the
    /// mirrored upper half are left out.
    pub fn usable_bins(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        let nyquist_bin = self.len() / 2;
        (1..=nyquist_bin).map(move |k| (self.bin_frequency(k), self.magnitudes[k]))
    }

    /// Index of the strongest usable bin.
    #[allow(dead_code)]
    pub fn peak_bin(&self) -> Option<usize> {
        (1..=self.len() / 2).max_by(|&a, &b| self.magnitudes[a].total_cmp(&self.magnitudes[b]))
    }
}

pub struct SpectrumAnalyzer {
    sample_rate: u32,
    window: WindowFunction,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32, window: WindowFunction) -> Self {
        Self { sample_rate, window }
    }

    /// Downmix, pad and transform everything drained in one pass. Returns `None`
    /// when nothing was drained.
    pub fn analyze(&self, drained: &Drained) -> Option<Spectrum> {
        let mono = downmix(drained);
        if mono.is_empty() {
            return None;
        }
        if !mono.len().is_power_of_two() {
            log::debug!(
                "Padding {} drained frames to {}",
                mono.len(),
                mono.len().next_power_of_two()
            );
        }
        Some(self.analyze_mono(&mono))
    }

    pub fn analyze_mono(&self, mono: &[f32]) -> Spectrum {
        let padded_len = mono.len().next_power_of_two();
        let taper = match self.window {
            WindowFunction::Rectangular => None,
            WindowFunction::Hann => Some(hann_window(mono.len())),
        };

        let mut input = vec![Complex::new(0.0f32, 0.0); padded_len];
        for (i, &sample) in mono.iter().enumerate() {
            let weight = taper.as_ref().map_or(1.0, |w| w[i]);
            input[i] = Complex::new(sample * weight, 0.0);
        }

        let magnitudes = fft(&input).iter().map(|c| c.norm()).collect();
        Spectrum {
            magnitudes,
            sample_rate: self.sample_rate,
        }
    }
}

/// Average every frame's channels into one value, in drain order.
pub fn downmix(drained: &Drained) -> Vec<f32> {
    let mut mono = Vec::with_capacity(drained.frames);
    for batch in &drained.batches {
        let channels = batch.channels() as f32;
        mono.extend(batch.frames_iter().map(|frame| frame.iter().sum::<f32>() / channels));
    }
    mono
}

/// Recursive radix-2 decimation-in-time transform. `input.len()` must be a power
/// of two; each level allocates its own halves and output.
pub fn fft(input: &[Complex<f32>]) -> Vec<Complex<f32>> {
    let n = input.len();
    if n <= 1 {
        return input.to_vec();
    }
    debug_assert!(n.is_power_of_two(), "fft length {} is not a power of two", n);

    let even: Vec<Complex<f32>> = input.iter().step_by(2).copied().collect();
    let odd: Vec<Complex<f32>> = input.iter().skip(1).step_by(2).copied().collect();
    let even = fft(&even);
    let odd = fft(&odd);

    let half = n / 2;
    let mut output = vec![Complex::new(0.0, 0.0); n];
    for k in 0..half {
        let angle = -2.0 * std::f64::consts::PI * k as f64 / n as f64;
        let twiddle = Complex::new(angle.cos() as f32, angle.sin() as f32);
        let t = twiddle * odd[k];
        output[k] = even[k] + t;
        output[k + half] = even[k] - t;
    }
    output
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::batch::SampleBatch;
    use rustfft::FftPlanner;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * freq as f64 * i as f64 / sample_rate as f64;
                phase.sin() as f32
            })
            .collect()
    }

    #[test]
    fn length_one_is_identity() {
        let input = vec![Complex::new(0.75f32, -0.5)];
        assert_eq!(fft(&input), input);
    }

    #[test]
    fn matches_rustfft() {
        let input: Vec<Complex<f32>> = (0..256)
            .map(|i| Complex::new(((i * 37) % 17) as f32 / 17.0 - 0.5, 0.0))
            .collect();
        let ours = fft(&input);

        let mut reference = input.clone();
        FftPlanner::<f32>::new()
            .plan_fft_forward(reference.len())
            .process(&mut reference);

        for (a, b) in ours.iter().zip(reference.iter()) {
            assert!((a - b).norm() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn sine_on_exact_bin_peaks_there() {
        let sample_rate = 44100;
        let len = 4096;
        let bin = 93;
        let freq = bin as f32 * sample_rate as f32 / len as f32;

        let analyzer = SpectrumAnalyzer::new(sample_rate, WindowFunction::Rectangular);
        let spectrum = analyzer.analyze_mono(&sine(freq, sample_rate, len));

        assert_eq!(spectrum.peak_bin(), Some(bin));
        let peak = spectrum.magnitudes[bin];
        assert!((peak - len as f32 / 2.0).abs() < 1.0);
        for (k, &mag) in spectrum.magnitudes.iter().enumerate().take(len / 2) {
            if k != bin {
                assert!(mag / peak < 1e-3, "bin {} leaked {}", k, mag / peak);
            }
        }
    }

    #[test]
    fn bin_frequency_uses_padded_length() {
        let analyzer = SpectrumAnalyzer::new(44100, WindowFunction::Rectangular);
        let spectrum = analyzer.analyze_mono(&vec![0.0; 3000]);
        assert_eq!(spectrum.len(), 4096);
        assert!((spectrum.bin_frequency(1) - 44100.0 / 4096.0).abs() < 1e-3);
        assert_eq!(spectrum.usable_bins().count(), 2048);
    }

    #[test]
    fn downmix_averages_all_channels() {
        let drained = Drained {
            batches: vec![
                SampleBatch::new(2, vec![1.0, 0.0, 0.5, 0.5]),
                SampleBatch::new(2, vec![-1.0, 1.0]),
            ],
            frames: 3,
        };
        assert_eq!(downmix(&drained), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn empty_drain_has_no_spectrum() {
        let analyzer = SpectrumAnalyzer::new(44100, WindowFunction::Hann);
        assert!(analyzer.analyze(&Drained::default()).is_none());
    }

    #[test]
    fn hann_window_tapers_edges() {
        let window = hann_window(1024);
        assert!(window[0].abs() < 0.01);
        assert!(window[1023].abs() < 0.01);
        assert!((window[512] - 1.0).abs() < 0.01);
    }
}
