/// Largest number of frames a single capture event may deliver.
pub const MAX_BATCH_FRAMES: usize = 1024;

/// Sample rate and channel layout of a capture stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One capture event worth of interleaved audio.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBatch {
    channels: u16,
    samples: Vec<f32>,
}

impl SampleBatch {
    /// Build a batch from interleaved samples. A trailing partial frame is dropped
    /// and anything past `MAX_BATCH_FRAMES` frames is truncated.
    pub fn new(channels: u16, mut samples: Vec<f32>) -> Self {
        let channels = channels.max(1);
        let step = channels as usize;
        let frames = (samples.len() / step).min(MAX_BATCH_FRAMES);
        samples.truncate(frames * step);
        Self { channels, samples }
    }

    /// Split an arbitrarily long interleaved buffer into batches of at most
    /// `MAX_BATCH_FRAMES` frames each.
    pub fn split(channels: u16, samples: &[f32]) -> Vec<SampleBatch> {
        let step = channels.max(1) as usize;
        samples
            .chunks(MAX_BATCH_FRAMES * step)
            .filter(|chunk| chunk.len() >= step)
            .map(|chunk| SampleBatch::new(channels, chunk.to_vec()))
            .collect()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Iterate over frames, each a slice of one sample per channel.
    pub fn frames_iter(&self) -> impl Iterator<Item = &[f32]> {
        self.samples.chunks_exact(self.channels as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_partial_trailing_frame() {
        let batch = SampleBatch::new(2, vec![0.1, 0.2, 0.3]);
        assert_eq!(batch.frames(), 1);
        assert_eq!(batch.samples(), &[0.1, 0.2]);
    }

    #[test]
    fn truncates_to_max_frames() {
        let batch = SampleBatch::new(1, vec![0.0; MAX_BATCH_FRAMES + 10]);
        assert_eq!(batch.frames(), MAX_BATCH_FRAMES);
    }

    #[test]
    fn split_chunks_long_buffers() {
        let samples = vec![0.5f32; (MAX_BATCH_FRAMES * 2 + 100) * 2];
        let batches = SampleBatch::split(2, &samples);
        let frames: Vec<usize> = batches.iter().map(|b| b.frames()).collect();
        assert_eq!(frames, vec![MAX_BATCH_FRAMES, MAX_BATCH_FRAMES, 100]);
    }

    #[test]
    fn frames_iter_yields_one_slice_per_frame() {
        let batch = SampleBatch::new(2, vec![1.0, -1.0, 0.5, 0.25]);
        let frames: Vec<&[f32]> = batch.frames_iter().collect();
        assert_eq!(frames, vec![&[1.0, -1.0][..], &[0.5, 0.25][..]]);
    }
}
