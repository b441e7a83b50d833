use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::batch::SampleBatch;

/// Frames needed for a frequency resolution of `resolution_hz` at `sample_rate`.
pub fn ready_threshold(sample_rate: u32, resolution_hz: f32) -> usize {
    (sample_rate as f32 / resolution_hz).ceil().max(1.0) as usize
}

/// Everything taken out of the queue by one `drain_all` call.
#[derive(Debug, Default)]
pub struct Drained {
    pub batches: Vec<SampleBatch>,
    pub frames: usize,
}

impl Drained {
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

#[derive(Debug)]
struct QueueState {
    batches: VecDeque<SampleBatch>,
    frames_queued: usize,
    threshold: usize,
    ready: bool,
}

/// Hand-off point between the capture producer and the render loop.
///
/// The batch list, the queued-frame counter and the ready flag live under one
/// mutex so the producer's enqueue + increment and the consumer's drain + reset
/// are each observed as a single step.
#[derive(Debug)]
pub struct AudioQueue {
    state: Mutex<QueueState>,
    ready_cv: Condvar,
}

impl AudioQueue {
    pub fn new(threshold: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                batches: VecDeque::new(),
                frames_queued: 0,
                threshold: threshold.max(1),
                ready: false,
            }),
            ready_cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[allow(dead_code)]
    pub fn threshold(&self) -> usize {
        self.lock().threshold
    }

    /// Replace the ready threshold, e.g. once the source reports its real format.
    pub fn set_threshold(&self, threshold: usize) {
        self.lock().threshold = threshold.max(1);
    }

    /// Append a batch. Returns true when this enqueue raised the ready signal,
    /// which only happens when the counter crosses the threshold from below.
    pub fn enqueue(&self, batch: SampleBatch) -> bool {
        let frames = batch.frames();
        let mut state = self.lock();
        let before = state.frames_queued;
        state.batches.push_back(batch);
        state.frames_queued += frames;

        let crossed = before < state.threshold && state.frames_queued >= state.threshold;
        if crossed && !state.ready {
            state.ready = true;
            drop(state);
            self.ready_cv.notify_all();
            return true;
        }
        false
    }

    /// Take every queued batch in FIFO order along with the frame counter, resetting
    /// both the counter and the ready signal.
    pub fn drain_all(&self) -> Drained {
        let mut state = self.lock();
        let batches: Vec<SampleBatch> = state.batches.drain(..).collect();
        let frames = std::mem::take(&mut state.frames_queued);
        state.ready = false;
        Drained { batches, frames }
    }

    #[allow(dead_code)]
    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    #[allow(dead_code)]
    pub fn frames_queued(&self) -> usize {
        self.lock().frames_queued
    }

    /// Block until the ready signal is raised or `timeout` elapses. The mutex is
    /// released while waiting.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .ready_cv
            .wait_timeout_while(guard, timeout, |state| !state.ready)
            .unwrap_or_else(PoisonError::into_inner);
        guard.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn batch(frames: usize, marker: f32) -> SampleBatch {
        SampleBatch::new(1, vec![marker; frames])
    }

    #[test]
    fn threshold_for_twenty_hz_at_44100() {
        assert_eq!(ready_threshold(44100, 20.0), 2205);
        assert_eq!(ready_threshold(48000, 20.0), 2400);
    }

    #[test]
    fn drain_is_fifo_and_counts_frames() {
        let queue = AudioQueue::new(10_000);
        queue.enqueue(batch(100, 1.0));
        queue.enqueue(batch(250, 2.0));
        queue.enqueue(batch(7, 3.0));
        assert_eq!(queue.frames_queued(), 357);

        let drained = queue.drain_all();
        let markers: Vec<f32> = drained.batches.iter().map(|b| b.samples()[0]).collect();
        assert_eq!(markers, vec![1.0, 2.0, 3.0]);
        assert_eq!(drained.frames, 357);
        assert_eq!(queue.frames_queued(), 0);
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn ready_fires_once_per_crossing() {
        let queue = AudioQueue::new(2205);
        assert!(!queue.enqueue(batch(1024, 0.0)));
        assert!(!queue.enqueue(batch(1024, 0.0)));
        assert!(queue.enqueue(batch(1024, 0.0)));
        assert!(queue.is_ready());
        // Still above threshold: no repeat signal.
        assert!(!queue.enqueue(batch(1024, 0.0)));

        queue.drain_all();
        assert!(!queue.is_ready());
        assert!(!queue.enqueue(batch(1024, 0.0)));
        assert!(!queue.enqueue(batch(1024, 0.0)));
        assert!(queue.enqueue(batch(1024, 0.0)));
    }

    #[test]
    fn single_batch_at_threshold_fires() {
        let queue = AudioQueue::new(512);
        assert!(queue.enqueue(batch(512, 0.0)));
    }

    #[test]
    fn non_empty_queue_below_threshold_is_not_ready() {
        let queue = AudioQueue::new(2205);
        queue.enqueue(batch(1000, 0.0));
        assert!(!queue.is_ready());
        assert!(!queue.wait_ready(Duration::from_millis(5)));
        assert_eq!(queue.frames_queued(), 1000);
    }

    #[test]
    fn wait_ready_times_out() {
        let queue = AudioQueue::new(64);
        let start = Instant::now();
        assert!(!queue.wait_ready(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_ready_wakes_on_producer() {
        let queue = Arc::new(AudioQueue::new(256));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.enqueue(batch(256, 0.5));
            })
        };
        assert!(queue.wait_ready(Duration::from_secs(5)));
        producer.join().unwrap();
        assert_eq!(queue.drain_all().frames, 256);
    }

    #[test]
    fn concurrent_enqueue_keeps_counter_consistent() {
        let queue = Arc::new(AudioQueue::new(usize::MAX));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for _ in 0..200 {
                        queue.enqueue(batch(3, 0.0));
                    }
                })
            })
            .collect();

        let mut total = 0;
        let mut batches = 0;
        while handles.iter().any(|h| !h.is_finished()) {
            let drained = queue.drain_all();
            assert_eq!(drained.frames, drained.batches.len() * 3);
            total += drained.frames;
            batches += drained.batches.len();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let drained = queue.drain_all();
        total += drained.frames;
        batches += drained.batches.len();
        assert_eq!(batches, 800);
        assert_eq!(total, 2400);
    }
}
