use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::batch::StreamFormat;
use super::capture::{Capture, CaptureError, CaptureSource, SourceFactory, StartupGuard, StartupSignal};
use super::queue::{ready_threshold, AudioQueue};

/// Totals gathered over one producer run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub batches: usize,
    pub frames: usize,
    pub silent: usize,
    pub ready_signals: usize,
    /// The source ran out of data rather than being stopped.
    pub ended: bool,
}

pub struct ProducerHandle {
    handle: thread::JoinHandle<Result<ProducerStats, CaptureError>>,
}

impl ProducerHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<ProducerStats, CaptureError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(CaptureError::Read("capture thread panicked".into())))
    }
}

/// Start the capture producer on its own thread.
///
/// The source is built on that thread. Startup success is reported once the
/// source has opened and answered its first read; any failure before that point
/// is reported instead, so a waiting consumer is always released.
pub fn spawn_producer(
    factory: SourceFactory,
    queue: Arc<AudioQueue>,
    startup: Arc<StartupSignal>,
    shutdown: Arc<AtomicBool>,
    resolution_hz: f32,
) -> std::io::Result<ProducerHandle> {
    let handle = thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let guard = StartupGuard::new(&startup);

            let mut source = match factory() {
                Ok(source) => source,
                Err(err) => {
                    log::error!("{}", err);
                    guard.report(Err(err.clone()));
                    return Err(err);
                }
            };

            let format = source.format();
            let threshold = ready_threshold(format.sample_rate, resolution_hz);
            queue.set_threshold(threshold);
            log::info!(
                "Capturing from {} ({}Hz, {} ch, ready at {} frames)",
                source.describe(),
                format.sample_rate,
                format.channels,
                threshold
            );

            let result = pump(source.as_mut(), format, &queue, &guard, &shutdown);
            source.release();

            match &result {
                Ok(stats) => log::info!(
                    "Capture stopped: {} batches, {} frames, {} silent, {} ready signals",
                    stats.batches,
                    stats.frames,
                    stats.silent,
                    stats.ready_signals
                ),
                Err(err) => log::error!("Capture stopped: {}", err),
            }
            result
        })?;

    Ok(ProducerHandle { handle })
}

fn pump(
    source: &mut dyn CaptureSource,
    format: StreamFormat,
    queue: &AudioQueue,
    startup: &StartupGuard<'_>,
    shutdown: &AtomicBool,
) -> Result<ProducerStats, CaptureError> {
    let mut stats = ProducerStats::default();
    let mut started = false;

    while !shutdown.load(Ordering::Relaxed) {
        let capture = match source.next_batch() {
            Ok(capture) => capture,
            Err(err) => {
                if !started {
                    startup.report(Err(err.clone()));
                }
                return Err(err);
            }
        };

        if !started {
            startup.report(Ok(format));
            started = true;
        }

        match capture {
            Capture::Batch(batch) => {
                if batch.is_empty() {
                    continue;
                }
                stats.batches += 1;
                stats.frames += batch.frames();
                if queue.enqueue(batch) {
                    stats.ready_signals += 1;
                    log::trace!("Ready signal raised");
                }
            }
            Capture::Silent => stats.silent += 1,
            Capture::Pending => {}
            Capture::Ended => {
                log::info!("Capture source ended");
                stats.ended = true;
                break;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::batch::SampleBatch;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const FORMAT: StreamFormat = StreamFormat {
        sample_rate: 44100,
        channels: 2,
    };

    struct ScriptedSource {
        script: VecDeque<Result<Capture, CaptureError>>,
        released: Arc<Mutex<bool>>,
    }

    impl CaptureSource for ScriptedSource {
        fn format(&self) -> StreamFormat {
            FORMAT
        }

        fn next_batch(&mut self) -> Result<Capture, CaptureError> {
            self.script.pop_front().unwrap_or(Ok(Capture::Ended))
        }

        fn release(&mut self) {
            *self.released.lock().unwrap() = true;
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn scripted(
        script: Vec<Result<Capture, CaptureError>>,
    ) -> (SourceFactory, Arc<Mutex<bool>>) {
        let released = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&released);
        let factory: SourceFactory = Box::new(move || {
            Ok(Box::new(ScriptedSource {
                script: script.into(),
                released: flag,
            }) as Box<dyn CaptureSource>)
        });
        (factory, released)
    }

    fn stereo(frames: usize) -> Capture {
        Capture::Batch(SampleBatch::new(2, vec![0.25; frames * 2]))
    }

    fn run(factory: SourceFactory) -> (Arc<AudioQueue>, Arc<StartupSignal>, Result<ProducerStats, CaptureError>) {
        let queue = Arc::new(AudioQueue::new(1));
        let startup = Arc::new(StartupSignal::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_producer(
            factory,
            Arc::clone(&queue),
            Arc::clone(&startup),
            shutdown,
            20.0,
        )
        .unwrap();
        let result = handle.join();
        (queue, startup, result)
    }

    #[test]
    fn forwards_batches_and_skips_silence() {
        let (factory, released) = scripted(vec![
            Ok(stereo(1024)),
            Ok(Capture::Silent),
            Ok(Capture::Pending),
            Ok(stereo(1024)),
            Ok(stereo(512)),
        ]);
        let (queue, startup, result) = run(factory);

        let stats = result.unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.frames, 2560);
        assert_eq!(stats.silent, 1);
        assert_eq!(stats.ready_signals, 1);
        assert!(stats.ended);
        assert_eq!(startup.wait(), Ok(FORMAT));
        assert!(*released.lock().unwrap());

        assert_eq!(queue.threshold(), 2205);
        assert!(queue.is_ready());
        assert_eq!(queue.drain_all().frames, 2560);
    }

    #[test]
    fn init_failure_releases_waiting_consumer() {
        let factory: SourceFactory =
            Box::new(|| Err(CaptureError::Init("device unavailable".into())));
        let (_, startup, result) = run(factory);
        assert_eq!(result, Err(CaptureError::Init("device unavailable".into())));
        assert_eq!(startup.wait(), Err(CaptureError::Init("device unavailable".into())));
    }

    #[test]
    fn first_read_failure_is_reported_at_startup() {
        let (factory, released) = scripted(vec![Err(CaptureError::Read("unplugged".into()))]);
        let (_, startup, result) = run(factory);
        assert_eq!(result, Err(CaptureError::Read("unplugged".into())));
        assert_eq!(startup.wait(), Err(CaptureError::Read("unplugged".into())));
        assert!(*released.lock().unwrap());
    }

    #[test]
    fn later_read_failure_keeps_startup_success() {
        let (factory, _) = scripted(vec![
            Ok(stereo(100)),
            Err(CaptureError::Read("unplugged".into())),
        ]);
        let (queue, startup, result) = run(factory);
        assert!(result.is_err());
        assert_eq!(startup.wait(), Ok(FORMAT));
        assert_eq!(queue.frames_queued(), 100);
    }

    #[test]
    fn stops_on_shutdown() {
        struct Idle;

        impl CaptureSource for Idle {
            fn format(&self) -> StreamFormat {
                FORMAT
            }

            fn next_batch(&mut self) -> Result<Capture, CaptureError> {
                std::thread::sleep(Duration::from_millis(1));
                Ok(Capture::Pending)
            }

            fn describe(&self) -> String {
                "idle".into()
            }
        }

        let factory: SourceFactory = Box::new(|| Ok(Box::new(Idle) as Box<dyn CaptureSource>));
        let queue = Arc::new(AudioQueue::new(1));
        let startup = Arc::new(StartupSignal::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_producer(
            factory,
            queue,
            Arc::clone(&startup),
            Arc::clone(&shutdown),
            20.0,
        )
        .unwrap();

        assert_eq!(startup.wait(), Ok(FORMAT));
        std::thread::sleep(Duration::from_millis(5));
        shutdown.store(true, Ordering::Relaxed);
        let stats = handle.join().unwrap();
        assert!(!stats.ended);
    }
}
