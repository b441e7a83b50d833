use std::sync::{Condvar, Mutex, PoisonError};
use thiserror::Error;

use super::batch::{SampleBatch, StreamFormat};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum CaptureError {
    /// The device or file could not be opened or configured.
    #[error("failed to initialise capture source: {0}")]
    Init(String),
    /// A read failed after the source was opened.
    #[error("capture read failed: {0}")]
    Read(String),
    /// The producer went away without ever reporting its startup outcome.
    #[error("capture producer exited before reporting startup")]
    Abandoned,
}

/// Outcome of one request to a capture source.
#[derive(Debug)]
pub enum Capture {
    Batch(SampleBatch),
    /// The source flagged this period as silence.
    Silent,
    /// Nothing available yet.
    Pending,
    /// A finite source has nothing more to deliver.
    Ended,
}

/// An external audio feed the producer pulls from.
pub trait CaptureSource {
    fn format(&self) -> StreamFormat;

    /// Fetch the next batch. May block for the source's own delivery cadence but
    /// should return `Pending` within a bounded time so shutdown is observed.
    fn next_batch(&mut self) -> Result<Capture, CaptureError>;

    /// Release device handles or other resources. Called once when the producer stops.
    fn release(&mut self) {}

    fn describe(&self) -> String;
}

/// Builds a source on the producer thread, so sources holding non-`Send`
/// device handles never need to cross threads.
pub type SourceFactory =
    Box<dyn FnOnce() -> Result<Box<dyn CaptureSource>, CaptureError> + Send + 'static>;

/// One-shot, result-bearing startup signal between producer and consumer.
#[derive(Debug, Default)]
pub struct StartupSignal {
    outcome: Mutex<Option<Result<StreamFormat, CaptureError>>>,
    cv: Condvar,
}

impl StartupSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome. Only the first report is kept.
    pub fn report(&self, outcome: Result<StreamFormat, CaptureError>) -> bool {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.cv.notify_all();
        true
    }

    /// Block until the producer reports success or failure.
    pub fn wait(&self) -> Result<StreamFormat, CaptureError> {
        let guard = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        let guard = self
            .cv
            .wait_while(guard, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        (*guard).clone().unwrap_or(Err(CaptureError::Abandoned))
    }
}

/// Reports `Abandoned` on drop unless an outcome was already reported, covering
/// early returns and panics on the producer thread.
pub struct StartupGuard<'a> {
    signal: &'a StartupSignal,
}

impl<'a> StartupGuard<'a> {
    pub fn new(signal: &'a StartupSignal) -> Self {
        Self { signal }
    }

    pub fn report(&self, outcome: Result<StreamFormat, CaptureError>) {
        self.signal.report(outcome);
    }
}

impl Drop for StartupGuard<'_> {
    fn drop(&mut self) {
        if self.signal.report(Err(CaptureError::Abandoned)) {
            log::warn!("Capture producer exited before reporting startup");
        }
    }
}
