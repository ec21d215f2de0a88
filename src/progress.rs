//! Progress reporting and cooperative cancellation.
//!
//! Long-running calls take a `&mut dyn ProgressSink`. Engines poll
//! [`ProgressSink::is_cancelled`] at fixed checkpoints (once per K-means
//! iteration, per merge, per inserted point) and return
//! [`Error::Cancelled`](crate::Error::Cancelled) when it is set.

use tracing::{info, warn};

use crate::error::{Error, Result};

/// Host-side receiver for progress and user-facing messages.
pub trait ProgressSink {
    /// Set the overall completion percentage (0-100).
    fn set_progress(&mut self, percent: u8);

    /// Show an informational message to the user.
    fn push_info(&mut self, message: &str);

    /// Show a warning. The run still produced a result.
    fn push_warning(&mut self, message: &str) {
        self.push_info(message);
    }

    /// Whether the host asked the run to stop.
    fn is_cancelled(&self) -> bool;
}

/// Sink that discards everything and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_progress(&mut self, _percent: u8) {}

    fn push_info(&mut self, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Sink that records what it receives. Useful for tests and batch hosts.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress {
    /// Every percentage received, in order.
    pub percents: Vec<u8>,
    /// Every message received, in order.
    pub messages: Vec<String>,
    /// Every warning received, in order.
    pub warnings: Vec<String>,
    /// Cancel once this many checkpoints have been polled.
    pub cancel_after: Option<usize>,
    polls: std::cell::Cell<usize>,
}

impl RecordingProgress {
    /// Recorder that never cancels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that cancels at the `n`-th poll (0 cancels immediately).
    pub fn cancel_after(n: usize) -> Self {
        Self {
            cancel_after: Some(n),
            ..Self::default()
        }
    }
}

impl ProgressSink for RecordingProgress {
    fn set_progress(&mut self, percent: u8) {
        self.percents.push(percent);
    }

    fn push_info(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }

    fn push_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn is_cancelled(&self) -> bool {
        let polled = self.polls.get();
        self.polls.set(polled + 1);
        self.cancel_after.is_some_and(|n| polled >= n)
    }
}

/// Monotonic wrapper around a sink.
///
/// Percentages never go backwards even when the engines report them from
/// independent phases.
pub(crate) struct Progress<'a> {
    sink: &'a mut dyn ProgressSink,
    current: u8,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, current: 0 }
    }

    pub(crate) fn set(&mut self, percent: usize) {
        let p = percent.min(100) as u8;
        if p > self.current {
            self.current = p;
            self.sink.set_progress(p);
        }
    }

    /// Report `done / total` of the span `[from, to]`.
    pub(crate) fn fraction(&mut self, done: usize, total: usize, from: usize, to: usize) {
        if total == 0 {
            self.set(to);
        } else {
            self.set(from + (to - from) * done.min(total) / total);
        }
    }

    pub(crate) fn info(&mut self, message: &str) {
        info!("{message}");
        self.sink.push_info(message);
    }

    pub(crate) fn warn(&mut self, message: &str) {
        warn!("{message}");
        self.sink.push_warning(message);
    }

    pub(crate) fn checkpoint(&self) -> Result<()> {
        if self.sink.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Sink that maps a phase's own 0-100 onto `[from, to]` of the host sink.
///
/// The orchestrator gives each phase a disjoint, increasing span, so the
/// host sees one non-decreasing percentage across the whole run.
pub(crate) struct Phase<'a> {
    sink: &'a mut dyn ProgressSink,
    from: u8,
    to: u8,
    last: Option<u8>,
}

impl<'a> Phase<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, from: u8, to: u8) -> Self {
        Self {
            sink,
            from,
            to: to.max(from),
            last: None,
        }
    }
}

impl ProgressSink for Phase<'_> {
    fn set_progress(&mut self, percent: u8) {
        let span = u32::from(self.to - self.from);
        let mapped = self.from + (span * u32::from(percent.min(100)) / 100) as u8;
        if self.last.map_or(true, |last| mapped > last) {
            self.last = Some(mapped);
            self.sink.set_progress(mapped);
        }
    }

    fn push_info(&mut self, message: &str) {
        self.sink.push_info(message);
    }

    fn push_warning(&mut self, message: &str) {
        self.sink.push_warning(message);
    }

    fn is_cancelled(&self) -> bool {
        self.sink.is_cancelled()
    }
}
