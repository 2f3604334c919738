use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Scoped timer for pipeline stages. Traces start/end and optionally adds the
/// elapsed time to a profiler slot when dropped.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
    sink: Option<&'a mut Duration>,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
            sink: None,
        }
    }

    /// Same as [`ScopedTimer::new`] but accumulates into `sink`.
    pub fn recording(label: &'a str, sink: &'a mut Duration) -> Self {
        let mut timer = Self::new(label);
        timer.sink = Some(sink);
        timer
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if let Some(sink) = self.sink.as_deref_mut() {
            *sink += elapsed;
        }
        if log_enabled!(Level::Trace) {
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Warns when a simulation step takes longer than `budget_ms`.
pub fn warn_if_step_budget_exceeded(duration: Duration, budget_ms: f32) {
    if duration.as_secs_f32() * 1000.0 > budget_ms {
        warn!(
            "Physics step exceeded budget: {:.2} ms > {:.2} ms",
            duration.as_secs_f32() * 1000.0,
            budget_ms
        );
    }
}
