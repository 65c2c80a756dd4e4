//! Progress reporting for long-running loads.
//!
//! Reports are fire-and-forget: a reporter returns nothing and cannot fail,
//! so progress never changes the outcome of an operation.

/// Receives `(percent, message)` milestones. `percent` is in `0..=100`.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, message: &str) {
        self(percent.min(100), message)
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _percent: u8, _message: &str) {}
}

/// Percentage `start + span * done / total`, clamped to 100.
pub fn scaled(start: u8, span: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return start.min(100);
    }
    let step = (span as usize * done.min(total)) / total;
    (start as usize + step).min(100) as u8
}
