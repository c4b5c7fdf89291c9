//! Progress stream and cooperative cancellation for generation runs.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Pipeline phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    PathSelection,
    DevicePreparation,
    IndexBuild,
    Clustering,
    HullGeneration,
    RenderHandoff,
    Finalize,
}

impl Phase {
    /// Overall fraction at which this phase begins.
    fn start_fraction(self) -> f64 {
        match self {
            Phase::Idle => 0.0,
            Phase::PathSelection => 0.0,
            Phase::DevicePreparation => 0.05,
            Phase::IndexBuild => 0.15,
            Phase::Clustering => 0.30,
            Phase::HullGeneration => 0.60,
            Phase::RenderHandoff => 0.85,
            Phase::Finalize => 0.95,
        }
    }

    /// Overall fraction at which this phase is complete.
    fn end_fraction(self) -> f64 {
        match self {
            Phase::Idle => 0.0,
            Phase::PathSelection => 0.05,
            Phase::DevicePreparation => 0.15,
            Phase::IndexBuild => 0.30,
            Phase::Clustering => 0.60,
            Phase::HullGeneration => 0.85,
            Phase::RenderHandoff => 0.95,
            Phase::Finalize => 1.0,
        }
    }
}

/// One observation on the single-consumer progress stream.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressUpdate {
    pub phase: Phase,
    pub fraction: f64,
}

impl ProgressUpdate {
    pub fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            fraction: 0.0,
        }
    }
}

/// Per-run reporter over a shared watch channel. Fractions are clamped so
/// observers only ever see non-decreasing values within a run; `reset`
/// starts a new baseline (cancellation or a fresh run).
pub struct ProgressReporter<'a> {
    tx: &'a watch::Sender<ProgressUpdate>,
    last: f64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(tx: &'a watch::Sender<ProgressUpdate>) -> Self {
        tx.send_replace(ProgressUpdate::idle());
        Self { tx, last: 0.0 }
    }

    /// Report partial completion of a phase, `within` in [0,1].
    pub fn report(&mut self, phase: Phase, within: f64) {
        let start = phase.start_fraction();
        let span = phase.end_fraction() - start;
        let fraction = (start + span * within.clamp(0.0, 1.0)).max(self.last);
        self.last = fraction;
        self.tx.send_replace(ProgressUpdate { phase, fraction });
    }

    pub fn complete(&mut self, phase: Phase) {
        self.report(phase, 1.0);
    }

    /// Drop back to the idle baseline, e.g. after cancellation.
    pub fn reset(&mut self) {
        self.last = 0.0;
        self.tx.send_replace(ProgressUpdate::idle());
    }
}

/// Shared cooperative cancellation flag, checked at phase boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Re-arm the flag for the next run.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let (tx, rx) = watch::channel(ProgressUpdate::idle());
        let mut reporter = ProgressReporter::new(&tx);
        reporter.complete(Phase::PathSelection);
        let after_selection = rx.borrow().fraction;
        reporter.report(Phase::Clustering, 0.5);
        let mid_clustering = rx.borrow().fraction;
        // A stale lower phase can no longer move the fraction backwards.
        reporter.report(Phase::DevicePreparation, 0.0);
        let stale = rx.borrow().fraction;
        reporter.complete(Phase::Finalize);

        assert!(after_selection > 0.0);
        assert!(mid_clustering > after_selection);
        assert!(stale >= mid_clustering);
        assert_eq!(rx.borrow().fraction, 1.0);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let (tx, rx) = watch::channel(ProgressUpdate::idle());
        let mut reporter = ProgressReporter::new(&tx);
        reporter.complete(Phase::Clustering);
        reporter.reset();
        assert_eq!(rx.borrow().fraction, 0.0);
        assert_eq!(rx.borrow().phase, Phase::Idle);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let shared = flag.clone();
        shared.cancel();
        assert!(flag.is_cancelled());
        flag.clear();
        assert!(!flag.is_cancelled());
    }
}
