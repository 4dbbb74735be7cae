use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::status::{PhaseProgress, RunSummary, StatusAggregator};

/// Receives progress during a pipeline run.
pub trait ProgressSink: Send + Sync {
    fn run_started(&self) {}
    fn run_finished(&self, _summary: &RunSummary) {}
    /// Mid-phase update; implementations may drop these.
    fn update(&self, progress: PhaseProgress);
    /// Final update of a phase; always delivered.
    fn finish_phase(&self, progress: PhaseProgress);
}

/// No-op sink for unit tests.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn update(&self, _progress: PhaseProgress) {}
    fn finish_phase(&self, _progress: PhaseProgress) {}
}

const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Publishes progress into the shared [`StatusAggregator`], forwarding at
/// most one mid-phase update per second. The first update of a phase and
/// every `finish_phase` pass through untouched.
pub struct ThrottledStatusSink {
    status: Arc<StatusAggregator>,
    last_sent: Mutex<Option<(crate::status::IndexPhase, Instant)>>,
}

impl ThrottledStatusSink {
    pub fn new(status: Arc<StatusAggregator>) -> Self {
        Self {
            status,
            last_sent: Mutex::new(None),
        }
    }
}

impl ProgressSink for ThrottledStatusSink {
    fn run_started(&self) {
        let mut guard = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
        drop(guard);

        self.status.publish_run_started();
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.status.publish_run_finished(summary.clone());
    }

    fn update(&self, progress: PhaseProgress) {
        let mut guard = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((phase, at)) = *guard {
            if phase == progress.phase && at.elapsed() < MIN_UPDATE_INTERVAL {
                return;
            }
        }
        *guard = Some((progress.phase, Instant::now()));
        drop(guard);

        self.status.publish_phase(progress);
    }

    fn finish_phase(&self, progress: PhaseProgress) {
        let mut guard = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some((progress.phase, Instant::now()));
        drop(guard);

        self.status.publish_phase(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::IndexPhase;

    fn progress(phase: IndexPhase, processed: u64) -> PhaseProgress {
        PhaseProgress::new(phase, processed, None, 0)
    }

    #[test]
    fn test_rapid_updates_are_throttled() {
        let status = Arc::new(StatusAggregator::new());
        let mut receiver = status.subscribe();
        let sink = ThrottledStatusSink::new(Arc::clone(&status));

        sink.update(progress(IndexPhase::Hashing, 1));
        sink.update(progress(IndexPhase::Hashing, 2));
        sink.update(progress(IndexPhase::Hashing, 3));

        // Only the first of the burst goes out.
        assert_eq!(
            receiver.try_recv().unwrap().progress.unwrap().processed,
            1
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_phase_change_bypasses_throttle() {
        let status = Arc::new(StatusAggregator::new());
        let mut receiver = status.subscribe();
        let sink = ThrottledStatusSink::new(Arc::clone(&status));

        sink.update(progress(IndexPhase::Metadata, 1));
        sink.update(progress(IndexPhase::Hashing, 1));

        assert_eq!(
            receiver.try_recv().unwrap().current_phase,
            Some(IndexPhase::Metadata)
        );
        assert_eq!(
            receiver.try_recv().unwrap().current_phase,
            Some(IndexPhase::Hashing)
        );
    }

    #[test]
    fn test_finish_phase_always_delivered() {
        let status = Arc::new(StatusAggregator::new());
        let mut receiver = status.subscribe();
        let sink = ThrottledStatusSink::new(Arc::clone(&status));

        sink.update(progress(IndexPhase::Hashing, 1));
        sink.update(progress(IndexPhase::Hashing, 2));
        sink.finish_phase(progress(IndexPhase::Hashing, 10));

        assert_eq!(
            receiver.try_recv().unwrap().progress.unwrap().processed,
            1
        );
        assert_eq!(
            receiver.try_recv().unwrap().progress.unwrap().processed,
            10
        );
    }
}
