//! Status aggregation and fan-out.
//!
//! One [`StatusAggregator`] is constructed at startup and shared by
//! `Arc`; the pipeline and directory monitor publish into it, observers
//! read snapshots or subscribe to the broadcast stream. Progress is
//! transient and never persisted.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Discovery,
    Metadata,
    Categorization,
    Hashing,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexPhase::Discovery => write!(f, "Discovery"),
            IndexPhase::Metadata => write!(f, "Metadata"),
            IndexPhase::Categorization => write!(f, "Categorization"),
            IndexPhase::Hashing => write!(f, "Hashing"),
        }
    }
}

/// Overall run state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Progress of one phase within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseProgress {
    pub phase: IndexPhase,
    pub processed: u64,
    /// Total work items when known up front; discovery reports `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub failed: u64,
    /// Most recently handled file, for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PhaseProgress {
    pub fn new(phase: IndexPhase, processed: u64, total: Option<u64>, failed: u64) -> Self {
        Self {
            phase,
            processed,
            total,
            failed,
            current_item: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: Option<String>) -> Self {
        self.current_item = item;
        self
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub state: Option<RunState>,
    pub files_scanned: u64,
    pub files_added: u64,
    pub files_removed: u64,
    pub metadata_extracted: u64,
    pub categorized: u64,
    pub hashed: u64,
    pub failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<IndexPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<PhaseProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunSummary>,
    /// Whether the directory monitor is watching the scan roots.
    #[serde(default)]
    pub monitor_active: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            current_phase: None,
            progress: None,
            last_run: None,
            monitor_active: false,
        }
    }
}

const CHANNEL_CAPACITY: usize = 64;

pub struct StatusAggregator {
    snapshot: RwLock<StatusSnapshot>,
    sender: broadcast::Sender<StatusSnapshot>,
}

impl StatusAggregator {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            snapshot: RwLock::new(StatusSnapshot::default()),
            sender,
        }
    }

    /// Current state, cloned out from under the lock.
    pub fn snapshot(&self) -> StatusSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            // A poisoned lock still holds a coherent snapshot.
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Subscribes to snapshot updates. Slow receivers drop old updates,
    /// never block the publisher.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    pub fn publish_phase(&self, progress: PhaseProgress) {
        self.update(|snapshot| {
            snapshot.state = RunState::Running;
            snapshot.current_phase = Some(progress.phase);
            snapshot.progress = Some(progress.clone());
        });
    }

    pub fn publish_run_started(&self) {
        self.update(|snapshot| {
            snapshot.state = RunState::Running;
            snapshot.current_phase = None;
            snapshot.progress = None;
        });
    }

    pub fn publish_run_finished(&self, summary: RunSummary) {
        self.update(|snapshot| {
            snapshot.state = summary.state.unwrap_or(RunState::Completed);
            snapshot.current_phase = None;
            snapshot.progress = None;
            snapshot.last_run = Some(summary.clone());
        });
    }

    pub fn set_monitor_active(&self, active: bool) {
        self.update(|snapshot| snapshot.monitor_active = active);
    }

    fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut StatusSnapshot),
    {
        let snapshot = {
            let mut guard = match self.snapshot.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            apply(&mut guard);
            guard.clone()
        };
        // No receivers is fine; send only fails then.
        let _ = self.sender.send(snapshot);
    }
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot_is_idle() {
        let aggregator = StatusAggregator::new();
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.state, RunState::Idle);
        assert!(snapshot.current_phase.is_none());
        assert!(snapshot.last_run.is_none());
    }

    #[test]
    fn test_phase_progress_updates_snapshot() {
        let aggregator = StatusAggregator::new();
        aggregator.publish_phase(PhaseProgress::new(IndexPhase::Hashing, 10, Some(40), 1));

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.state, RunState::Running);
        assert_eq!(snapshot.current_phase, Some(IndexPhase::Hashing));
        assert_eq!(snapshot.progress.unwrap().processed, 10);
    }

    #[test]
    fn test_run_finished_records_summary() {
        let aggregator = StatusAggregator::new();
        aggregator.publish_run_started();
        aggregator.publish_run_finished(RunSummary {
            state: Some(RunState::Cancelled),
            files_scanned: 5,
            ..RunSummary::default()
        });

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.state, RunState::Cancelled);
        assert!(snapshot.progress.is_none());
        assert_eq!(snapshot.last_run.unwrap().files_scanned, 5);
    }

    #[test]
    fn test_subscribers_receive_updates() {
        let aggregator = StatusAggregator::new();
        let mut receiver = aggregator.subscribe();

        aggregator.publish_phase(PhaseProgress::new(IndexPhase::Discovery, 100, None, 0));

        let snapshot = receiver.try_recv().unwrap();
        assert_eq!(snapshot.current_phase, Some(IndexPhase::Discovery));
    }

    #[test]
    fn test_current_item_carried_and_serialized() {
        let aggregator = StatusAggregator::new();
        aggregator.publish_phase(
            PhaseProgress::new(IndexPhase::Hashing, 3, Some(9), 0)
                .with_item(Some("album/IMG_0042.jpg".to_string())),
        );

        let progress = aggregator.snapshot().progress.unwrap();
        assert_eq!(progress.current_item.as_deref(), Some("album/IMG_0042.jpg"));

        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"currentItem\":\"album/IMG_0042.jpg\""));
    }

    #[test]
    fn test_monitor_flag_survives_run_updates() {
        let aggregator = StatusAggregator::new();
        aggregator.set_monitor_active(true);
        aggregator.publish_run_started();
        aggregator.publish_run_finished(RunSummary::default());

        assert!(aggregator.snapshot().monitor_active);
        aggregator.set_monitor_active(false);
        assert!(!aggregator.snapshot().monitor_active);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = StatusSnapshot {
            state: RunState::Running,
            current_phase: Some(IndexPhase::Metadata),
            ..StatusSnapshot::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"currentPhase\":\"metadata\""));
        assert!(json.contains("\"state\":\"running\""));
    }
}
