//! Shared, lock-free view of the reload state for whoever displays it.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use reload_protocol::{BrickSummary, ReloadOutcome, ReloadPhase, ReloadStatus};

#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    current: Arc<ArcSwap<ReloadStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<ReloadStatus> {
        self.current.load_full()
    }

    pub fn update(&self, apply: impl Fn(&mut ReloadStatus)) {
        self.current.rcu(|current| {
            let mut next = ReloadStatus::clone(current);
            apply(&mut next);
            next
        });
    }

    pub fn set_phase(&self, phase: ReloadPhase, path: Option<&Path>) {
        self.update(|status| {
            status.phase = phase;
            if let Some(path) = path {
                status.last_path = Some(path.to_path_buf());
            }
        });
    }

    pub fn record_event(&self) {
        self.update(|status| status.counters.events += 1);
    }

    pub fn record_attempt(&self) {
        self.update(|status| status.counters.attempts += 1);
    }

    pub fn record_brick(&self, summary: &BrickSummary) {
        self.update(|status| status.last_brick = Some(summary.clone()));
    }

    pub fn record_outcome(&self, outcome: &ReloadOutcome) {
        self.update(|status| {
            match outcome {
                ReloadOutcome::Submitted { .. } => status.counters.submitted += 1,
                ReloadOutcome::Failed { .. } => status.counters.failed += 1,
                ReloadOutcome::Superseded { .. } => status.counters.superseded += 1,
                ReloadOutcome::Unchanged => status.counters.unchanged += 1,
            }
            status.last_outcome = Some(outcome.clone());
        });
    }

    /// Called by the render loop once a generation is presented.
    pub fn mark_active(&self, generation: u64) {
        self.update(|status| status.active_generation = Some(generation));
    }
}
