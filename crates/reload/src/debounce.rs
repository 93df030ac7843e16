//! Per-path debounce timers with explicit clock input.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEvent {
    due: Instant,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReload {
    pub path: PathBuf,
    pub generation: u64,
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, PendingEvent>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start or restart the timer for `path`. Returns the generation this event replaced.
    pub fn record(&mut self, path: PathBuf, at: Instant, generation: u64) -> Option<u64> {
        let event = PendingEvent {
            due: at + self.window,
            generation,
        };
        self.pending
            .insert(path, event)
            .map(|replaced| replaced.generation)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|event| event.due).min()
    }

    /// Remove and return every path whose window has elapsed, oldest generation first.
    pub fn take_due(&mut self, now: Instant) -> Vec<DueReload> {
        let mut due = Vec::new();
        self.pending.retain(|path, event| {
            if event.due > now {
                return true;
            }
            due.push(DueReload {
                path: path.clone(),
                generation: event.generation,
            });
            false
        });
        due.sort_by_key(|reload| reload.generation);
        due
    }

    pub fn deadline_for(&self, path: &Path) -> Option<Instant> {
        self.pending.get(path).map(|event| event.due)
    }

    /// Path whose timer elapses first.
    pub fn next_path(&self) -> Option<&Path> {
        self.pending
            .iter()
            .min_by_key(|(_, event)| (event.due, event.generation))
            .map(|(path, _)| path.as_path())
    }

    pub fn pending_generation(&self, path: &Path) -> Option<u64> {
        self.pending.get(path).map(|event| event.generation)
    }

    pub fn cancel(&mut self, path: &Path) -> Option<u64> {
        self.pending.remove(path).map(|event| event.generation)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
