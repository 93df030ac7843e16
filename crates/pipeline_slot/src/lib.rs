//! The single active program/texture pair and the rules for replacing it.
//!
//! Readers on any thread load the current pair without blocking. Only the owner of the
//! [`PipelineSlot`] can swap, and retired pairs are held until the frame that first presented
//! their replacement has completed.

use std::sync::Arc;

use arc_swap::ArcSwap;

mod frame_swapper;
mod retire;

pub use frame_swapper::{FrameSwapper, SwapDecision, SwapDecisionReason};
pub use retire::RetireQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePair<Program, Texture> {
    pub generation: u64,
    pub label: String,
    pub program: Program,
    pub texture: Texture,
}

/// Write side of the slot. Not `Clone`: there is exactly one mutator.
#[derive(Debug)]
pub struct PipelineSlot<Program, Texture> {
    current: Arc<ArcSwap<ActivePair<Program, Texture>>>,
}

#[derive(Debug)]
pub struct SlotReader<Program, Texture> {
    current: Arc<ArcSwap<ActivePair<Program, Texture>>>,
}

impl<Program, Texture> Clone for SlotReader<Program, Texture> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<Program, Texture> PipelineSlot<Program, Texture> {
    pub fn new(initial: ActivePair<Program, Texture>) -> (Self, SlotReader<Program, Texture>) {
        let current = Arc::new(ArcSwap::from_pointee(initial));
        let reader = SlotReader {
            current: Arc::clone(&current),
        };
        (Self { current }, reader)
    }

    /// Install `next` and hand back the pair it replaced. Readers see either the old pair
    /// or the new one, never a mix.
    pub fn swap(
        &mut self,
        next: ActivePair<Program, Texture>,
    ) -> Arc<ActivePair<Program, Texture>> {
        self.current.swap(Arc::new(next))
    }

    pub fn active(&self) -> Arc<ActivePair<Program, Texture>> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    pub fn reader(&self) -> SlotReader<Program, Texture> {
        SlotReader {
            current: Arc::clone(&self.current),
        }
    }
}

impl<Program, Texture> SlotReader<Program, Texture> {
    pub fn read(&self) -> Arc<ActivePair<Program, Texture>> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn pair(generation: u64) -> ActivePair<u64, u64> {
        ActivePair {
            generation,
            label: format!("gen-{generation}"),
            program: generation,
            texture: generation,
        }
    }

    #[test]
    fn swap_returns_previous_pair() {
        let (mut slot, reader) = PipelineSlot::new(pair(0));
        let old = slot.swap(pair(1));
        assert_eq!(old.generation, 0);
        assert_eq!(reader.read().generation, 1);
        assert_eq!(slot.generation(), 1);
    }

    #[test]
    fn reader_keeps_old_pair_alive_after_swap() {
        let (mut slot, reader) = PipelineSlot::new(pair(0));
        let held = reader.read();
        let old = slot.swap(pair(1));
        drop(old);
        assert_eq!(held.label, "gen-0");
        assert_eq!(reader.generation(), 1);
    }

    #[test]
    fn concurrent_readers_never_observe_a_torn_pair() {
        let (mut slot, reader) = PipelineSlot::new(pair(0));
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let reader = reader.clone();
                let done = &done;
                scope.spawn(move || {
                    let mut last_seen = 0;
                    while !done.load(Ordering::Acquire) {
                        let active = reader.read();
                        assert_eq!(active.program, active.texture);
                        assert_eq!(active.program, active.generation);
                        assert!(active.generation >= last_seen);
                        last_seen = active.generation;
                    }
                });
            }

            for generation in 1..=2_000 {
                let previous = slot.swap(pair(generation));
                assert_eq!(previous.generation, generation - 1);
            }
            done.store(true, Ordering::Release);
        });

        assert_eq!(reader.read().generation, 2_000);
    }
}
