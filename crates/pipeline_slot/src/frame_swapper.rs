use std::sync::Arc;

use crate::{ActivePair, PipelineSlot, RetireQueue, SlotReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDecisionReason {
    Applied,
    NoCandidate,
    /// Candidate generation is not newer than the active one.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapDecision {
    pub frame: u64,
    pub active_generation: u64,
    pub candidate_generation: Option<u64>,
    pub reason: SwapDecisionReason,
}

/// Applies at most one swap per frame, at the frame boundary, and tracks when retired pairs
/// may be released.
#[derive(Debug)]
pub struct FrameSwapper<Program, Texture> {
    slot: PipelineSlot<Program, Texture>,
    retired: RetireQueue<Arc<ActivePair<Program, Texture>>>,
    open_frame: Option<u64>,
    last_frame: Option<u64>,
}

impl<Program, Texture> FrameSwapper<Program, Texture> {
    pub fn new(slot: PipelineSlot<Program, Texture>) -> Self {
        Self {
            slot,
            retired: RetireQueue::new(),
            open_frame: None,
            last_frame: None,
        }
    }

    pub fn active(&self) -> Arc<ActivePair<Program, Texture>> {
        self.slot.active()
    }

    pub fn reader(&self) -> SlotReader<Program, Texture> {
        self.slot.reader()
    }

    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    pub fn begin_frame(
        &mut self,
        frame: u64,
        candidate: Option<ActivePair<Program, Texture>>,
    ) -> SwapDecision {
        if let Some(open) = self.open_frame {
            panic!("frame {frame} begun while frame {open} is still open");
        }
        if let Some(last) = self.last_frame.filter(|last| frame <= *last) {
            panic!("frame ids must increase: {frame} after {last}");
        }
        self.open_frame = Some(frame);
        self.last_frame = Some(frame);

        let active_generation = self.slot.generation();
        let Some(candidate) = candidate else {
            return SwapDecision {
                frame,
                active_generation,
                candidate_generation: None,
                reason: SwapDecisionReason::NoCandidate,
            };
        };

        let candidate_generation = candidate.generation;
        if candidate_generation <= active_generation {
            tracing::debug!(
                target: "pipeline_slot",
                frame,
                active_generation,
                candidate_generation,
                "stale swap candidate dropped"
            );
            return SwapDecision {
                frame,
                active_generation,
                candidate_generation: Some(candidate_generation),
                reason: SwapDecisionReason::Stale,
            };
        }

        let previous = self.slot.swap(candidate);
        tracing::debug!(
            target: "pipeline_slot",
            frame,
            from = previous.generation,
            to = candidate_generation,
            "pipeline pair swapped"
        );
        self.retired.retire(previous, frame);
        SwapDecision {
            frame,
            active_generation: candidate_generation,
            candidate_generation: Some(candidate_generation),
            reason: SwapDecisionReason::Applied,
        }
    }

    /// Close `frame` after its work was presented. Returns pairs that are now safe to drop.
    pub fn end_frame(&mut self, frame: u64) -> Vec<Arc<ActivePair<Program, Texture>>> {
        match self.open_frame.take() {
            Some(open) if open == frame => {}
            Some(open) => panic!("ending frame {frame} but frame {open} is open"),
            None => panic!("ending frame {frame} that was never begun"),
        }
        self.retired.release_presented(frame)
    }

    /// Drop the in-flight bookkeeping for a frame that was begun but never presented.
    pub fn abandon_frame(&mut self) {
        self.open_frame = None;
    }

    pub fn release_all(&mut self) -> Vec<Arc<ActivePair<Program, Texture>>> {
        self.retired.release_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(generation: u64) -> ActivePair<u64, u64> {
        ActivePair {
            generation,
            label: format!("gen-{generation}"),
            program: generation,
            texture: generation,
        }
    }

    fn swapper() -> FrameSwapper<u64, u64> {
        let (slot, _reader) = PipelineSlot::new(pair(0));
        FrameSwapper::new(slot)
    }

    #[test]
    fn newer_candidate_is_applied_and_old_pair_released_after_frame() {
        let mut swapper = swapper();
        let decision = swapper.begin_frame(1, Some(pair(4)));
        assert_eq!(decision.reason, SwapDecisionReason::Applied);
        assert_eq!(decision.active_generation, 4);
        assert_eq!(swapper.active().generation, 4);
        assert_eq!(swapper.retired_len(), 1);

        let released = swapper.end_frame(1);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].generation, 0);
        assert_eq!(swapper.retired_len(), 0);
    }

    #[test]
    fn stale_candidate_leaves_active_pair_untouched() {
        let mut swapper = swapper();
        swapper.begin_frame(1, Some(pair(5)));
        swapper.end_frame(1);

        let decision = swapper.begin_frame(2, Some(pair(3)));
        assert_eq!(decision.reason, SwapDecisionReason::Stale);
        assert_eq!(decision.candidate_generation, Some(3));
        assert_eq!(swapper.active().generation, 5);
        assert!(swapper.end_frame(2).is_empty());
    }

    #[test]
    fn frame_without_candidate_keeps_pair() {
        let mut swapper = swapper();
        let decision = swapper.begin_frame(1, None);
        assert_eq!(decision.reason, SwapDecisionReason::NoCandidate);
        assert_eq!(decision.active_generation, 0);
        assert!(swapper.end_frame(1).is_empty());
    }

    #[test]
    fn abandoned_frame_holds_retired_pair_until_a_later_frame_completes() {
        let mut swapper = swapper();
        swapper.begin_frame(1, Some(pair(1)));
        swapper.abandon_frame();
        assert_eq!(swapper.retired_len(), 1);

        swapper.begin_frame(2, None);
        assert_eq!(swapper.end_frame(2).len(), 1);
    }

    #[test]
    #[should_panic(expected = "frame ids must increase")]
    fn frame_ids_must_increase() {
        let mut swapper = swapper();
        swapper.begin_frame(3, None);
        swapper.end_frame(3);
        swapper.begin_frame(3, None);
    }
}
