use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::encode::sink::FrameSink;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ReelError, ReelResult};
use crate::plan::resample::ResamplePlan;
use crate::render::handle::FrameBuffer;

/// Frames that arrived ahead of their turn, keyed by source index.
#[derive(Debug, Default)]
pub struct PendingStore {
    frames: HashMap<FrameIndex, FrameBuffer>,
}

impl PendingStore {
    /// Store a frame; returns `false` if a frame with the same index is already held.
    pub fn insert(&mut self, frame: FrameBuffer) -> bool {
        match self.frames.entry(frame.index) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(frame);
                true
            }
        }
    }

    /// Remove and return the frame for `index`, if held.
    pub fn take(&mut self, index: FrameIndex) -> Option<FrameBuffer> {
        self.frames.remove(&index)
    }

    /// Number of frames currently held.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Reorders rendered frames into timeline order and expands them by their repeat count.
///
/// Arrivals may come in any order. Each accepted frame is parked in the [`PendingStore`] until
/// every contributing index before it has been released, then written `repeat` times to the sink
/// with consecutive output indices.
pub struct Sequencer<'p> {
    plan: &'p ResamplePlan,
    pending: PendingStore,
    next_expected: Option<FrameIndex>,
    frames_written: u64,
    frames_released: u64,
}

impl<'p> Sequencer<'p> {
    /// Start at the plan's first contributing index.
    pub fn new(plan: &'p ResamplePlan) -> Self {
        Self {
            plan,
            pending: PendingStore::default(),
            next_expected: plan.first_contributing(),
            frames_written: 0,
            frames_released: 0,
        }
    }

    /// Accept one rendered frame, releasing whatever became contiguous.
    pub fn accept(&mut self, frame: FrameBuffer, sink: &mut dyn FrameSink) -> ReelResult<()> {
        let index = frame.index;
        if self.plan.repeat(index) == 0 {
            return Err(ReelError::render(format!(
                "sequencer received non-contributing frame {index}"
            )));
        }
        if self.next_expected.is_none_or(|next| index < next) {
            return Err(ReelError::render(format!(
                "sequencer received frame {index} after it was released"
            )));
        }
        if !self.pending.insert(frame) {
            return Err(ReelError::render(format!(
                "sequencer received duplicate frame {index}"
            )));
        }

        while let Some(next) = self.next_expected {
            let Some(frame) = self.pending.take(next) else {
                break;
            };
            for _ in 0..self.plan.repeat(next) {
                sink.push_frame(self.frames_written, &frame)?;
                self.frames_written += 1;
            }
            self.frames_released += 1;
            self.next_expected = self.plan.next_contributing(next);
        }
        Ok(())
    }

    /// Whether every contributing frame has been released.
    pub fn is_complete(&self) -> bool {
        self.next_expected.is_none()
    }

    /// Index the sequencer is waiting for.
    pub fn next_expected(&self) -> Option<FrameIndex> {
        self.next_expected
    }

    /// Frames parked out of order.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Output frames pushed to the sink.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Distinct source frames released so far.
    pub fn frames_released(&self) -> u64 {
        self.frames_released
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/sequencer.rs"]
mod tests;
