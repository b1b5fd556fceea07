//! Level-bucketed propagation scheduler.
//!
//! Alerted cells queue in the bucket for their level; `react` drains the
//! buckets bottom-up, re-evaluating each cell and publishing on change.
//! Subscribers sit strictly above their publishers, so a publish lands in
//! a bucket that has not drained yet. A side effect may re-alert a cell at
//! a lower level; the drain then returns to that bucket, and the dependent
//! cells re-run.
//!
//! Each cell carries a scheduled flag so repeated alerts within one drain
//! insert it once.

use std::collections::VecDeque;

use crate::cell::CellId;
use crate::engine::Engine;

/// Bucket count; a cell's level is clamped below this.
pub(crate) const MAX_LEVELS: usize = 128;

pub(crate) struct Sched {
    queues: Vec<VecDeque<CellId>>,
    /// Lowest bucket that may hold an entry.
    low: usize,
    pending: usize,
}

impl Default for Sched {
    fn default() -> Self {
        Sched {
            queues: (0..MAX_LEVELS).map(|_| VecDeque::new()).collect(),
            low: MAX_LEVELS,
            pending: 0,
        }
    }
}

impl Sched {
    pub(crate) fn push(&mut self, level: usize, id: CellId) {
        self.queues[level].push_back(id);
        self.pending += 1;
        if level < self.low {
            self.low = level;
        }
    }

    /// Pop the entry with the lowest level, or None when quiescent.
    pub(crate) fn pop(&mut self) -> Option<CellId> {
        if self.pending == 0 {
            self.low = MAX_LEVELS;
            return None;
        }
        while self.low < MAX_LEVELS {
            if let Some(id) = self.queues[self.low].pop_front() {
                self.pending -= 1;
                return Some(id);
            }
            self.low += 1;
        }
        None
    }
}

impl Engine {
    /// Drain the evaluation vector to quiescence. Each cell is
    /// re-evaluated against its operands' current values; on change the
    /// new value is written and published, alerting subscribers into
    /// higher buckets. Cells disabled while queued are skipped.
    pub(crate) fn react_drain(&mut self) {
        while let Some(id) = self.sched.pop() {
            self.slot_mut(id).scheduled = false;
            if self.slot(id).value.is_disabled() {
                continue;
            }
            let value = self.eval_cell(id);
            if !value.same(&self.slot(id).value) {
                self.slot_mut(id).value = value;
                self.publish(id);
            }
        }
    }
}
