//! Timer queue and schedule recurrences.
//!
//! The clock holds at most one pending deadline per cell, ordered by
//! absolute epoch second. Advancing the clock services deadlines one at a
//! time: each fires its cell's alert and runs propagation to quiescence
//! before the next deadline is examined.
//!
//! Time is 64-bit Unix epoch seconds throughout, UTC.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::bfi::Bfi;
use crate::cell::{CellId, CellKind};
use crate::engine::Engine;
use crate::rule::Firing;
use crate::value::{Truth, Value};

const DAY: i64 = 86_400;
const WEEK: i64 = 7 * DAY;
/// The epoch began on a Thursday; shift so weeks index from Sunday.
const EPOCH_DOW: i64 = 4;

/// When a schedule is true, expressed either as a fixed interval set or as
/// a calendar recurrence.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Absolute epoch-second intervals.
    Fixed(Bfi),
    /// Every day between two seconds-of-day, `[from, to)`. A `from`
    /// greater than `to` wraps past midnight.
    Daily { from: u32, to: u32 },
    /// One weekday window per week; day 0 is Sunday.
    Weekly { day: u8, from: u32, to: u32 },
    /// A plain duration, used by delay conditions.
    Interval(i64),
}

impl Schedule {
    /// Convenience constructor for a daily hour window.
    pub fn daily_hours(from: u32, to: u32) -> Schedule {
        Schedule::Daily {
            from: from * 3600,
            to: to * 3600,
        }
    }

    /// Whether the schedule is true at `t`.
    pub fn state_at(&self, t: i64) -> bool {
        match self {
            Schedule::Fixed(b) => b.eval(t) == Truth::True,
            Schedule::Daily { from, to } => {
                let sod = t.rem_euclid(DAY);
                let (from, to) = (i64::from(*from), i64::from(*to));
                if from <= to {
                    sod >= from && sod < to
                } else {
                    sod >= from || sod < to
                }
            }
            Schedule::Weekly { day, from, to } => {
                let sow = (t + EPOCH_DOW * DAY).rem_euclid(WEEK);
                let start = i64::from(*day) * DAY + i64::from(*from);
                let end = i64::from(*day) * DAY + i64::from(*to);
                sow >= start && sow < end
            }
            Schedule::Interval(_) => false,
        }
    }

    /// The smallest boundary strictly after `t` where the schedule changes
    /// truth. None when the schedule has no further transitions.
    pub fn next_change(&self, t: i64) -> Option<i64> {
        match self {
            Schedule::Fixed(b) => b.next_change(t).map(|(at, _)| at),
            Schedule::Daily { from, to } => {
                let base = t - t.rem_euclid(DAY);
                let (from, to) = (i64::from(*from), i64::from(*to));
                [base + from, base + to, base + DAY + from, base + DAY + to]
                    .into_iter()
                    .filter(|&b| b > t)
                    .min()
            }
            Schedule::Weekly { day, from, to } => {
                let sow = (t + EPOCH_DOW * DAY).rem_euclid(WEEK);
                let base = t - sow;
                let start = i64::from(*day) * DAY + i64::from(*from);
                let end = i64::from(*day) * DAY + i64::from(*to);
                [base + start, base + end, base + WEEK + start, base + WEEK + end]
                    .into_iter()
                    .filter(|&b| b > t)
                    .min()
            }
            Schedule::Interval(d) => Some(t + d),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Fixed(b) => write!(f, "{}", b),
            Schedule::Daily { from, to } => write!(f, "d({}_{})", from, to),
            Schedule::Weekly { day, from, to } => write!(f, "w({}).({}_{})", day, from, to),
            Schedule::Interval(d) => write!(f, "{}s", d),
        }
    }
}

#[derive(Default)]
pub(crate) struct Clock {
    pub(crate) now: i64,
    queue: BTreeSet<(i64, CellId)>,
    armed: HashMap<CellId, i64>,
}

impl Clock {
    /// Register or re-key a cell's deadline.
    pub(crate) fn set_timer(&mut self, cell: CellId, at: i64) {
        if let Some(old) = self.armed.insert(cell, at) {
            self.queue.remove(&(old, cell));
        }
        self.queue.insert((at, cell));
    }

    pub(crate) fn clear_timer(&mut self, cell: CellId) {
        if let Some(old) = self.armed.remove(&cell) {
            self.queue.remove(&(old, cell));
        }
    }

    fn pop_due(&mut self, now: i64) -> Option<CellId> {
        let &(at, cell) = self.queue.iter().next()?;
        if at > now {
            return None;
        }
        self.queue.remove(&(at, cell));
        self.armed.remove(&cell);
        Some(cell)
    }
}

impl Engine {
    /// The engine's current wall-clock second.
    pub fn now(&self) -> i64 {
        self.clock.now
    }

    /// Register a future alert for a cell.
    pub fn set_timer(&mut self, cell: CellId, epoch: i64) {
        self.clock.set_timer(cell, epoch);
    }

    pub fn clear_timer(&mut self, cell: CellId) {
        self.clock.clear_timer(cell);
    }

    /// Advance the wall clock and service every deadline that has come
    /// due. Deadlines are strictly serialized with propagation: each fires
    /// one cell, then the engine reacts to quiescence before the next is
    /// examined. Returns the rule firings accumulated along the way.
    pub fn advance_clock(&mut self, now: i64) -> Vec<Firing> {
        if now > self.clock.now {
            self.clock.now = now;
        }
        let mut firings = Vec::new();
        while let Some(cell) = self.clock.pop_due(self.clock.now) {
            self.timer_alert(cell);
            firings.extend(self.react());
        }
        firings
    }

    /// A deadline fired: schedule the cell for re-evaluation.
    fn timer_alert(&mut self, cell: CellId) {
        self.schedule_cell(cell);
    }

    /// Evaluate a schedule-driven condition: its value is the schedule's
    /// state at the current clock, and its timer is re-armed for the next
    /// transition as a side effect.
    pub(crate) fn time_eval(&mut self, id: CellId) -> Value {
        let sched = match &self.slot(id).kind {
            CellKind::Time { sched } => sched.clone(),
            _ => return Value::Unknown,
        };
        let now = self.clock.now;
        let state = sched.state_at(now);
        if let Some(at) = sched.next_change(now) {
            self.clock.set_timer(id, at);
        }
        Value::Bool(state)
    }
}
