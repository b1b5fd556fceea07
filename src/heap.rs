//! Object heap: slot arena, reference counts, and interning tables.
//!
//! Slots are recycled through a free list. Reference counts saturate at a
//! permanent ceiling (the sentinels and the glossary root never die). A
//! count reaching zero runs the cell's destructor: unsubscribe from
//! operands, release operand references, unlink from the owning intern
//! table, and return the slot to the free list.
//!
//! Interning guarantees structural uniqueness: equal reals, equal strings,
//! equal regex sources, and equal `(op, left, right)` condition triples all
//! share one cell, so id equality implies value equality for interned
//! kinds. `0.0` and `-0.0` normalize to one real.

use std::collections::HashMap;
use std::rc::Rc;

use crate::cell::{ActionId, AxonKind, CellId, CellKind, CondOp, Slot};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::rule::Action;
use crate::value::Value;

pub(crate) const PERMANENT: u32 = u32::MAX;

#[derive(Default)]
pub(crate) struct Heap {
    pub(crate) slots: Vec<Slot>,
    pub(crate) free: Vec<u32>,
    pub(crate) strings: HashMap<Rc<str>, CellId>,
    pub(crate) reals: HashMap<u64, CellId>,
    pub(crate) regexes: HashMap<Rc<str>, CellId>,
    pub(crate) conds: HashMap<(CondOp, CellId, CellId), CellId>,
    pub(crate) axons: HashMap<(AxonKind, CellId), CellId>,
    pub(crate) actions: Vec<Action>,
}

/// `-0.0` and `0.0` intern as the same real.
fn real_key(r: f64) -> u64 {
    if r == 0.0 {
        0.0f64.to_bits()
    } else {
        r.to_bits()
    }
}

impl Heap {
    /// Pop a slot from the free list or grow the arena.
    pub(crate) fn new_cell(&mut self, kind: CellKind) -> CellId {
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Slot::new(kind);
                CellId(i)
            }
            None => {
                let i = self.slots.len() as u32;
                self.slots.push(Slot::new(kind));
                CellId(i)
            }
        }
    }
}

impl Engine {
    /// Increment a cell's reference count; permanent cells stay permanent.
    pub fn grab(&mut self, id: CellId) {
        let slot = self.slot_mut(id);
        if slot.refcnt != PERMANENT {
            slot.refcnt += 1;
        }
    }

    /// Decrement a cell's reference count, destroying it at zero.
    pub fn drop_ref(&mut self, id: CellId) {
        let slot = self.slot_mut(id);
        if slot.refcnt == PERMANENT {
            return;
        }
        if slot.refcnt > 0 {
            slot.refcnt -= 1;
        }
        if slot.refcnt == 0 {
            self.destroy(id);
        }
    }

    /// Destroy a cell only if no reference was ever taken: callers that
    /// obtain interned atoms speculatively use this to let unused atoms go.
    pub fn release(&mut self, id: CellId) {
        let slot = self.slot(id);
        if slot.refcnt == 0 && !matches!(slot.kind, CellKind::Free) {
            self.destroy(id);
        }
    }

    /// Unique interned string cell.
    pub fn intern_string(&mut self, text: &str) -> CellId {
        if let Some(&id) = self.heap.strings.get(text) {
            return id;
        }
        let rc: Rc<str> = text.into();
        let id = self.heap.new_cell(CellKind::Const(Value::Str(rc.clone())));
        self.heap.strings.insert(rc, id);
        id
    }

    /// Unique interned real cell.
    pub fn intern_real(&mut self, r: f64) -> CellId {
        let key = real_key(r);
        if let Some(&id) = self.heap.reals.get(&key) {
            return id;
        }
        let id = self
            .heap
            .new_cell(CellKind::Const(Value::Real(f64::from_bits(key))));
        self.heap.reals.insert(key, id);
        id
    }

    /// Compile and intern a regular expression cell.
    pub fn compile_regex(&mut self, pattern: &str) -> Result<CellId> {
        if let Some(&id) = self.heap.regexes.get(pattern) {
            return Ok(id);
        }
        let re = regex::Regex::new(pattern).map_err(EngineError::Regex)?;
        let source: Rc<str> = pattern.into();
        let id = self.heap.new_cell(CellKind::Regex {
            source: source.clone(),
            re,
        });
        self.heap.regexes.insert(source, id);
        Ok(id)
    }

    /// Interned condition cell over one or two operands. Unary operators
    /// take `CellId::UNKNOWN` as their right operand. The new condition's
    /// level sits above every operand that is itself a cell; its value is
    /// `Disabled` until something subscribes.
    pub fn make_condition(&mut self, op: CondOp, left: CellId, right: CellId) -> CellId {
        if let Some(&id) = self.heap.conds.get(&(op, left, right)) {
            return id;
        }
        let id = self.heap.new_cell(CellKind::Cond { op, left, right });
        self.heap.conds.insert((op, left, right), id);
        self.grab(left);
        self.grab(right);
        let mut level = 0;
        if !self.is_constant(left) {
            level = self.slot(left).level + 1;
        }
        if !self.is_constant(right) && level <= self.slot(right).level {
            level = self.slot(right).level + 1;
        }
        self.slot_mut(id).level = level;
        id
    }

    pub(crate) fn action(&self, id: ActionId) -> &Action {
        &self.heap.actions[id.0 as usize]
    }

    pub(crate) fn action_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.heap.actions[id.0 as usize]
    }

    /// Run a cell's destructor and return its slot to the free list.
    pub(crate) fn destroy(&mut self, id: CellId) {
        enum Teardown {
            Skip,
            Plain,
            Str(Rc<str>),
            Real(f64),
            Regex(Rc<str>),
            Cond(CondOp, CellId, CellId),
            Term,
            Timerish,
            Rule(CellId, ActionId),
            Nerve(CellId),
            Axon(AxonKind, CellId),
        }
        let teardown = match &self.slot(id).kind {
            CellKind::Free => Teardown::Skip,
            CellKind::Const(Value::Str(s)) => Teardown::Str(s.clone()),
            CellKind::Const(Value::Real(r)) => Teardown::Real(*r),
            CellKind::Const(_) | CellKind::Node(_) => Teardown::Plain,
            CellKind::Regex { source, .. } => Teardown::Regex(source.clone()),
            CellKind::Cond { op, left, right } => Teardown::Cond(*op, *left, *right),
            CellKind::Term(_) => Teardown::Term,
            CellKind::Time { .. } | CellKind::Timer { .. } => Teardown::Timerish,
            CellKind::Rule(r) => Teardown::Rule(r.cond, r.action),
            CellKind::Nerve { cond, .. } => Teardown::Nerve(*cond),
            CellKind::Axon(a) => Teardown::Axon(a.kind, a.publisher),
        };
        match teardown {
            Teardown::Skip => {}
            Teardown::Plain => self.free_slot(id),
            Teardown::Str(s) => {
                self.heap.strings.remove(&s);
                self.free_slot(id);
            }
            Teardown::Real(r) => {
                self.heap.reals.remove(&real_key(r));
                self.free_slot(id);
            }
            Teardown::Regex(source) => {
                self.heap.regexes.remove(&source);
                self.free_slot(id);
            }
            Teardown::Cond(op, left, right) => {
                self.disable(left, Some(id));
                self.disable(right, Some(id));
                self.heap.conds.remove(&(op, left, right));
                self.free_slot(id);
                self.drop_ref(left);
                self.drop_ref(right);
            }
            Teardown::Term => self.destroy_term(id),
            Teardown::Timerish => {
                self.clock.clear_timer(id);
                self.free_slot(id);
            }
            Teardown::Rule(cond, action) => {
                self.disable(cond, Some(id));
                self.retire_action(action);
                self.free_slot(id);
                self.drop_ref(cond);
            }
            Teardown::Nerve(cond) => {
                self.disable(cond, Some(id));
                self.free_slot(id);
                self.drop_ref(cond);
            }
            Teardown::Axon(kind, publisher) => {
                self.heap.axons.remove(&(kind, publisher));
                self.free_slot(id);
                self.drop_ref(publisher);
            }
        }
    }

    pub(crate) fn free_slot(&mut self, id: CellId) {
        *self.slot_mut(id) = Slot::new(CellKind::Free);
        self.heap.free.push(id.0);
    }
}
