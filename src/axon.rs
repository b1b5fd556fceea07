//! Axon accelerators for relational conditions.
//!
//! Many rules compare the same cell against different constants
//! (`x = "a"`, `x = "b"`, `x < 10`, …). Publishing each change of `x` to
//! every comparison is O(N); an axon subscribes to `x` once, keeps the
//! comparisons in an index ordered by their constant operand, and on each
//! change touches only the affected entries:
//!
//! - equality axons flip at most two conditions, the one that was true
//!   and the one that becomes true;
//! - range axons walk only the open interval between the old and new
//!   value, including the matching edge for the operator's own boundary.
//!
//! When the published value leaves the comparable type (or turns
//! Unknown), the axon falls back to publishing to everyone so each
//! condition re-evaluates to Unknown on its own.

use std::ops::Bound;
use std::rc::Rc;

use crate::cell::{AxonData, AxonKey, AxonKind, CellId, CellKind, CondOp, TrueCell};
use crate::engine::Engine;
use crate::value::Value;

/// Tiebreak bounds for composite `(key, cond)` range walks.
const ID_MIN: CellId = CellId(0);
const ID_MAX: CellId = CellId(u32::MAX);

impl Engine {
    /// A subscription is routed through an axon when a relational
    /// condition with a constant comparable right operand subscribes to
    /// its own (non-constant) left operand.
    pub(crate) fn axon_eligible(&self, publisher: CellId, sub: CellId) -> bool {
        match &self.slot(sub).kind {
            CellKind::Cond { op, left, right } if *left == publisher => {
                matches!(op, CondOp::Eq | CondOp::Lt | CondOp::Gt)
                    && matches!(
                        &self.slot(*right).kind,
                        CellKind::Const(Value::Real(_)) | CellKind::Const(Value::Str(_))
                    )
            }
            _ => false,
        }
    }

    fn axon_family(&self, cond: CellId) -> Option<(AxonKind, AxonKey)> {
        let CellKind::Cond { op, right, .. } = &self.slot(cond).kind else {
            return None;
        };
        let key = match &self.slot(*right).kind {
            CellKind::Const(Value::Real(r)) => AxonKey::Real(*r),
            CellKind::Const(Value::Str(s)) => AxonKey::Str(s.clone()),
            _ => return None,
        };
        let kind = match (op, &key) {
            (CondOp::Eq, _) => AxonKind::RelEq,
            (CondOp::Lt, AxonKey::Real(_)) => AxonKind::RelLtReal,
            (CondOp::Gt, AxonKey::Real(_)) => AxonKind::RelGtReal,
            (CondOp::Lt, AxonKey::Str(_)) => AxonKind::RelLtStr,
            (CondOp::Gt, AxonKey::Str(_)) => AxonKind::RelGtStr,
            _ => return None,
        };
        Some((kind, key))
    }

    fn use_axon(&mut self, kind: AxonKind, publisher: CellId) -> CellId {
        if let Some(&id) = self.heap.axons.get(&(kind, publisher)) {
            return id;
        }
        let id = self.heap.new_cell(CellKind::Axon(AxonData {
            kind,
            publisher,
            index: crate::avl::Avl::new(),
            true_cell: TrueCell::None,
            last: None,
        }));
        self.heap.axons.insert((kind, publisher), id);
        self.grab(publisher);
        id
    }

    pub(crate) fn axon_enable(&mut self, publisher: CellId, cond: CellId) {
        let Some((kind, key)) = self.axon_family(cond) else {
            return;
        };
        let axon = self.use_axon(kind, publisher);
        let first = match &self.slot(axon).kind {
            CellKind::Axon(a) => a.index.is_empty(),
            _ => return,
        };
        if first {
            let level = self.slot(publisher).level + 1;
            self.slot_mut(axon).level = level;
            self.slot_mut(axon).value = Value::Unknown;
            self.enable(publisher, Some(axon));
            let pv = self.value(publisher);
            let comparable = match kind {
                AxonKind::RelEq => None,
                AxonKind::RelLtReal | AxonKind::RelGtReal => {
                    matches!(pv, Value::Real(_)).then(|| pv.clone())
                }
                AxonKind::RelLtStr | AxonKind::RelGtStr => {
                    matches!(pv, Value::Str(_)).then(|| pv.clone())
                }
            };
            if let CellKind::Axon(a) = &mut self.slot_mut(axon).kind {
                a.last = comparable;
            }
        }
        if let CellKind::Axon(a) = &mut self.slot_mut(axon).kind {
            a.index.insert((key, cond), ());
        }
        // evaluate the condition now that it is maintained
        let v = self.eval_cell(cond);
        self.slot_mut(cond).value = v.clone();
        if kind == AxonKind::RelEq {
            let pv_unknown = self.value(publisher).is_unknown();
            if let CellKind::Axon(a) = &mut self.slot_mut(axon).kind {
                if v.is_truthy() {
                    a.true_cell = TrueCell::Cond(cond);
                }
                if pv_unknown {
                    a.true_cell = TrueCell::Unknown;
                }
            }
        }
    }

    pub(crate) fn axon_disable(&mut self, publisher: CellId, cond: CellId) {
        let Some((kind, key)) = self.axon_family(cond) else {
            return;
        };
        let Some(&axon) = self.heap.axons.get(&(kind, publisher)) else {
            return;
        };
        let now_empty = match &mut self.slot_mut(axon).kind {
            CellKind::Axon(a) => {
                if a.true_cell == TrueCell::Cond(cond) {
                    a.true_cell = TrueCell::None;
                }
                a.index.remove(&(key, cond));
                a.index.is_empty()
            }
            _ => return,
        };
        if now_empty {
            self.disable(publisher, Some(axon));
            self.destroy(axon);
        }
    }

    /// Re-evaluate an axon after its publisher changed. The axon's own
    /// value stays Unknown; the affected dependent conditions are updated
    /// and published directly.
    pub(crate) fn axon_eval(&mut self, id: CellId) -> Value {
        let (kind, publisher) = match &self.slot(id).kind {
            CellKind::Axon(a) => (a.kind, a.publisher),
            _ => return Value::Unknown,
        };
        match kind {
            AxonKind::RelEq => self.axon_eval_eq(id, publisher),
            _ => self.axon_eval_range(id, kind, publisher),
        }
        Value::Unknown
    }

    fn axon_eval_eq(&mut self, id: CellId, publisher: CellId) {
        let pv = self.value(publisher);
        if pv.is_unknown() {
            // every dependent turns Unknown on its own re-evaluation
            self.publish(id);
            if let CellKind::Axon(a) = &mut self.slot_mut(id).kind {
                a.true_cell = TrueCell::Unknown;
            }
            return;
        }
        let was_unknown = matches!(
            &self.slot(id).kind,
            CellKind::Axon(a) if a.true_cell == TrueCell::Unknown
        );
        if was_unknown {
            self.publish(id);
            let found = self.find_equal(id, &pv);
            if let CellKind::Axon(a) = &mut self.slot_mut(id).kind {
                a.true_cell = found.map_or(TrueCell::None, TrueCell::Cond);
            }
            return;
        }
        let old = match &self.slot(id).kind {
            CellKind::Axon(a) => a.true_cell.clone(),
            _ => return,
        };
        match self.find_equal(id, &pv) {
            Some(now_true) => {
                if old != TrueCell::Cond(now_true) {
                    self.slot_mut(now_true).value = Value::TRUE;
                    self.publish(now_true);
                    if let TrueCell::Cond(prev) = old {
                        self.slot_mut(prev).value = Value::FALSE;
                        self.publish(prev);
                    }
                    if let CellKind::Axon(a) = &mut self.slot_mut(id).kind {
                        a.true_cell = TrueCell::Cond(now_true);
                    }
                }
            }
            None => {
                if let TrueCell::Cond(prev) = old {
                    self.slot_mut(prev).value = Value::FALSE;
                    self.publish(prev);
                    if let CellKind::Axon(a) = &mut self.slot_mut(id).kind {
                        a.true_cell = TrueCell::None;
                    }
                }
            }
        }
    }

    /// The dependent condition whose constant equals the published value.
    fn find_equal(&self, axon: CellId, pv: &Value) -> Option<CellId> {
        let key = match pv {
            Value::Real(r) => AxonKey::Real(*r),
            Value::Str(s) => AxonKey::Str(s.clone()),
            _ => return None,
        };
        let CellKind::Axon(a) = &self.slot(axon).kind else {
            return None;
        };
        let mut found = None;
        a.index.for_each_range(
            Bound::Included(&(key.clone(), ID_MIN)),
            Bound::Included(&(key, ID_MAX)),
            |(_, cond), _| {
                if found.is_none() {
                    found = Some(*cond);
                }
            },
        );
        found
    }

    fn axon_eval_range(&mut self, id: CellId, kind: AxonKind, publisher: CellId) {
        let pv = self.value(publisher);
        let comparable = match kind {
            AxonKind::RelLtReal | AxonKind::RelGtReal => matches!(pv, Value::Real(_)),
            _ => matches!(pv, Value::Str(_)),
        };
        if !comparable {
            let had = matches!(&self.slot(id).kind, CellKind::Axon(a) if a.last.is_some());
            if had {
                // the publisher left the comparable type: every dependent
                // goes Unknown
                let deps = self.axon_deps(id);
                for dep in deps {
                    self.slot_mut(dep).value = Value::Unknown;
                    self.publish(dep);
                }
                if let CellKind::Axon(a) = &mut self.slot_mut(id).kind {
                    a.last = None;
                }
            }
            return;
        }
        let old = match &self.slot(id).kind {
            CellKind::Axon(a) => a.last.clone(),
            _ => return,
        };
        let Some(old) = old else {
            // regained a comparable value: everyone re-evaluates
            self.publish(id);
            if let CellKind::Axon(a) = &mut self.slot_mut(id).kind {
                a.last = Some(pv);
            }
            return;
        };
        let (old_key, new_key) = (key_of(&old), key_of(&pv));
        let ascending = old_key <= new_key;
        let (min, max) = if ascending {
            (old_key, new_key.clone())
        } else {
            (new_key.clone(), old_key)
        };
        // a rising value satisfies `>` conditions up to and including the
        // old edge; a falling value satisfies `<` down to the new edge
        let rising = matches!(kind, AxonKind::RelGtReal | AxonKind::RelGtStr);
        let (cond_value, low_edge, high_edge) = if ascending {
            if rising {
                (Value::TRUE, true, false)
            } else {
                (Value::FALSE, false, true)
            }
        } else if !rising {
            (Value::TRUE, false, true)
        } else {
            (Value::FALSE, true, false)
        };
        let low = if low_edge {
            Bound::Included((min, ID_MIN))
        } else {
            Bound::Excluded((min, ID_MAX))
        };
        let high = if high_edge {
            Bound::Included((max, ID_MAX))
        } else {
            Bound::Excluded((max, ID_MIN))
        };
        let mut affected = Vec::new();
        if let CellKind::Axon(a) = &self.slot(id).kind {
            a.index.for_each_range(
                bound_ref(&low),
                bound_ref(&high),
                |(_, cond), _| affected.push(*cond),
            );
        }
        for cond in affected {
            self.slot_mut(cond).value = cond_value.clone();
            self.publish(cond);
        }
        if let CellKind::Axon(a) = &mut self.slot_mut(id).kind {
            a.last = Some(pv);
        }
    }

    fn axon_deps(&self, id: CellId) -> Vec<CellId> {
        match &self.slot(id).kind {
            CellKind::Axon(a) => a.index.iter().map(|((_, c), _)| *c).collect(),
            _ => Vec::new(),
        }
    }
}

fn key_of(v: &Value) -> AxonKey {
    match v {
        Value::Real(r) => AxonKey::Real(*r),
        Value::Str(s) => AxonKey::Str(Rc::clone(s)),
        _ => AxonKey::Real(f64::NAN),
    }
}

fn bound_ref(b: &Bound<(AxonKey, CellId)>) -> Bound<&(AxonKey, CellId)> {
    match b {
        Bound::Included(x) => Bound::Included(x),
        Bound::Excluded(x) => Bound::Excluded(x),
        Bound::Unbounded => Bound::Unbounded,
    }
}
