//! Condition evaluation.
//!
//! Every operator's `eval` is total over the value domain, including the
//! sentinels: type mismatches yield `Unknown`, never an error. Boolean
//! operators are value-bearing (a satisfied `&` yields its deciding
//! operand's value) and follow Kleene's strong three-valued tables.
//!
//! The lazy, monitor, and capture operators manage their right operand's
//! subscription from inside `eval`: when the left side alone decides the
//! outcome, the right side is disabled and costs nothing until the guard
//! changes.

use tracing::{error, info};

use crate::cell::{CellId, CellKind, CondOp};
use crate::engine::Engine;
use crate::rule::Firing;
use crate::value::{Truth, Value};

impl Engine {
    /// Re-evaluate a cell from its operands' current values. Pure for the
    /// plain operators; the lazy/monitor/capture family adjusts right-side
    /// subscriptions, time conditions re-arm their timer, and change
    /// conditions register on the reset list.
    pub(crate) fn eval_cell(&mut self, id: CellId) -> Value {
        match &self.slot(id).kind {
            CellKind::Free => Value::Disabled,
            CellKind::Const(v) => v.clone(),
            CellKind::Regex { source, .. } => Value::Str(source.clone()),
            CellKind::Node(_) => Value::Placeholder,
            CellKind::Term(t) => {
                let def = t.def;
                self.value(def)
            }
            CellKind::Time { .. } => self.time_eval(id),
            // a delay timer only ever reports expiry; its true (armed) and
            // disabled states are written directly by the delay condition
            CellKind::Timer { .. } => Value::FALSE,
            CellKind::Rule(r) => {
                let v = self.value(r.cond);
                match v.truth() {
                    Truth::Unknown => Value::Unknown,
                    Truth::False => Value::FALSE,
                    Truth::True => Value::TRUE,
                }
            }
            CellKind::Nerve { cond, name } => {
                let (cond, name) = (*cond, name.clone());
                let v = self.value(cond);
                info!("Nerve {}={}", name, v);
                v
            }
            CellKind::Axon(_) => self.axon_eval(id),
            CellKind::Cond { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                self.eval_cond(id, op, left, right)
            }
        }
    }

    fn eval_cond(&mut self, id: CellId, op: CondOp, l: CellId, r: CellId) -> Value {
        let lv = self.value(l);
        match op {
            CondOp::Not => match lv.truth() {
                Truth::Unknown => Value::Unknown,
                Truth::False => Value::TRUE,
                Truth::True => Value::FALSE,
            },
            CondOp::ToTrue => {
                if lv.is_unknown() || lv.is_false() {
                    lv
                } else {
                    Value::TRUE
                }
            }
            CondOp::IsUnknown => Value::Bool(lv.is_unknown()),
            CondOp::IsKnown => Value::Bool(!lv.is_unknown()),
            CondOp::ClosedWorld => {
                if lv.is_unknown() {
                    Value::FALSE
                } else {
                    lv
                }
            }
            CondOp::Default => {
                if lv.is_unknown() {
                    self.value(r)
                } else {
                    lv
                }
            }
            CondOp::And => {
                let rv = self.value(r);
                if lv.is_false() || (lv.is_unknown() && !rv.is_false()) {
                    lv
                } else {
                    rv
                }
            }
            CondOp::LazyAnd => {
                if lv.is_false() {
                    self.disable(r, Some(id));
                    lv
                } else {
                    self.enable(r, Some(id));
                    let rv = self.value(r);
                    if lv.is_unknown() && !rv.is_false() {
                        lv
                    } else {
                        rv
                    }
                }
            }
            CondOp::Nand => {
                let rv = self.value(r);
                if lv.is_false() || rv.is_false() {
                    Value::TRUE
                } else if lv.is_unknown() || rv.is_unknown() {
                    Value::Unknown
                } else {
                    Value::FALSE
                }
            }
            CondOp::Or => {
                let rv = self.value(r);
                if lv.is_false() || (lv.is_unknown() && !rv.is_false()) {
                    rv
                } else {
                    lv
                }
            }
            CondOp::LazyOr => {
                if lv.is_truthy() {
                    self.disable(r, Some(id));
                    lv
                } else {
                    self.enable(r, Some(id));
                    let rv = self.value(r);
                    if lv.is_unknown() && rv.is_false() {
                        lv
                    } else {
                        rv
                    }
                }
            }
            CondOp::Nor => {
                let rv = self.value(r);
                if lv.is_false() {
                    if rv.is_false() {
                        Value::TRUE
                    } else if rv.is_unknown() {
                        Value::Unknown
                    } else {
                        Value::FALSE
                    }
                } else if lv.is_unknown() {
                    if rv.is_false() || rv.is_unknown() {
                        Value::Unknown
                    } else {
                        Value::FALSE
                    }
                } else {
                    Value::FALSE
                }
            }
            CondOp::Xor => {
                let rv = self.value(r);
                if lv.is_unknown() || rv.is_unknown() {
                    Value::Unknown
                } else {
                    Value::Bool(lv.is_truthy() != rv.is_truthy())
                }
            }
            CondOp::AndMonitor => {
                if lv.is_false() || lv.is_unknown() {
                    self.disable(r, Some(id));
                    Value::Unknown
                } else {
                    self.enable(r, Some(id));
                    self.value(r)
                }
            }
            CondOp::OrMonitor => {
                if !lv.is_false() {
                    self.disable(r, Some(id));
                    Value::Unknown
                } else {
                    self.enable(r, Some(id));
                    self.value(r)
                }
            }
            CondOp::AndCapture => {
                if lv.is_false() || lv.is_unknown() {
                    self.value(id)
                } else {
                    self.compute(r)
                }
            }
            CondOp::OrCapture => {
                if !lv.is_false() {
                    self.value(id)
                } else {
                    self.compute(r)
                }
            }
            CondOp::FlipFlop => {
                let rv = self.value(r);
                if lv.is_unknown() || rv.is_unknown() {
                    self.value(id)
                } else if lv.is_truthy() && rv.is_false() {
                    Value::TRUE
                } else if lv.is_false() && rv.is_truthy() {
                    Value::FALSE
                } else {
                    self.value(id)
                }
            }
            CondOp::Eq => {
                let rv = self.value(r);
                if lv.is_unknown() || rv.is_unknown() {
                    return Value::Unknown;
                }
                Value::Bool(values_equal(&lv, &rv))
            }
            CondOp::Ne => {
                let rv = self.value(r);
                if lv.is_unknown() || rv.is_unknown() {
                    return Value::Unknown;
                }
                Value::Bool(!values_equal(&lv, &rv))
            }
            CondOp::Lt | CondOp::Le | CondOp::Gt | CondOp::Ge => {
                let rv = self.value(r);
                if lv.is_unknown() || rv.is_unknown() {
                    return Value::Unknown;
                }
                match order(&lv, &rv) {
                    None => Value::Unknown,
                    Some(ord) => Value::Bool(match op {
                        CondOp::Lt => ord.is_lt(),
                        CondOp::Le => ord.is_le(),
                        CondOp::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    }),
                }
            }
            CondOp::Match => {
                if lv.is_unknown() {
                    return Value::Unknown;
                }
                let Value::Str(text) = lv else {
                    return Value::FALSE;
                };
                match &self.slot(r).kind {
                    CellKind::Regex { re, .. } => Value::Bool(re.is_match(&text)),
                    _ => {
                        error!("match condition without a regex operand");
                        Value::Unknown
                    }
                }
            }
            CondOp::Change => {
                self.changes.push(id);
                Value::TRUE
            }
            CondOp::DelayTrue | CondOp::DelayFalse | CondOp::DelayUnknown => {
                self.eval_delay(id, op, lv, r)
            }
        }
    }

    /// Delay logic: when the operand enters the watched state, arm the
    /// paired timer; if the timer expires while the operand is still in
    /// that state, the delayed value passes through. Leaving the state
    /// first cancels the timer and passes the operand straight through.
    fn eval_delay(&mut self, id: CellId, op: CondOp, lv: Value, timer: CellId) -> Value {
        let in_state = match op {
            CondOp::DelayTrue => lv.is_truthy(),
            CondOp::DelayFalse => lv.is_false(),
            _ => lv.is_unknown(),
        };
        if !in_state {
            if self.value(timer).is_truthy() {
                self.clock.clear_timer(timer);
            }
            self.slot_mut(timer).value = Value::Disabled;
            return lv;
        }
        let tv = self.value(timer);
        if tv.is_false() {
            // delay expired: emit the delayed value
            return lv;
        }
        if tv.is_disabled() || tv.is_unknown() {
            let sched = match &self.slot(timer).kind {
                CellKind::Timer { sched } => sched.clone(),
                _ => {
                    error!("delay condition without a timer operand");
                    return Value::Unknown;
                }
            };
            if let Some(at) = sched.next_change(self.clock.now) {
                self.clock.set_timer(timer, at);
            }
            self.slot_mut(timer).value = Value::TRUE;
            return self.value(id); // hold the remembered value
        }
        error!(timer = ?tv, "unexpected state on delay timer");
        Value::Unknown
    }

    /// Reset every change condition that fired this cycle back to false,
    /// publish the resets, and react. Called by the hosting layer once per
    /// external message batch.
    pub fn drain_change_list(&mut self) -> Vec<Firing> {
        let list = std::mem::take(&mut self.changes);
        for id in list {
            if self.slot(id).value.is_disabled() {
                continue;
            }
            self.slot_mut(id).value = Value::FALSE;
            self.publish(id);
        }
        self.react()
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a.same(b) {
        return true;
    }
    match (a, b) {
        (Value::Real(x), Value::Real(y)) => x == y,
        _ => false,
    }
}

/// Ordering for relational conditions: numeric for reals, lexicographic
/// for strings, undefined across types.
fn order(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
