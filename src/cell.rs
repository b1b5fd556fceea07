//! Cells: the nodes of the dependency graph.
//!
//! A cell is a slot in the engine's arena. Constants (interned reals,
//! strings, regexes, the sentinels) are cells whose cached value never
//! changes; everything else (terms, conditions, rules, time conditions,
//! axons) caches a value and maintains a subscriber set so changes
//! propagate upward.
//!
//! The enable protocol: subscribing to a cell that has no value yet makes
//! it subscribe to its own operands (recursively) and evaluate once.
//! Unsubscribing the last subscriber tears that back down and parks the
//! cell at `Disabled`. Terms are exempt from parking: they keep their
//! definition subscription so assertions always land somewhere.
//!
//! Levels order re-evaluation: every cell sits strictly above its operand
//! cells, so the scheduler can drain buckets bottom-up and evaluate each
//! cell after all of its inputs.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::avl::Avl;
use crate::clock::Schedule;
use crate::engine::Engine;
use crate::sched::MAX_LEVELS;
use crate::value::Value;

/// Arena index of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(pub(crate) u32);

/// Arena index of a rule's action record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub(crate) u32);

impl CellId {
    /// The `Unknown` sentinel cell.
    pub const UNKNOWN: CellId = CellId(0);
    /// The placeholder definition of terms created as intermediate
    /// qualifiers.
    pub const PLACEHOLDER: CellId = CellId(1);
    pub const TRUE: CellId = CellId(2);
    pub const FALSE: CellId = CellId(3);
}

/// Condition operators. Unary operators carry `CellId::UNKNOWN` as their
/// right operand so every condition interns under one `(op, left, right)`
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondOp {
    // unary boolean
    Not,
    ToTrue,
    IsUnknown,
    IsKnown,
    ClosedWorld,
    // binary boolean, three-valued
    And,
    Nand,
    Or,
    Nor,
    Xor,
    // lazy boolean
    LazyAnd,
    LazyOr,
    // monitor, capture, flip-flop
    AndMonitor,
    OrMonitor,
    AndCapture,
    OrCapture,
    FlipFlop,
    // infix default
    Default,
    // relational
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // regex match; right operand is a regex cell
    Match,
    // transition detector, reset once per cycle
    Change,
    // delay; right operand is the paired timer cell
    DelayTrue,
    DelayFalse,
    DelayUnknown,
}

impl CondOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CondOp::Not => "!",
            CondOp::ToTrue => "!!",
            CondOp::IsUnknown => "?",
            CondOp::IsKnown => "!?",
            CondOp::ClosedWorld => "[]",
            CondOp::And => "&",
            CondOp::Nand => "!&",
            CondOp::Or => "|",
            CondOp::Nor => "!|",
            CondOp::Xor => "|!&",
            CondOp::LazyAnd => "&&",
            CondOp::LazyOr => "||",
            CondOp::AndMonitor => "&~&",
            CondOp::OrMonitor => "|~|",
            CondOp::AndCapture => "&^&",
            CondOp::OrCapture => "|^|",
            CondOp::FlipFlop => "^",
            CondOp::Default => "?",
            CondOp::Eq => "=",
            CondOp::Ne => "<>",
            CondOp::Lt => "<",
            CondOp::Le => "<=",
            CondOp::Gt => ">",
            CondOp::Ge => ">=",
            CondOp::Match => "~",
            CondOp::Change => "~=",
            CondOp::DelayTrue => "~^1",
            CondOp::DelayFalse => "~^0",
            CondOp::DelayUnknown => "~^?",
        }
    }

    pub fn is_prefix(self) -> bool {
        matches!(
            self,
            CondOp::Not
                | CondOp::ToTrue
                | CondOp::IsUnknown
                | CondOp::IsKnown
                | CondOp::ClosedWorld
        )
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            CondOp::Eq | CondOp::Ne | CondOp::Lt | CondOp::Le | CondOp::Gt | CondOp::Ge
        )
    }

    pub fn is_delay(self) -> bool {
        matches!(
            self,
            CondOp::DelayTrue | CondOp::DelayFalse | CondOp::DelayUnknown
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Fire on every transition of the antecedent to a true value.
    On,
    /// Like `On`, but removed after its first firing.
    When,
    /// Alerted synchronously at assertion time, not from the publish path.
    If,
}

/// Relational axon families. One axon exists per (family, published cell)
/// and fans out to every condition with that operator and a constant right
/// operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxonKind {
    RelEq,
    RelLtReal,
    RelGtReal,
    RelLtStr,
    RelGtStr,
}

/// Ordering key for axon indexes: conditions sorted by their constant
/// right operand, with the condition id as tiebreak.
#[derive(Debug, Clone, PartialEq)]
pub enum AxonKey {
    Real(f64),
    Str(Rc<str>),
}

impl Eq for AxonKey {}

impl Ord for AxonKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (AxonKey::Real(a), AxonKey::Real(b)) => a.total_cmp(b),
            (AxonKey::Str(a), AxonKey::Str(b)) => a.cmp(b),
            (AxonKey::Real(_), AxonKey::Str(_)) => std::cmp::Ordering::Less,
            (AxonKey::Str(_), AxonKey::Real(_)) => std::cmp::Ordering::Greater,
        }
    }
}

impl PartialOrd for AxonKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// What an equality axon knows about which subscriber is currently true.
#[derive(Debug, Clone, PartialEq)]
pub enum TrueCell {
    None,
    Unknown,
    Cond(CellId),
}

#[derive(Debug)]
pub struct TermData {
    pub parent: Option<CellId>,
    pub name: Rc<str>,
    /// The defining object; `CellId::PLACEHOLDER` while undefined.
    pub def: CellId,
    /// Child glossary, keyed by child name.
    pub gloss: Avl<Rc<str>, CellId>,
}

#[derive(Debug)]
pub struct NodeData {
    /// Oracle consulted to resolve Unknown terms below this context:
    /// `<path` reads `name=value` lines from a file, anything else runs as
    /// a command with the term name as argument.
    pub source: Option<String>,
}

#[derive(Debug)]
pub struct RuleData {
    pub kind: RuleKind,
    pub cond: CellId,
    pub action: ActionId,
    /// Last antecedent value seen; firing among distinct true values is
    /// detected by comparing against it.
    pub last: Value,
}

#[derive(Debug)]
pub struct AxonData {
    pub kind: AxonKind,
    /// The cell whose changes this axon fans out.
    pub publisher: CellId,
    /// Dependent conditions ordered by constant right operand.
    pub index: Avl<(AxonKey, CellId), ()>,
    /// Equality axons: which dependent is currently true.
    pub true_cell: TrueCell,
    /// Range axons: the publisher's previous comparable value.
    pub last: Option<Value>,
}

/// The closed set of cell types. Dispatch is a `match` on this tag.
#[derive(Debug)]
pub enum CellKind {
    /// Slot on the free list.
    Free,
    /// Interned constant: real, string, boolean, or sentinel.
    Const(Value),
    /// Compiled regular expression; constant.
    Regex { source: Rc<str>, re: regex::Regex },
    Term(TermData),
    Node(NodeData),
    Cond {
        op: CondOp,
        left: CellId,
        right: CellId,
    },
    /// Schedule-driven condition: true inside the schedule's intervals.
    Time { sched: Schedule },
    /// Subordinate timer owned by a delay condition.
    Timer { sched: Schedule },
    Rule(RuleData),
    Nerve { cond: CellId, name: Rc<str> },
    Axon(AxonData),
}

impl CellKind {
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            CellKind::Const(_) | CellKind::Regex { .. } | CellKind::Node(_)
        )
    }

    pub fn is_term(&self) -> bool {
        matches!(self, CellKind::Term(_))
    }
}

/// One arena slot.
#[derive(Debug)]
pub struct Slot {
    pub refcnt: u32,
    pub level: u16,
    pub scheduled: bool,
    pub value: Value,
    /// Subscribers with multiplicity: a cell subscribing N times must
    /// unsubscribe N times.
    pub subs: Avl<CellId, u32>,
    pub kind: CellKind,
}

impl Slot {
    pub(crate) fn new(kind: CellKind) -> Slot {
        let value = match &kind {
            CellKind::Const(v) => v.clone(),
            CellKind::Regex { source, .. } => Value::Str(source.clone()),
            CellKind::Node(_) => Value::Placeholder,
            _ => Value::Disabled,
        };
        Slot {
            refcnt: 0,
            level: 0,
            scheduled: false,
            value,
            subs: Avl::new(),
            kind,
        }
    }
}

impl Engine {
    pub(crate) fn slot(&self, id: CellId) -> &Slot {
        &self.heap.slots[id.0 as usize]
    }

    pub(crate) fn slot_mut(&mut self, id: CellId) -> &mut Slot {
        &mut self.heap.slots[id.0 as usize]
    }

    pub fn is_constant(&self, id: CellId) -> bool {
        self.slot(id).kind.is_constant()
    }

    /// Current cached value of a cell.
    pub fn value(&self, id: CellId) -> Value {
        self.slot(id).value.clone()
    }

    pub fn level(&self, id: CellId) -> u16 {
        self.slot(id).level
    }

    pub fn subscriber_count(&self, id: CellId) -> usize {
        self.slot(id).subs.len()
    }

    /// Subscribe `sub` to value changes of `publisher`. Enabling a constant
    /// is a no-op: constants never publish. The first subscription wakes a
    /// disabled cell: its operands are enabled recursively and its value
    /// evaluated once (without publication).
    pub fn enable(&mut self, publisher: CellId, sub: Option<CellId>) {
        if self.is_constant(publisher) {
            return;
        }
        if let Some(s) = sub {
            if self.axon_eligible(publisher, s) {
                self.axon_enable(publisher, s);
                return;
            }
            let subs = &mut self.slot_mut(publisher).subs;
            match subs.get_mut(&s) {
                Some(count) => *count += 1,
                None => {
                    subs.insert(s, 1);
                }
            }
        }
        if self.slot(publisher).value.is_disabled() {
            self.enable_operands(publisher);
            let v = self.eval_cell(publisher);
            self.slot_mut(publisher).value = v;
        }
    }

    /// Cancel one subscription of `sub` to `publisher`. When the last
    /// subscription goes, the cell unsubscribes from its operands and
    /// parks at `Disabled`. Terms are the exception and stay live.
    pub fn disable(&mut self, publisher: CellId, sub: Option<CellId>) {
        if self.is_constant(publisher) {
            return;
        }
        if self.slot(publisher).value.is_disabled() {
            return;
        }
        if let Some(s) = sub {
            if self.axon_eligible(publisher, s) {
                self.axon_disable(publisher, s);
                return;
            }
            let subs = &mut self.slot_mut(publisher).subs;
            if let Some(count) = subs.get_mut(&s) {
                *count -= 1;
                if *count == 0 {
                    subs.remove(&s);
                }
            }
        }
        if self.slot(publisher).subs.is_empty() && !self.slot(publisher).kind.is_term() {
            self.disable_operands(publisher);
            self.slot_mut(publisher).value = Value::Disabled;
        }
    }

    /// Subscribe a cell to its operands, per kind.
    fn enable_operands(&mut self, id: CellId) {
        match &self.slot(id).kind {
            CellKind::Term(t) => {
                let def = t.def;
                self.enable(def, Some(id));
            }
            CellKind::Cond { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                match op {
                    // lazy operators start with the left only; the right is
                    // enabled on demand by eval
                    CondOp::LazyAnd | CondOp::LazyOr => self.enable(left, Some(id)),
                    // monitors and captures watch the guard; the right side
                    // is enabled while the guard holds
                    CondOp::AndMonitor
                    | CondOp::OrMonitor
                    | CondOp::AndCapture
                    | CondOp::OrCapture => {
                        // a latched "current value" read needs a defined start
                        self.slot_mut(id).value = Value::Unknown;
                        self.enable(left, Some(id));
                    }
                    CondOp::FlipFlop => {
                        self.slot_mut(id).value = Value::Unknown;
                        self.enable(left, Some(id));
                        if right != left {
                            self.enable(right, Some(id));
                        }
                    }
                    _ if op.is_prefix() => self.enable(left, Some(id)),
                    _ => {
                        self.enable(left, Some(id));
                        if right != left {
                            self.enable(right, Some(id));
                        }
                    }
                }
            }
            // a time condition arms its timer as part of its first eval
            CellKind::Time { .. } => {}
            CellKind::Timer { .. } => {}
            CellKind::Rule(r) => {
                let cond = r.cond;
                self.enable(cond, Some(id));
            }
            CellKind::Nerve { cond, .. } => {
                let cond = *cond;
                self.enable(cond, Some(id));
            }
            CellKind::Axon(_) => {}
            CellKind::Free | CellKind::Const(_) | CellKind::Regex { .. } | CellKind::Node(_) => {}
        }
    }

    /// Unsubscribe a cell from its operands, per kind.
    fn disable_operands(&mut self, id: CellId) {
        match &self.slot(id).kind {
            CellKind::Term(t) => {
                let def = t.def;
                self.disable(def, Some(id));
            }
            CellKind::Cond { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                if op.is_prefix() {
                    self.disable(left, Some(id));
                } else {
                    self.disable(left, Some(id));
                    if right != left {
                        self.disable(right, Some(id));
                    }
                }
            }
            CellKind::Time { .. } => self.clock.clear_timer(id),
            CellKind::Timer { .. } => self.clock.clear_timer(id),
            CellKind::Rule(r) => {
                let cond = r.cond;
                self.disable(cond, Some(id));
            }
            CellKind::Nerve { cond, .. } => {
                let cond = *cond;
                self.disable(cond, Some(id));
            }
            CellKind::Axon(_) => {}
            CellKind::Free | CellKind::Const(_) | CellKind::Regex { .. } | CellKind::Node(_) => {}
        }
    }

    /// The cells subscribed to a publisher. An axon's dependents live in
    /// its ordered index rather than the general subscriber set.
    fn subscriber_ids(&self, id: CellId) -> Vec<CellId> {
        match &self.slot(id).kind {
            CellKind::Axon(a) => a.index.iter().map(|((_, c), _)| *c).collect(),
            _ => self.slot(id).subs.iter().map(|(s, _)| *s).collect(),
        }
    }

    /// Walk the subscriber set and alert every subscriber. The set is
    /// snapshotted first, so subscriber methods may mutate any subscriber
    /// set, including this one, while the walk is in progress.
    pub(crate) fn publish(&mut self, id: CellId) {
        if self.is_constant(id) {
            return;
        }
        for s in self.subscriber_ids(id) {
            self.alert_cell(s);
        }
    }

    /// Alert one cell: rules divert into the action machinery, everything
    /// else is scheduled for re-evaluation by level. `if` rules take the
    /// default path; they fire only when the hosting layer alerts them at
    /// assertion time.
    pub(crate) fn alert_cell(&mut self, id: CellId) {
        match &self.slot(id).kind {
            CellKind::Rule(r) if r.kind != RuleKind::If => self.rule_alert(id),
            _ => self.schedule_cell(id),
        }
    }

    pub(crate) fn schedule_cell(&mut self, id: CellId) {
        let slot = self.slot(id);
        if slot.kind.is_constant() || slot.scheduled {
            return;
        }
        let level = usize::from(slot.level).min(MAX_LEVELS - 1);
        self.slot_mut(id).scheduled = true;
        self.sched.push(level, id);
    }

    /// Raise the levels of all transitive subscribers of `publisher` so
    /// each sits strictly above it. Revisiting the start cell means the
    /// graph has a cycle: the offending cell is reported and pinned to
    /// level 0 to break the loop.
    pub(crate) fn raise_levels(&mut self, publisher: CellId) {
        let level = self.slot(publisher).level;
        for s in self.subscriber_ids(publisher) {
            if self.slot(s).level <= level {
                self.set_level(s, level + 1);
                self.raise_levels_from(s, publisher);
            }
        }
    }

    fn raise_levels_from(&mut self, publisher: CellId, start: CellId) {
        if publisher == start {
            error!(
                cell = %self.display(start),
                "results are undefined for circular cell expressions"
            );
            self.slot_mut(start).level = 0;
            return;
        }
        let level = self.slot(publisher).level;
        for s in self.subscriber_ids(publisher) {
            if self.slot(s).level <= level {
                self.set_level(s, level + 1);
                self.raise_levels_from(s, start);
            }
        }
    }

    fn set_level(&mut self, id: CellId, level: u16) {
        if usize::from(level) >= MAX_LEVELS {
            error!(
                cell = %self.display(id),
                level, "cell level exceeds the scheduler ceiling"
            );
            self.slot_mut(id).level = (MAX_LEVELS - 1) as u16;
        } else {
            self.slot_mut(id).level = level;
        }
    }

    /// One-shot value of a cell that may be disabled: enable without a
    /// subscriber, read, and restore. An enabled cell just returns its
    /// cached value.
    pub fn compute(&mut self, id: CellId) -> Value {
        if !self.slot(id).value.is_disabled() {
            return self.value(id);
        }
        self.enable(id, None);
        let v = self.value(id);
        self.disable(id, None);
        v
    }

    /// Drive resolution of Unknown values: recursively ask operand terms to
    /// consult their context sources, then return the (possibly improved)
    /// cached value.
    pub fn solve(&mut self, id: CellId) -> Value {
        let current = self.value(id);
        if !current.is_unknown() && !current.is_disabled() {
            return current;
        }
        match &self.slot(id).kind {
            CellKind::Term(t) => {
                let def = t.def;
                if def == CellId::UNKNOWN {
                    self.resolve_term(id);
                } else {
                    self.solve(def);
                }
            }
            CellKind::Cond { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                if op.is_prefix() || op.is_delay() || op == CondOp::Change || op == CondOp::Match {
                    self.solve(left);
                } else {
                    // one known operand may settle the result
                    if self.value(left).is_unknown() {
                        self.solve(left);
                        if !self.value(id).is_unknown() {
                            return self.value(id);
                        }
                    }
                    if self.value(right).is_unknown() {
                        self.solve(right);
                    }
                }
            }
            CellKind::Rule(r) => {
                let cond = r.cond;
                self.solve(cond);
            }
            CellKind::Nerve { cond, .. } => {
                let cond = *cond;
                self.solve(cond);
            }
            _ => {}
        }
        self.value(id)
    }
}
