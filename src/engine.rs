//! The engine: one struct owning every shared table.
//!
//! Heap, intern tables, glossary root, evaluation vector, timer queue,
//! change list, and action queue all live here and are threaded through
//! every operation, so a process can run several independent engines.
//!
//! The external shape: an assertion stream comes in through
//! [`Engine::assert`] (or `define_term`/`assign_term` plus
//! [`Engine::react`]), and a command stream of [`Firing`]s goes out to the
//! hosting dispatcher, which acknowledges each with [`Engine::complete`].

use crate::cell::{CellId, CellKind, CondOp, TermData};
use crate::clock::{Clock, Schedule};
use crate::error::{EngineError, Result};
use crate::heap::{Heap, PERMANENT};
use crate::rule::Firing;
use crate::sched::Sched;
use crate::value::Value;

pub struct Engine {
    pub(crate) heap: Heap,
    pub(crate) sched: Sched,
    pub(crate) clock: Clock,
    /// Change conditions awaiting their once-per-cycle reset.
    pub(crate) changes: Vec<CellId>,
    /// Actions fired during the current drain.
    pub(crate) fired: Vec<crate::cell::ActionId>,
    pub(crate) if_rules: Vec<CellId>,
    pub(crate) root: CellId,
    pub(crate) sym_context: Option<CellId>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Engine {
        let mut engine = Engine {
            heap: Heap::default(),
            sched: Sched::default(),
            clock: Clock::default(),
            changes: Vec::new(),
            fired: Vec::new(),
            if_rules: Vec::new(),
            root: CellId::UNKNOWN,
            sym_context: None,
        };
        // sentinel cells at fixed ids, in CellId constant order
        for v in [
            Value::Unknown,
            Value::Placeholder,
            Value::Bool(true),
            Value::Bool(false),
        ] {
            let id = engine.heap.new_cell(CellKind::Const(v));
            engine.slot_mut(id).refcnt = PERMANENT;
        }
        let node = engine
            .heap
            .new_cell(CellKind::Node(crate::cell::NodeData { source: None }));
        engine.slot_mut(node).refcnt = PERMANENT;
        let root = engine.heap.new_cell(CellKind::Term(TermData {
            parent: None,
            name: "_".into(),
            def: node,
            gloss: crate::avl::Avl::new(),
        }));
        engine.slot_mut(root).refcnt = PERMANENT;
        engine.root = root;
        engine
    }

    /// The root context.
    pub fn root(&self) -> CellId {
        self.root
    }

    /// Set the context addressed by the `%` prefix.
    pub fn set_symbolic_context(&mut self, context: Option<CellId>) {
        self.sym_context = context;
    }

    /// Drive propagation to quiescence and hand back the rule firings in
    /// priority order. Each returned action stays `Scheduled` until the
    /// dispatcher acknowledges it with [`Engine::complete`].
    pub fn react(&mut self) -> Vec<Firing> {
        self.react_drain();
        self.take_firings()
    }

    /// Apply a batch of assertions in a context, then react once.
    pub fn assert(&mut self, context: CellId, pairs: &[(&str, CellId)]) -> Result<Vec<Firing>> {
        for (name, def) in pairs {
            self.define_term(context, name, *def)?;
        }
        Ok(self.react())
    }

    /// Schedule-driven condition cell, true while the schedule is.
    pub fn make_time_condition(&mut self, sched: Schedule) -> CellId {
        self.heap.new_cell(CellKind::Time { sched })
    }

    /// Delay condition: passes its operand through, except that entry into
    /// the delayed state is reported only after the schedule's interval
    /// elapses without the operand leaving the state.
    pub fn make_delay_condition(
        &mut self,
        op: CondOp,
        left: CellId,
        sched: Schedule,
    ) -> Result<CellId> {
        if !op.is_delay() {
            return Err(EngineError::NotADelay(op.symbol().to_string()));
        }
        let timer = self.heap.new_cell(CellKind::Timer { sched });
        Ok(self.make_condition(op, left, timer))
    }
}
