//! Symbolic rendering of cells.
//!
//! Cells only make sense next to the engine that owns them, so rendering
//! goes through a borrowing wrapper that implements `Display`. Terms print
//! their qualified name, conditions their operator form, schedules their
//! literal form.

use std::fmt;

use crate::cell::{AxonKind, CellId, CellKind, CondOp, RuleKind};
use crate::engine::Engine;

pub struct CellDisplay<'a> {
    engine: &'a Engine,
    id: CellId,
}

impl Engine {
    /// Symbolic representation of a cell.
    pub fn display(&self, id: CellId) -> String {
        CellDisplay { engine: self, id }.to_string()
    }
}

impl fmt::Display for CellDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_cell(self.engine, self.id, f)
    }
}

fn fmt_cell(e: &Engine, id: CellId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &e.slot(id).kind {
        CellKind::Free => write!(f, "(freed)"),
        CellKind::Const(v) => write!(f, "{}", v),
        CellKind::Regex { source, .. } => write!(f, "\"{}\"", source),
        CellKind::Node(n) => match &n.source {
            Some(s) => write!(f, "node({})", s),
            None => write!(f, "node"),
        },
        CellKind::Term(_) => write!(f, "{}", e.term_name(id)),
        CellKind::Time { sched } => write!(f, "~({})", sched),
        CellKind::Timer { sched } => write!(f, "~({})", sched),
        CellKind::Rule(r) => {
            let kind = match r.kind {
                RuleKind::On => "on",
                RuleKind::When => "when",
                RuleKind::If => "if",
            };
            write!(f, "{}(", kind)?;
            fmt_cell(e, r.cond, f)?;
            let action = e.action(r.action);
            if action.command.is_empty() {
                write!(f, ")")
            } else {
                write!(f, "):{}", action.command)
            }
        }
        CellKind::Nerve { cond, name } => {
            write!(f, "nerve {} (", name)?;
            fmt_cell(e, *cond, f)?;
            write!(f, ")")
        }
        CellKind::Axon(a) => {
            let name = match a.kind {
                AxonKind::RelEq => "AxonRelEq",
                AxonKind::RelLtReal => "AxonRelLtReal",
                AxonKind::RelGtReal => "AxonRelGtReal",
                AxonKind::RelLtStr => "AxonRelLtString",
                AxonKind::RelGtStr => "AxonRelGtString",
            };
            write!(f, "{}(", name)?;
            fmt_cell(e, a.publisher, f)?;
            write!(f, ")")
        }
        CellKind::Cond { op, left, right } => {
            let (op, left, right) = (*op, *left, *right);
            match op {
                _ if op.is_prefix() => {
                    write!(f, "{}(", op.symbol())?;
                    fmt_cell(e, left, f)?;
                    write!(f, ")")
                }
                CondOp::Change => {
                    write!(f, "~=(")?;
                    fmt_cell(e, left, f)?;
                    write!(f, ")")
                }
                CondOp::Match => {
                    write!(f, "(")?;
                    fmt_cell(e, left, f)?;
                    write!(f, "~")?;
                    fmt_cell(e, right, f)?;
                    write!(f, ")")
                }
                _ => {
                    write!(f, "(")?;
                    fmt_cell(e, left, f)?;
                    write!(f, "{}", op.symbol())?;
                    fmt_cell(e, right, f)?;
                    write!(f, ")")
                }
            }
        }
    }
}
