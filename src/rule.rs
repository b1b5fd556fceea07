//! Rules and their action records.
//!
//! A rule is a cell whose antecedent transition queues an action for the
//! external command dispatcher. Rules are alerted from the publish path
//! (except `if` rules, which the hosting layer alerts at assertion time)
//! and bypass the ordinary schedule-and-eval cycle: the alert inspects the
//! antecedent's new value directly, fires when appropriate, mirrors the
//! truth onto the rule's own value, and publishes.
//!
//! Action status discipline: `Ready` → fire → `Scheduled` (handed to the
//! dispatcher) → `complete` → `Ready`. Alerting a rule whose action is
//! still `Scheduled` is a cycle: the action is marked `Error` and never
//! fires again until redefined.

use serde::Serialize;
use tracing::{error, info};

use crate::cell::{ActionId, CellId, CellKind, RuleData, RuleKind};
use crate::engine::Engine;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionStatus {
    Ready,
    Scheduled,
    Error,
    Deleted,
}

/// The consequent of a rule: assertions to apply and a command to run,
/// dispatched in the rule's context.
#[derive(Debug)]
pub struct Action {
    pub context: CellId,
    pub command: String,
    /// `(term name, definition)` pairs the dispatcher asserts before
    /// running the command.
    pub assertions: Vec<(String, CellId)>,
    pub priority: i8,
    pub status: ActionStatus,
    pub rule: CellId,
}

/// One queued firing, emitted to the external dispatcher at the end of a
/// `react` cycle. The dispatcher applies the assertions, runs the command,
/// and then acknowledges with [`Engine::complete`].
#[derive(Debug, Clone, Serialize)]
pub struct Firing {
    pub action: ActionId,
    pub context: CellId,
    pub command: String,
    pub assertions: Vec<(String, CellId)>,
    pub priority: i8,
}

impl Engine {
    /// Define a rule over an antecedent cell. The antecedent is enabled
    /// immediately; the rule's value mirrors it as True/False/Unknown.
    pub fn make_rule(
        &mut self,
        kind: RuleKind,
        cond: CellId,
        context: CellId,
        command: impl Into<String>,
        assertions: Vec<(String, CellId)>,
        priority: i8,
    ) -> CellId {
        let action = ActionId(self.heap.actions.len() as u32);
        self.heap.actions.push(Action {
            context,
            command: command.into(),
            assertions,
            priority,
            status: ActionStatus::Ready,
            rule: CellId::UNKNOWN,
        });
        let rule = self.heap.new_cell(CellKind::Rule(RuleData {
            kind,
            cond,
            action,
            last: Value::Disabled,
        }));
        self.action_mut(action).rule = rule;
        self.grab(cond);
        if !self.is_constant(cond) {
            let level = self.slot(cond).level + 1;
            self.slot_mut(rule).level = level;
            self.enable(cond, Some(rule));
        }
        let cv = self.value(cond);
        self.slot_mut(rule).value = if cv.is_unknown() || cv.is_false() {
            cv.clone()
        } else {
            Value::TRUE
        };
        if let CellKind::Rule(r) = &mut self.slot_mut(rule).kind {
            r.last = cv;
        }
        if kind == RuleKind::If {
            self.if_rules.push(rule);
        }
        rule
    }

    /// Define a nerve: it logs every value change of its antecedent and
    /// passes the value through unchanged.
    pub fn make_nerve(&mut self, cond: CellId, name: &str) -> CellId {
        let nerve = self.heap.new_cell(CellKind::Nerve {
            cond,
            name: name.into(),
        });
        self.grab(cond);
        if !self.is_constant(cond) {
            let level = self.slot(cond).level + 1;
            self.slot_mut(nerve).level = level;
            self.enable(cond, Some(nerve));
        }
        let cv = self.value(cond);
        self.slot_mut(nerve).value = if cv.is_unknown() || cv.is_false() {
            cv
        } else {
            Value::TRUE
        };
        nerve
    }

    /// Alert method for rules, run from the publish walk instead of the
    /// scheduler. Fires on any transition to a true value, including a
    /// transition between two distinct true values, and detects firing
    /// cycles through the action status.
    pub(crate) fn rule_alert(&mut self, rule: CellId) {
        let (cond, action, last) = match &self.slot(rule).kind {
            CellKind::Rule(r) => (r.cond, r.action, r.last.clone()),
            _ => return,
        };
        let v = self.value(cond);
        let status = self.action(action).status;
        if v.is_unknown() || v.is_false() {
            if status == ActionStatus::Scheduled {
                error!(
                    rule = %self.display(rule),
                    "cycle error - condition untrue before firing"
                );
                self.action_mut(action).status = ActionStatus::Error;
            }
            self.slot_mut(rule).value = v.clone();
        } else if status != ActionStatus::Ready {
            error!(
                rule = %self.display(rule),
                status = ?status,
                "cycle error - repetitive firing suppressed"
            );
            self.action_mut(action).status = ActionStatus::Error;
            self.slot_mut(rule).value = v.clone();
        } else if !self.value(rule).same(&Value::TRUE) || !last.same(&v) {
            self.action_mut(action).status = ActionStatus::Scheduled;
            self.fired.push(action);
            self.slot_mut(rule).value = Value::TRUE;
        }
        if let CellKind::Rule(r) = &mut self.slot_mut(rule).kind {
            r.last = v;
        }
        self.publish(rule);
    }

    /// Collect the actions fired during the drain just completed, in
    /// priority order (stable within equal priority). Their status stays
    /// `Scheduled` until the dispatcher acknowledges with
    /// [`Engine::complete`].
    pub(crate) fn take_firings(&mut self) -> Vec<Firing> {
        let fired = std::mem::take(&mut self.fired);
        let mut out: Vec<Firing> = fired
            .into_iter()
            .filter(|a| self.action(*a).status == ActionStatus::Scheduled)
            .map(|a| {
                let act = self.action(a);
                Firing {
                    action: a,
                    context: act.context,
                    command: act.command.clone(),
                    assertions: act.assertions.clone(),
                    priority: act.priority,
                }
            })
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        out
    }

    /// Dispatcher acknowledgement: the action ran. A `when` rule is
    /// removed after its first completed firing.
    pub fn complete(&mut self, action: ActionId) {
        if self.action(action).status != ActionStatus::Scheduled {
            return;
        }
        self.action_mut(action).status = ActionStatus::Ready;
        let rule = self.action(action).rule;
        let one_shot = matches!(
            &self.slot(rule).kind,
            CellKind::Rule(r) if r.kind == RuleKind::When
        );
        if one_shot {
            self.remove_rule(rule);
        }
    }

    /// Apply a firing's assertion list in its context and react. Cycle
    /// errors surface here: an assertion that re-alerts the still-scheduled
    /// rule marks its action `Error` instead of looping.
    pub fn apply_assertions(&mut self, firing: &Firing) -> Vec<Firing> {
        for (name, def) in &firing.assertions {
            let context = firing.context;
            if let Err(e) = self.define_term(context, name, *def) {
                error!(term = %name, "assertion failed: {e}");
            }
        }
        self.react()
    }

    /// Alert every `if` rule bound to the given context, then react.
    /// The hosting layer calls this at assertion time; `if` rules are not
    /// alerted from the publish path.
    pub fn alert_if_rules(&mut self, context: CellId) -> Vec<Firing> {
        let rules: Vec<CellId> = self
            .if_rules
            .iter()
            .copied()
            .filter(|r| match &self.slot(*r).kind {
                CellKind::Rule(data) => self.action(data.action).context == context,
                _ => false,
            })
            .collect();
        for rule in rules {
            self.rule_alert(rule);
        }
        self.react()
    }

    /// Detach a rule from the graph: unsubscribe from the antecedent and
    /// retire the action.
    pub(crate) fn remove_rule(&mut self, rule: CellId) {
        let (cond, action) = match &self.slot(rule).kind {
            CellKind::Rule(r) => (r.cond, r.action),
            _ => return,
        };
        info!(rule = %self.display(rule), "rule removed");
        self.disable(cond, Some(rule));
        self.action_mut(action).status = ActionStatus::Deleted;
        self.slot_mut(rule).value = Value::Disabled;
        self.if_rules.retain(|r| *r != rule);
    }

    pub(crate) fn retire_action(&mut self, action: ActionId) {
        self.action_mut(action).status = ActionStatus::Deleted;
    }

    pub fn action_status(&self, action: ActionId) -> ActionStatus {
        self.action(action).status
    }
}
