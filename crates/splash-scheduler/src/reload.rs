//! Config reload reconciliation: carry runtime state across a model swap.
//!
//! The new model is a freshly parsed value, so rules are matched by
//! structural identity (`RuleId`), never by object identity.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use splash_core::model::{Rule, RuleId, RuleModel};

use crate::runtime::RuleRuntimeState;

/// What a reload did to the runtime table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    /// Rules present before and after with identical trigger; state kept.
    pub kept: usize,
    /// New or edited rules; state re-armed.
    pub added: usize,
    /// Rules that disappeared; state dropped.
    pub removed: usize,
}

/// Rebuild `runtime` for `new`. Unchanged rules keep their state, every other
/// rule of `new` is re-armed at `now`, and state of vanished rules is dropped.
pub fn reconcile(
    old: &RuleModel,
    new: &RuleModel,
    runtime: &mut HashMap<RuleId, RuleRuntimeState>,
    now: NaiveDateTime,
) -> ReloadSummary {
    let mut summary = ReloadSummary::default();
    let mut next = HashMap::with_capacity(new.len());

    for rule in &new.rules {
        let carried = old
            .get(&rule.id)
            .filter(|prev| same_trigger(prev, rule))
            .and_then(|_| runtime.remove(&rule.id));
        match carried {
            Some(state) => {
                summary.kept += 1;
                next.insert(rule.id.clone(), state);
            }
            None => {
                summary.added += 1;
                next.insert(rule.id.clone(), RuleRuntimeState::rearmed(rule, now));
            }
        }
    }

    summary.removed = old
        .rules
        .iter()
        .filter(|r| new.get(&r.id).is_none())
        .count();

    *runtime = next;
    summary
}

fn same_trigger(a: &Rule, b: &Rule) -> bool {
    a.kind == b.kind && a.message == b.message
}
