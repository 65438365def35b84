//! Dense priority planning for an organization's assignment rules.
//!
//! Priorities are 1-based, unique and gap-free among an organization's
//! non-deleted rules; 1 is evaluated first. The functions here only compute
//! which rows must change. Applying a plan atomically (and retrying when a
//! concurrent writer got there first) is the storage layer's job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Reorder actions accepted by `update_priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityAction {
    /// Move to priority 1.
    Prioritize,
    /// Swap with the rule immediately ahead.
    Promote,
    /// Swap with the rule immediately behind.
    Demote,
    /// Move to the last priority.
    Deprioritize,
}

impl PriorityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PriorityAction::Prioritize => "prioritize",
            PriorityAction::Promote => "promote",
            PriorityAction::Demote => "demote",
            PriorityAction::Deprioritize => "deprioritize",
        }
    }
}

impl fmt::Display for PriorityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prioritize" => Ok(PriorityAction::Prioritize),
            "promote" => Ok(PriorityAction::Promote),
            "demote" => Ok(PriorityAction::Demote),
            "deprioritize" => Ok(PriorityAction::Deprioritize),
            other => Err(CoreError::Validation(format!(
                "Unsupported priority action: {other}"
            ))),
        }
    }
}

/// A rule's current priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RulePriority {
    pub rule_id: DbId,
    pub priority: i32,
}

/// One row of a priority plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriorityChange {
    pub rule_id: DbId,
    pub from: i32,
    pub to: i32,
}

/// Priority for a rule created into an organization that already has
/// `existing` non-deleted rules.
pub fn next_priority(existing: i64) -> Result<i32, CoreError> {
    i32::try_from(existing + 1)
        .map_err(|_| CoreError::Internal(format!("Rule count {existing} exceeds priority range")))
}

/// Whether `priorities` is exactly `{1, ..., N}`.
pub fn is_dense(priorities: impl IntoIterator<Item = i32>) -> bool {
    let mut sorted: Vec<i32> = priorities.into_iter().collect();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(idx, priority)| i64::from(*priority) == idx as i64 + 1)
}

/// Changes needed after the rule at `removed_priority` was deleted:
/// everything behind it moves up by one.
pub fn plan_compaction(remaining: &[RulePriority], removed_priority: i32) -> Vec<PriorityChange> {
    let mut changes: Vec<PriorityChange> = remaining
        .iter()
        .filter(|r| r.priority > removed_priority)
        .map(|r| PriorityChange {
            rule_id: r.rule_id,
            from: r.priority,
            to: r.priority - 1,
        })
        .collect();
    changes.sort_by_key(|c| c.from);
    changes
}

/// Changes needed to apply `action` to `rule_id`.
///
/// The plan renumbers the organization to `1..N` in the new order and lists
/// only the rows whose priority actually moves. Boundary no-ops (promoting
/// the first rule, demoting the last) yield an empty plan.
pub fn plan_reorder(
    current: &[RulePriority],
    rule_id: DbId,
    action: PriorityAction,
) -> Result<Vec<PriorityChange>, CoreError> {
    let mut ordered: Vec<RulePriority> = current.to_vec();
    ordered.sort_by_key(|r| (r.priority, r.rule_id));

    let idx = ordered
        .iter()
        .position(|r| r.rule_id == rule_id)
        .ok_or(CoreError::NotFound {
            entity: "AssignmentRule",
            id: rule_id,
        })?;
    let last = ordered.len() - 1;

    match action {
        PriorityAction::Prioritize => {
            let rule = ordered.remove(idx);
            ordered.insert(0, rule);
        }
        PriorityAction::Deprioritize => {
            let rule = ordered.remove(idx);
            ordered.push(rule);
        }
        PriorityAction::Promote if idx > 0 => ordered.swap(idx, idx - 1),
        PriorityAction::Demote if idx < last => ordered.swap(idx, idx + 1),
        PriorityAction::Promote | PriorityAction::Demote => {}
    }

    let mut changes = Vec::new();
    for (pos, rule) in ordered.iter().enumerate() {
        let to = i32::try_from(pos + 1)
            .map_err(|_| CoreError::Internal("Rule count exceeds priority range".to_string()))?;
        if rule.priority != to {
            changes.push(PriorityChange {
                rule_id: rule.rule_id,
                from: rule.priority,
                to,
            });
        }
    }
    Ok(changes)
}
