//! First-match resolution over priority-ordered rules.

use super::condition::{CaseMode, Condition};
use super::resource::{ResourceView, RuleTarget};
use crate::types::DbId;

/// A rule in evaluation form: conditions already parsed, target validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub id: DbId,
    pub priority: i32,
    pub active: bool,
    pub target: RuleTarget,
    pub conditions: Vec<Condition>,
}

impl CompiledRule {
    /// True when every condition matches (logical AND).
    pub fn matches(&self, resource: &ResourceView, case: CaseMode) -> bool {
        self.conditions.iter().all(|c| c.matches(resource, case))
    }
}

/// Scan `rules` in the given order and return the first active rule whose
/// conditions all match.
///
/// Callers must pass rules sorted by ascending priority; [`RuleSet`] does this
/// for you.
pub fn first_match<'a>(
    rules: &'a [CompiledRule],
    resource: &ResourceView,
    case: CaseMode,
) -> Option<&'a CompiledRule> {
    rules
        .iter()
        .filter(|rule| rule.active)
        .find(|rule| rule.matches(resource, case))
}

/// An organization's rules, held in ascending priority order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    case: CaseMode,
}

impl RuleSet {
    pub fn new(mut rules: Vec<CompiledRule>, case: CaseMode) -> Self {
        rules.sort_by_key(|rule| (rule.priority, rule.id));
        Self { rules, case }
    }

    /// The highest-precedence active rule matching `resource`, if any.
    pub fn select(&self, resource: &ResourceView) -> Option<&CompiledRule> {
        first_match(&self.rules, resource, self.case)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }
}
