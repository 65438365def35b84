//! Assignment rule and condition models and DTOs.

use costkeeper_core::assignment::condition::Condition;
use costkeeper_core::assignment::matcher::CompiledRule;
use costkeeper_core::assignment::priority::PriorityAction;
use costkeeper_core::assignment::resource::{Assignment, RuleTarget};
use costkeeper_core::assignment::validation::ConditionInput;
use costkeeper_core::error::CoreError;
use costkeeper_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `assignment_rules` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssignmentRule {
    pub id: DbId,
    pub organization_id: DbId,
    pub name: String,
    pub priority: i32,
    pub active: bool,
    pub pool_id: Option<DbId>,
    pub owner_id: Option<DbId>,
    pub creator_id: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AssignmentRule {
    pub fn target(&self) -> Result<RuleTarget, CoreError> {
        RuleTarget::from_columns(self.pool_id, self.owner_id)
    }
}

/// A row from the `assignment_conditions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssignmentCondition {
    pub id: DbId,
    pub rule_id: DbId,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub condition_type: String,
    pub meta_info: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A rule together with its live conditions, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentRuleWithConditions {
    #[serde(flatten)]
    pub rule: AssignmentRule,
    pub conditions: Vec<AssignmentCondition>,
}

impl AssignmentRuleWithConditions {
    /// Parse the stored rows into matcher form.
    ///
    /// Stored rows were validated on write, so a failure here means the table
    /// was edited behind the service's back.
    pub fn compile(&self) -> Result<CompiledRule, CoreError> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| Condition::parse(&c.condition_type, &c.meta_info))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                CoreError::Internal(format!("Stored rule {} is malformed: {e}", self.rule.id))
            })?;
        let target = self.rule.target().map_err(|e| {
            CoreError::Internal(format!("Stored rule {} is malformed: {e}", self.rule.id))
        })?;
        Ok(CompiledRule {
            id: self.rule.id,
            priority: self.rule.priority,
            active: self.rule.active,
            target,
            conditions,
        })
    }
}

/// DTO for creating a rule.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAssignmentRule {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1))]
    pub conditions: Vec<ConditionInput>,
    #[validate(range(min = 1))]
    pub pool_id: Option<DbId>,
    #[validate(range(min = 1))]
    pub owner_id: Option<DbId>,
    pub active: Option<bool>,
}

/// DTO for editing a rule. All fields optional; priority is not editable.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateAssignmentRule {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    pub active: Option<bool>,
    #[validate(range(min = 1))]
    pub pool_id: Option<DbId>,
    #[validate(range(min = 1))]
    pub owner_id: Option<DbId>,
    pub conditions: Option<Vec<ConditionInput>>,
}

/// Query filters for listing an organization's rules.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RuleListFilter {
    pub pool_id: Option<DbId>,
    pub owner_id: Option<DbId>,
    /// Keep only rules whose target pool or owner still exists.
    #[serde(default)]
    pub valid_only: bool,
}

/// Body of `POST /assignment-rules/{id}/priority`.
///
/// `action` is kept as text so an unknown action surfaces as a validation
/// error rather than a body rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct PriorityUpdateRequest {
    pub action: String,
}

impl PriorityUpdateRequest {
    pub fn action(&self) -> Result<PriorityAction, CoreError> {
        self.action.parse()
    }
}

/// Body of `POST /organizations/{org_id}/assignment-rules/reapply`.
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct ReapplyRequest {
    #[validate(range(min = 1))]
    pub pool_id: DbId,
    #[serde(default)]
    pub include_children: bool,
}

/// Result of previewing which rule would claim a resource.
#[derive(Debug, Clone, Serialize)]
pub struct RuleMatchPreview {
    pub resource_id: DbId,
    pub rule: Option<AssignmentRuleWithConditions>,
    pub current: Assignment,
    pub proposed: Assignment,
}
