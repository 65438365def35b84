//! Boundary validation for rule create/edit payloads.
//!
//! Runs before any write. Organization ownership of the target pool/owner and
//! name uniqueness need storage and are checked by the repository layer.

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::resource::RuleTarget;
use crate::error::CoreError;
use crate::types::DbId;

/// Maximum length of a rule name, in characters.
pub const MAX_RULE_NAME_LEN: usize = 256;

/// A condition as submitted by a caller, before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionInput {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub meta_info: String,
}

/// A fully validated rule, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDraft {
    pub name: String,
    pub target: RuleTarget,
    pub active: bool,
    pub conditions: Vec<Condition>,
}

/// A validated edit. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulePatch {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub target: Option<RuleTarget>,
    pub conditions: Option<Vec<Condition>>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.active.is_none()
            && self.target.is_none()
            && self.conditions.is_none()
    }
}

/// Trim and length-check a rule name.
pub fn validate_name(name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Rule name must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_RULE_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Rule name must be at most {MAX_RULE_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Parse every submitted condition. A rule needs at least one.
pub fn validate_conditions(inputs: &[ConditionInput]) -> Result<Vec<Condition>, CoreError> {
    if inputs.is_empty() {
        return Err(CoreError::Validation(
            "A rule must have at least one condition".to_string(),
        ));
    }
    inputs
        .iter()
        .map(|c| Condition::parse(&c.condition_type, &c.meta_info))
        .collect()
}

/// Validate a create payload.
pub fn validate_draft(
    name: &str,
    conditions: &[ConditionInput],
    pool_id: Option<DbId>,
    owner_id: Option<DbId>,
    active: Option<bool>,
) -> Result<RuleDraft, CoreError> {
    let target = RuleTarget::from_columns(pool_id, owner_id)?;
    let name = validate_name(name)?;
    let conditions = validate_conditions(conditions)?;
    Ok(RuleDraft {
        name,
        target,
        active: active.unwrap_or(true),
        conditions,
    })
}

/// Validate an edit payload.
///
/// When either `pool_id` or `owner_id` is supplied the target is replaced by
/// exactly that pair, so switching from a pool to an owner means sending
/// `owner_id` alone.
pub fn validate_patch(
    name: Option<&str>,
    active: Option<bool>,
    pool_id: Option<DbId>,
    owner_id: Option<DbId>,
    conditions: Option<&[ConditionInput]>,
) -> Result<RulePatch, CoreError> {
    let target = if pool_id.is_some() || owner_id.is_some() {
        Some(RuleTarget::from_columns(pool_id, owner_id)?)
    } else {
        None
    };
    Ok(RulePatch {
        name: name.map(validate_name).transpose()?,
        active,
        target,
        conditions: conditions.map(validate_conditions).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn cond(ty: &str, meta: &str) -> ConditionInput {
        ConditionInput {
            condition_type: ty.to_string(),
            meta_info: meta.to_string(),
        }
    }

    #[test]
    fn valid_draft() {
        let draft = validate_draft(
            "  QA machines ",
            &[cond("name_starts_with", "QA_")],
            Some(4),
            None,
            None,
        )
        .unwrap();
        assert_eq!(draft.name, "QA machines");
        assert_eq!(draft.target, RuleTarget::Pool(4));
        assert!(draft.active);
        assert_eq!(
            draft.conditions,
            vec![Condition::NameStartsWith("QA_".to_string())]
        );
    }

    #[test]
    fn draft_without_target_is_rejected() {
        assert_matches!(
            validate_draft("r", &[cond("name_is", "x")], None, None, None),
            Err(CoreError::Validation(msg)) if msg.contains("pool_id")
        );
    }

    #[test]
    fn draft_with_both_targets_is_rejected() {
        assert_matches!(
            validate_draft("r", &[cond("name_is", "x")], Some(1), Some(2), None),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn draft_needs_conditions() {
        assert_matches!(
            validate_draft("r", &[], Some(1), None, None),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn draft_with_unsupported_type_is_rejected() {
        assert_matches!(
            validate_draft("r", &[cond("owner_is", "x")], Some(1), None, None),
            Err(CoreError::Validation(msg)) if msg.contains("owner_is")
        );
    }

    #[test]
    fn name_rules() {
        assert_matches!(validate_name("   "), Err(CoreError::Validation(_)));
        assert_matches!(
            validate_name(&"x".repeat(MAX_RULE_NAME_LEN + 1)),
            Err(CoreError::Validation(_))
        );
        assert_eq!(
            validate_name(&"x".repeat(MAX_RULE_NAME_LEN)).unwrap().len(),
            MAX_RULE_NAME_LEN
        );
    }

    #[test]
    fn empty_patch() {
        let patch = validate_patch(None, None, None, None, None).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_replaces_target_with_supplied_pair() {
        let patch = validate_patch(None, None, None, Some(8), None).unwrap();
        assert_eq!(patch.target, Some(RuleTarget::Owner(8)));

        assert_matches!(
            validate_patch(None, None, Some(1), Some(8), None),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn patch_revalidates_conditions_and_name() {
        assert_matches!(
            validate_patch(Some(""), None, None, None, None),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            validate_patch(None, None, None, None, Some(&[])),
            Err(CoreError::Validation(_))
        );
        let patch = validate_patch(None, Some(false), None, None, Some(&[cond("tag_exists", "env")]))
            .unwrap();
        assert_eq!(patch.active, Some(false));
        assert_eq!(
            patch.conditions,
            Some(vec![Condition::TagExists("env".to_string())])
        );
    }
}
