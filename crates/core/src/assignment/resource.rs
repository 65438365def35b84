//! Resource projection and assignment targets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Read-only view of a cloud resource, as supplied by the resource inventory.
///
/// Carries exactly the attributes condition types test against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceView {
    pub id: DbId,
    pub name: String,
    pub resource_type: String,
    pub cloud_type: String,
    pub region: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// The pool/owner a resource is currently assigned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub pool_id: Option<DbId>,
    pub owner_id: Option<DbId>,
}

/// What a rule assigns a matching resource to. Exactly one of pool or owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RuleTarget {
    Pool(DbId),
    Owner(DbId),
}

impl RuleTarget {
    /// Build a target from the nullable `pool_id` / `owner_id` column pair.
    ///
    /// Fails with a validation error unless exactly one of them is set.
    pub fn from_columns(pool_id: Option<DbId>, owner_id: Option<DbId>) -> Result<Self, CoreError> {
        match (pool_id, owner_id) {
            (Some(pool_id), None) => Ok(RuleTarget::Pool(pool_id)),
            (None, Some(owner_id)) => Ok(RuleTarget::Owner(owner_id)),
            (None, None) => Err(CoreError::Validation(
                "A rule must target either a pool_id or an owner_id".to_string(),
            )),
            (Some(_), Some(_)) => Err(CoreError::Validation(
                "A rule must target only one of pool_id or owner_id".to_string(),
            )),
        }
    }

    pub fn pool_id(&self) -> Option<DbId> {
        match self {
            RuleTarget::Pool(id) => Some(*id),
            RuleTarget::Owner(_) => None,
        }
    }

    pub fn owner_id(&self) -> Option<DbId> {
        match self {
            RuleTarget::Owner(id) => Some(*id),
            RuleTarget::Pool(_) => None,
        }
    }

    /// The assignment a resource ends up with once this target is applied.
    ///
    /// Only the targeted half of the assignment changes.
    pub fn apply(&self, current: Assignment) -> Assignment {
        match self {
            RuleTarget::Pool(id) => Assignment {
                pool_id: Some(*id),
                ..current
            },
            RuleTarget::Owner(id) => Assignment {
                owner_id: Some(*id),
                ..current
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn from_columns_accepts_exactly_one() {
        assert_eq!(
            RuleTarget::from_columns(Some(3), None).unwrap(),
            RuleTarget::Pool(3)
        );
        assert_eq!(
            RuleTarget::from_columns(None, Some(9)).unwrap(),
            RuleTarget::Owner(9)
        );
    }

    #[test]
    fn from_columns_rejects_neither_and_both() {
        assert_matches!(
            RuleTarget::from_columns(None, None),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            RuleTarget::from_columns(Some(1), Some(2)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn apply_pool_keeps_owner() {
        let current = Assignment {
            pool_id: Some(1),
            owner_id: Some(7),
        };
        let next = RuleTarget::Pool(2).apply(current);
        assert_eq!(next.pool_id, Some(2));
        assert_eq!(next.owner_id, Some(7));
    }

    #[test]
    fn apply_owner_keeps_pool() {
        let current = Assignment {
            pool_id: Some(1),
            owner_id: None,
        };
        let next = RuleTarget::Owner(5).apply(current);
        assert_eq!(next.pool_id, Some(1));
        assert_eq!(next.owner_id, Some(5));
    }
}
