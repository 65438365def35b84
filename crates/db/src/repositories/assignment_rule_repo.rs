//! Repository for the `assignment_rules` and `assignment_conditions` tables.

use std::collections::HashMap;

use costkeeper_core::assignment::condition::Condition;
use costkeeper_core::assignment::matcher::CompiledRule;
use costkeeper_core::assignment::priority::{next_priority, plan_compaction, RulePriority};
use costkeeper_core::assignment::resource::RuleTarget;
use costkeeper_core::assignment::retry::{retry_on_conflict, Attempt, RetryPolicy};
use costkeeper_core::assignment::validation::{RuleDraft, RulePatch};
use costkeeper_core::error::CoreError;
use costkeeper_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{conflict_as_retry, name_conflict_or, RepoError};
use crate::models::assignment_rule::{
    AssignmentCondition, AssignmentRule, AssignmentRuleWithConditions, RuleListFilter,
};
use crate::repositories::{OrganizationRepo, PoolRepo, RulePriorityRepo};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, organization_id, name, priority, active, pool_id, owner_id, \
    creator_id, created_at, updated_at";

/// Column list for the `assignment_conditions` table.
const CONDITION_COLUMNS: &str = "id, rule_id, type, meta_info, created_at, updated_at";

fn rule_not_found(id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "AssignmentRule",
        id,
    }
}

/// Provides lifecycle operations for assignment rules and their conditions.
pub struct AssignmentRuleRepo;

impl AssignmentRuleRepo {
    // ── Reads ────────────────────────────────────────────────────────

    /// Find a live rule by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AssignmentRule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM assignment_rules WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, AssignmentRule>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a live rule with its conditions.
    pub async fn find_with_conditions(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<AssignmentRuleWithConditions>, sqlx::Error> {
        let Some(rule) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        Ok(Self::attach_conditions(pool, vec![rule]).await?.pop())
    }

    /// List an organization's live rules in priority order.
    ///
    /// `valid_only` drops rules whose target pool or owner has since been
    /// removed.
    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
        filter: &RuleListFilter,
    ) -> Result<Vec<AssignmentRuleWithConditions>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM assignment_rules r
             WHERE r.organization_id = $1
               AND r.deleted_at IS NULL
               AND ($2::bigint IS NULL OR r.pool_id = $2)
               AND ($3::bigint IS NULL OR r.owner_id = $3)
               AND (NOT $4
                    OR EXISTS (SELECT 1 FROM pools p
                               WHERE p.id = r.pool_id AND p.deleted_at IS NULL)
                    OR EXISTS (SELECT 1 FROM employees e
                               WHERE e.id = r.owner_id AND e.deleted_at IS NULL))
             ORDER BY r.priority, r.id"
        );
        let rules = sqlx::query_as::<_, AssignmentRule>(&query)
            .bind(organization_id)
            .bind(filter.pool_id)
            .bind(filter.owner_id)
            .bind(filter.valid_only)
            .fetch_all(pool)
            .await?;
        Self::attach_conditions(pool, rules).await
    }

    /// An organization's active rules in matcher form, priority order.
    pub async fn compile_active(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<CompiledRule>, RepoError> {
        let query = format!(
            "SELECT {COLUMNS} FROM assignment_rules
             WHERE organization_id = $1 AND active = true AND deleted_at IS NULL
             ORDER BY priority, id"
        );
        let rules = sqlx::query_as::<_, AssignmentRule>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await?;
        let rules = Self::attach_conditions(pool, rules).await?;
        Ok(rules
            .iter()
            .map(AssignmentRuleWithConditions::compile)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn attach_conditions(
        pool: &PgPool,
        rules: Vec<AssignmentRule>,
    ) -> Result<Vec<AssignmentRuleWithConditions>, sqlx::Error> {
        if rules.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<DbId> = rules.iter().map(|r| r.id).collect();
        let query = format!(
            "SELECT {CONDITION_COLUMNS} FROM assignment_conditions
             WHERE rule_id = ANY($1) AND deleted_at IS NULL
             ORDER BY rule_id, id"
        );
        let conditions = sqlx::query_as::<_, AssignmentCondition>(&query)
            .bind(&ids)
            .fetch_all(pool)
            .await?;

        let mut by_rule: HashMap<DbId, Vec<AssignmentCondition>> = HashMap::new();
        for condition in conditions {
            by_rule.entry(condition.rule_id).or_default().push(condition);
        }
        Ok(rules
            .into_iter()
            .map(|rule| {
                let conditions = by_rule.remove(&rule.id).unwrap_or_default();
                AssignmentRuleWithConditions { rule, conditions }
            })
            .collect())
    }

    /// Whether another live rule in the organization already uses `name`.
    pub async fn name_taken(
        pool: &PgPool,
        organization_id: DbId,
        name: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM assignment_rules
                WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL
                  AND ($3::bigint IS NULL OR id <> $3)
             )",
        )
        .bind(organization_id)
        .bind(name)
        .bind(exclude_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// Fail with `NotFound` unless the target pool or employee belongs to the
    /// organization.
    pub async fn check_target(
        pool: &PgPool,
        organization_id: DbId,
        target: RuleTarget,
    ) -> Result<(), RepoError> {
        match target {
            RuleTarget::Pool(pool_id) => {
                if PoolRepo::find_in_org(pool, organization_id, pool_id)
                    .await?
                    .is_none()
                {
                    return Err(CoreError::NotFound {
                        entity: "Pool",
                        id: pool_id,
                    }
                    .into());
                }
            }
            RuleTarget::Owner(owner_id) => {
                if !OrganizationRepo::employee_exists(pool, organization_id, owner_id).await? {
                    return Err(CoreError::NotFound {
                        entity: "Employee",
                        id: owner_id,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Insert a validated rule at the end of the organization's priority list.
    ///
    /// Concurrent creates race for the same priority; the loser retries.
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        creator_id: DbId,
        draft: &RuleDraft,
        policy: RetryPolicy,
    ) -> Result<AssignmentRuleWithConditions, RepoError> {
        OrganizationRepo::ensure_exists(pool, organization_id).await?;
        Self::check_target(pool, organization_id, draft.target).await?;
        if Self::name_taken(pool, organization_id, &draft.name, None).await? {
            return Err(CoreError::Conflict(format!(
                "An assignment rule named '{}' already exists",
                draft.name
            ))
            .into());
        }

        retry_on_conflict(policy, "create_assignment_rule", move |_| async move {
            conflict_as_retry(Self::try_create(pool, organization_id, creator_id, draft).await)
        })
        .await
    }

    async fn try_create(
        pool: &PgPool,
        organization_id: DbId,
        creator_id: DbId,
        draft: &RuleDraft,
    ) -> Result<Attempt<AssignmentRuleWithConditions>, RepoError> {
        let mut tx = pool.begin().await?;

        let existing = RulePriorityRepo::lock(&mut tx, organization_id).await?;
        let priority = next_priority(existing.len() as i64)?;

        let query = format!(
            "INSERT INTO assignment_rules
                (organization_id, name, priority, active, pool_id, owner_id, creator_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        let rule = sqlx::query_as::<_, AssignmentRule>(&query)
            .bind(organization_id)
            .bind(&draft.name)
            .bind(priority)
            .bind(draft.active)
            .bind(draft.target.pool_id())
            .bind(draft.target.owner_id())
            .bind(creator_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| name_conflict_or(e, &draft.name))?;

        let conditions = Self::insert_conditions(&mut tx, rule.id, &draft.conditions).await?;

        if !RulePriorityRepo::is_dense_in(&mut tx, organization_id).await? {
            return Ok(Attempt::Conflict);
        }
        tx.commit().await?;

        Ok(Attempt::Done(AssignmentRuleWithConditions { rule, conditions }))
    }

    async fn insert_conditions(
        tx: &mut Transaction<'_, Postgres>,
        rule_id: DbId,
        conditions: &[Condition],
    ) -> Result<Vec<AssignmentCondition>, sqlx::Error> {
        let query = format!(
            "INSERT INTO assignment_conditions (rule_id, type, meta_info)
             VALUES ($1, $2, $3)
             RETURNING {CONDITION_COLUMNS}"
        );
        let mut rows = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let row = sqlx::query_as::<_, AssignmentCondition>(&query)
                .bind(rule_id)
                .bind(condition.condition_type().as_str())
                .bind(condition.meta_info())
                .fetch_one(&mut **tx)
                .await?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Apply a validated patch. Conditions, when present, replace the old set.
    /// An empty patch writes nothing and returns the rule as stored.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        patch: &RulePatch,
    ) -> Result<AssignmentRuleWithConditions, RepoError> {
        if patch.is_empty() {
            return Self::find_with_conditions(pool, id)
                .await?
                .ok_or_else(|| rule_not_found(id).into());
        }

        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| rule_not_found(id))?;
        let organization_id = existing.organization_id;

        if let Some(target) = patch.target {
            Self::check_target(pool, organization_id, target).await?;
        }
        if let Some(name) = patch.name.as_deref() {
            if name != existing.name
                && Self::name_taken(pool, organization_id, name, Some(id)).await?
            {
                return Err(CoreError::Conflict(format!(
                    "An assignment rule named '{name}' already exists"
                ))
                .into());
            }
        }

        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE assignment_rules SET
                name = COALESCE($2, name),
                active = COALESCE($3, active),
                pool_id = CASE WHEN $4 THEN $5::bigint ELSE pool_id END,
                owner_id = CASE WHEN $4 THEN $6::bigint ELSE owner_id END
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        let rule = sqlx::query_as::<_, AssignmentRule>(&query)
            .bind(id)
            .bind(patch.name.as_deref())
            .bind(patch.active)
            .bind(patch.target.is_some())
            .bind(patch.target.and_then(|t| t.pool_id()))
            .bind(patch.target.and_then(|t| t.owner_id()))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| name_conflict_or(e, patch.name.as_deref().unwrap_or(&existing.name)))?
            .ok_or_else(|| rule_not_found(id))?;

        let conditions = match &patch.conditions {
            Some(conditions) => {
                sqlx::query(
                    "UPDATE assignment_conditions SET deleted_at = NOW() \
                     WHERE rule_id = $1 AND deleted_at IS NULL",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
                Self::insert_conditions(&mut tx, id, conditions).await?
            }
            None => {
                let query = format!(
                    "SELECT {CONDITION_COLUMNS} FROM assignment_conditions
                     WHERE rule_id = $1 AND deleted_at IS NULL
                     ORDER BY id"
                );
                sqlx::query_as::<_, AssignmentCondition>(&query)
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;
        Ok(AssignmentRuleWithConditions { rule, conditions })
    }

    /// Soft-delete a rule and its conditions, then close the priority gap.
    pub async fn soft_delete(pool: &PgPool, id: DbId, policy: RetryPolicy) -> Result<(), RepoError> {
        let rule = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| rule_not_found(id))?;
        let organization_id = rule.organization_id;

        retry_on_conflict(policy, "delete_assignment_rule", move |_| async move {
            conflict_as_retry(Self::try_delete(pool, organization_id, id).await)
        })
        .await
    }

    async fn try_delete(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Attempt<()>, RepoError> {
        let snapshot = RulePriorityRepo::load(pool, organization_id).await?;
        let removed = snapshot
            .iter()
            .find(|r| r.rule_id == id)
            .copied()
            .ok_or_else(|| rule_not_found(id))?;
        let remaining: Vec<RulePriority> = snapshot
            .iter()
            .filter(|r| r.rule_id != id)
            .copied()
            .collect();
        let changes = plan_compaction(&remaining, removed.priority);

        let mut tx = pool.begin().await?;
        if !RulePriorityRepo::lock_matches(&mut tx, organization_id, &snapshot).await? {
            return Ok(Attempt::Conflict);
        }

        sqlx::query(
            "UPDATE assignment_rules SET deleted_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE assignment_conditions SET deleted_at = NOW() \
             WHERE rule_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if !RulePriorityRepo::apply_changes(&mut tx, organization_id, &changes).await? {
            return Ok(Attempt::Conflict);
        }
        if !RulePriorityRepo::is_dense_in(&mut tx, organization_id).await? {
            return Ok(Attempt::Conflict);
        }
        tx.commit().await?;
        Ok(Attempt::Done(()))
    }
}
