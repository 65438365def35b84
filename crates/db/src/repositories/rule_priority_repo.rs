//! Transactional application of priority plans.
//!
//! Every priority write follows the same shape: read a snapshot, plan against
//! it, then inside one transaction lock the organization's rules, confirm the
//! snapshot still holds, apply the plan and confirm the result is dense. Any
//! mismatch is reported as [`Attempt::Conflict`] and the caller's retry loop
//! starts over from a fresh snapshot.

use costkeeper_core::assignment::priority::{
    is_dense, plan_reorder, PriorityAction, PriorityChange, RulePriority,
};
use costkeeper_core::assignment::retry::{retry_on_conflict, Attempt, RetryPolicy};
use costkeeper_core::error::CoreError;
use costkeeper_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{conflict_as_retry, RepoError};
use crate::models::assignment_rule::{AssignmentRuleWithConditions, RuleListFilter};
use crate::repositories::AssignmentRuleRepo;

pub struct RulePriorityRepo;

fn into_priorities(rows: Vec<(DbId, i32)>) -> Vec<RulePriority> {
    let mut priorities: Vec<RulePriority> = rows
        .into_iter()
        .map(|(rule_id, priority)| RulePriority { rule_id, priority })
        .collect();
    priorities.sort_by_key(|r| (r.priority, r.rule_id));
    priorities
}

impl RulePriorityRepo {
    /// Current priorities of an organization's live rules, ascending.
    pub async fn load(pool: &PgPool, organization_id: DbId) -> Result<Vec<RulePriority>, sqlx::Error> {
        let rows: Vec<(DbId, i32)> = sqlx::query_as(
            "SELECT id, priority FROM assignment_rules
             WHERE organization_id = $1 AND deleted_at IS NULL
             ORDER BY priority, id",
        )
        .bind(organization_id)
        .fetch_all(pool)
        .await?;
        Ok(into_priorities(rows))
    }

    /// Row-lock an organization's live rules and return their priorities,
    /// ascending. Locks are taken in id order.
    pub async fn lock(
        tx: &mut Transaction<'_, Postgres>,
        organization_id: DbId,
    ) -> Result<Vec<RulePriority>, sqlx::Error> {
        let rows: Vec<(DbId, i32)> = sqlx::query_as(
            "SELECT id, priority FROM assignment_rules
             WHERE organization_id = $1 AND deleted_at IS NULL
             ORDER BY id
             FOR UPDATE",
        )
        .bind(organization_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(into_priorities(rows))
    }

    /// Lock the organization's rules and check nothing moved since `snapshot`.
    pub async fn lock_matches(
        tx: &mut Transaction<'_, Postgres>,
        organization_id: DbId,
        snapshot: &[RulePriority],
    ) -> Result<bool, sqlx::Error> {
        let locked = Self::lock(tx, organization_id).await?;
        Ok(locked.as_slice() == snapshot)
    }

    /// Whether the organization's live priorities, as seen by a fresh
    /// statement inside `tx`, are exactly `1..N`.
    pub async fn is_dense_in(
        tx: &mut Transaction<'_, Postgres>,
        organization_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT priority FROM assignment_rules
             WHERE organization_id = $1 AND deleted_at IS NULL",
        )
        .bind(organization_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(is_dense(rows.into_iter().map(|(p,)| p)))
    }

    /// Write a plan in two statements.
    ///
    /// Changed rows are first parked at `-to`, then all parked rows flip sign
    /// together, so the unique index never sees an intermediate collision.
    /// Returns `false` when some row no longer had its planned `from` value.
    pub async fn apply_changes(
        tx: &mut Transaction<'_, Postgres>,
        organization_id: DbId,
        changes: &[PriorityChange],
    ) -> Result<bool, sqlx::Error> {
        if changes.is_empty() {
            return Ok(true);
        }

        let ids: Vec<DbId> = changes.iter().map(|c| c.rule_id).collect();
        let from: Vec<i32> = changes.iter().map(|c| c.from).collect();
        let to: Vec<i32> = changes.iter().map(|c| c.to).collect();

        let parked = sqlx::query(
            "UPDATE assignment_rules AS r SET priority = -c.to_priority
             FROM UNNEST($2::bigint[], $3::int[], $4::int[]) AS c(rule_id, from_priority, to_priority)
             WHERE r.id = c.rule_id
               AND r.priority = c.from_priority
               AND r.organization_id = $1
               AND r.deleted_at IS NULL",
        )
        .bind(organization_id)
        .bind(&ids)
        .bind(&from)
        .bind(&to)
        .execute(&mut **tx)
        .await?;
        if parked.rows_affected() != changes.len() as u64 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE assignment_rules SET priority = -priority
             WHERE organization_id = $1 AND priority < 0 AND deleted_at IS NULL",
        )
        .bind(organization_id)
        .execute(&mut **tx)
        .await?;
        Ok(true)
    }

    /// Apply a reorder action to a rule and return the organization's rules
    /// in their new order.
    pub async fn reorder(
        pool: &PgPool,
        rule_id: DbId,
        action: PriorityAction,
        policy: RetryPolicy,
    ) -> Result<Vec<AssignmentRuleWithConditions>, RepoError> {
        let rule = AssignmentRuleRepo::find_by_id(pool, rule_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "AssignmentRule",
                id: rule_id,
            })?;
        let organization_id = rule.organization_id;

        retry_on_conflict(policy, "update_priority", move |_| async move {
            conflict_as_retry(Self::try_reorder(pool, organization_id, rule_id, action).await)
        })
        .await?;

        Ok(AssignmentRuleRepo::list(pool, organization_id, &RuleListFilter::default()).await?)
    }

    async fn try_reorder(
        pool: &PgPool,
        organization_id: DbId,
        rule_id: DbId,
        action: PriorityAction,
    ) -> Result<Attempt<()>, RepoError> {
        let snapshot = Self::load(pool, organization_id).await?;
        let changes = plan_reorder(&snapshot, rule_id, action)?;
        if changes.is_empty() {
            return Ok(Attempt::Done(()));
        }

        let mut tx = pool.begin().await?;
        if !Self::lock_matches(&mut tx, organization_id, &snapshot).await? {
            return Ok(Attempt::Conflict);
        }
        if !Self::apply_changes(&mut tx, organization_id, &changes).await? {
            return Ok(Attempt::Conflict);
        }
        if !Self::is_dense_in(&mut tx, organization_id).await? {
            return Ok(Attempt::Conflict);
        }
        tx.commit().await?;

        tracing::debug!(
            rule_id,
            organization_id,
            %action,
            moved = changes.len(),
            "Rule priorities reordered"
        );
        Ok(Attempt::Done(()))
    }
}
