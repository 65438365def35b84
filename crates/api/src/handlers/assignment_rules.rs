//! Handlers for assignment rules.
//!
//! Rule CRUD, priority reordering, bulk re-application over a pool subtree and
//! a single-resource match preview. All endpoints require authentication via
//! [`AuthUser`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use costkeeper_core::assignment::condition::ConditionType;
use costkeeper_core::assignment::matcher::RuleSet;
use costkeeper_core::assignment::reapply::BulkApplier;
use costkeeper_core::assignment::validation::{validate_draft, validate_patch};
use costkeeper_core::error::CoreError;
use costkeeper_core::types::DbId;
use costkeeper_db::models::assignment_rule::{
    CreateAssignmentRule, PriorityUpdateRequest, ReapplyRequest, RuleListFilter,
    RuleMatchPreview, UpdateAssignmentRule,
};
use costkeeper_db::repositories::{
    AssignmentRuleRepo, OrganizationRepo, PgPoolHierarchy, PgResourceInventory, PoolRepo,
    ResourceRepo, RulePriorityRepo,
};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// GET /api/v1/assignment-rules/condition-types
pub async fn list_condition_types(_auth: AuthUser) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: ConditionType::ALL,
    }))
}

// ---------------------------------------------------------------------------
// Rule CRUD
// ---------------------------------------------------------------------------

/// GET /api/v1/organizations/{org_id}/assignment-rules
///
/// Rules in priority order. Supports `pool_id`, `owner_id` and `valid_only`
/// query filters.
pub async fn list_rules(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
    Query(filter): Query<RuleListFilter>,
) -> AppResult<impl IntoResponse> {
    OrganizationRepo::ensure_exists(&state.pool, org_id).await?;
    let rules = AssignmentRuleRepo::list(&state.pool, org_id, &filter).await?;

    Ok(Json(DataResponse { data: rules }))
}

/// POST /api/v1/organizations/{org_id}/assignment-rules
///
/// New rules go to the end of the priority list.
pub async fn create_rule(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
    Json(input): Json<CreateAssignmentRule>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let draft = validate_draft(
        &input.name,
        &input.conditions,
        input.pool_id,
        input.owner_id,
        input.active,
    )?;

    let rule = AssignmentRuleRepo::create(
        &state.pool,
        org_id,
        auth.user_id,
        &draft,
        state.config.assignment.retry_policy(),
    )
    .await?;

    tracing::info!(
        rule_id = rule.rule.id,
        organization_id = org_id,
        priority = rule.rule.priority,
        user_id = auth.user_id,
        "Assignment rule created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: rule })))
}

/// GET /api/v1/assignment-rules/{id}
pub async fn get_rule(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(rule_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let rule = AssignmentRuleRepo::find_with_conditions(&state.pool, rule_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "AssignmentRule",
            id: rule_id,
        }))?;

    Ok(Json(DataResponse { data: rule }))
}

/// PATCH /api/v1/assignment-rules/{id}
///
/// Priority is not editable here; use the priority endpoint.
pub async fn update_rule(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(rule_id): Path<DbId>,
    Json(input): Json<UpdateAssignmentRule>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let patch = validate_patch(
        input.name.as_deref(),
        input.active,
        input.pool_id,
        input.owner_id,
        input.conditions.as_deref(),
    )?;

    let rule = AssignmentRuleRepo::update(&state.pool, rule_id, &patch).await?;

    tracing::info!(rule_id, user_id = auth.user_id, "Assignment rule updated");

    Ok(Json(DataResponse { data: rule }))
}

/// DELETE /api/v1/assignment-rules/{id}
///
/// Lower-precedence rules move up to close the gap.
pub async fn delete_rule(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(rule_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    AssignmentRuleRepo::soft_delete(
        &state.pool,
        rule_id,
        state.config.assignment.retry_policy(),
    )
    .await?;

    tracing::info!(rule_id, user_id = auth.user_id, "Assignment rule deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// POST /api/v1/assignment-rules/{id}/priority
///
/// Body: `{"action": "prioritize" | "promote" | "demote" | "deprioritize"}`.
/// Returns the organization's rules in their new order.
pub async fn update_priority(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(rule_id): Path<DbId>,
    Json(input): Json<PriorityUpdateRequest>,
) -> AppResult<impl IntoResponse> {
    let action = input.action()?;

    let rules = RulePriorityRepo::reorder(
        &state.pool,
        rule_id,
        action,
        state.config.assignment.retry_policy(),
    )
    .await?;

    tracing::info!(
        rule_id,
        %action,
        user_id = auth.user_id,
        "Assignment rule priority changed",
    );

    Ok(Json(DataResponse { data: rules }))
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// POST /api/v1/organizations/{org_id}/assignment-rules/reapply
///
/// Re-run the organization's active rules over every resource in a pool,
/// optionally including its descendants.
pub async fn reapply_rules(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
    Json(input): Json<ReapplyRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    OrganizationRepo::ensure_exists(&state.pool, org_id).await?;
    PoolRepo::find_in_org(&state.pool, org_id, input.pool_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Pool",
            id: input.pool_id,
        }))?;

    let compiled = AssignmentRuleRepo::compile_active(&state.pool, org_id).await?;
    let rules = RuleSet::new(compiled, state.config.assignment.case_mode());

    let inventory = PgResourceInventory::new(state.pool.clone());
    let hierarchy = PgPoolHierarchy::new(state.pool.clone());
    let outcome = BulkApplier::new(&inventory, &hierarchy)
        .with_pool_batch_size(state.config.assignment.reapply_pool_batch_size)
        .reapply(&rules, input.pool_id, input.include_children)
        .await?;

    tracing::info!(
        organization_id = org_id,
        pool_id = input.pool_id,
        include_children = input.include_children,
        processed = outcome.processed,
        updated = outcome.updated_assignments,
        user_id = auth.user_id,
        "Assignment rules re-applied",
    );

    Ok(Json(DataResponse { data: outcome }))
}

/// GET /api/v1/organizations/{org_id}/resources/{resource_id}/rule-match
///
/// Which rule would claim the resource right now, and where it would move.
/// Nothing is written.
pub async fn match_resource(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path((org_id, resource_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let resource = ResourceRepo::find_in_org(&state.pool, org_id, resource_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Resource",
            id: resource_id,
        }))?;

    let compiled = AssignmentRuleRepo::compile_active(&state.pool, org_id).await?;
    let rules = RuleSet::new(compiled, state.config.assignment.case_mode());

    let current = resource.assignment();
    let view = resource.into_view();
    let (rule, proposed) = match rules.select(&view) {
        Some(matched) => {
            let proposed = matched.target.apply(current);
            let rule = AssignmentRuleRepo::find_with_conditions(&state.pool, matched.id).await?;
            (rule, proposed)
        }
        None => (None, current),
    };

    Ok(Json(DataResponse {
        data: RuleMatchPreview {
            resource_id,
            rule,
            current,
            proposed,
        },
    }))
}
