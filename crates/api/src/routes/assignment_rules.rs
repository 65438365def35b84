//! Route definitions for assignment rules.
//!
//! Two routers are provided:
//! - `router()` for rule-addressed routes mounted at `/assignment-rules`
//! - `organization_router()` for organization-scoped routes mounted at `/organizations`

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::assignment_rules;
use crate::state::AppState;

/// Rule-addressed routes mounted at `/assignment-rules`.
///
/// ```text
/// GET    /condition-types   -> list_condition_types
/// GET    /{id}              -> get_rule
/// PATCH  /{id}              -> update_rule
/// DELETE /{id}              -> delete_rule
/// POST   /{id}/priority     -> update_priority
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/condition-types",
            get(assignment_rules::list_condition_types),
        )
        .route(
            "/{id}",
            get(assignment_rules::get_rule)
                .patch(assignment_rules::update_rule)
                .delete(assignment_rules::delete_rule),
        )
        .route("/{id}/priority", post(assignment_rules::update_priority))
}

/// Organization-scoped routes mounted at `/organizations`.
///
/// ```text
/// GET    /{org_id}/assignment-rules                        -> list_rules
/// POST   /{org_id}/assignment-rules                        -> create_rule
/// POST   /{org_id}/assignment-rules/reapply                -> reapply_rules
/// GET    /{org_id}/resources/{resource_id}/rule-match      -> match_resource
/// ```
pub fn organization_router() -> Router<AppState> {
    Router::new()
        .route(
            "/{org_id}/assignment-rules",
            get(assignment_rules::list_rules).post(assignment_rules::create_rule),
        )
        .route(
            "/{org_id}/assignment-rules/reapply",
            post(assignment_rules::reapply_rules),
        )
        .route(
            "/{org_id}/resources/{resource_id}/rule-match",
            get(assignment_rules::match_resource),
        )
}
