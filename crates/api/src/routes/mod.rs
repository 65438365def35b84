pub mod assignment_rules;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /assignment-rules/condition-types                      supported condition types
/// /assignment-rules/{id}                                 get, update, delete
/// /assignment-rules/{id}/priority                        reorder (POST)
///
/// /organizations/{org_id}/assignment-rules               list, create
/// /organizations/{org_id}/assignment-rules/reapply       bulk re-application (POST)
/// /organizations/{org_id}/resources/{id}/rule-match      match preview (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/assignment-rules", assignment_rules::router())
        .nest("/organizations", assignment_rules::organization_router())
}
