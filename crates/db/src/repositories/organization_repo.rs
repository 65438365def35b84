//! Existence checks for organizations and their employees.

use costkeeper_core::error::CoreError;
use costkeeper_core::types::DbId;
use sqlx::PgPool;

use crate::error::RepoError;

pub struct OrganizationRepo;

impl OrganizationRepo {
    /// Whether a non-deleted organization with `id` exists.
    pub async fn exists(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM organizations WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// Fail with `NotFound` unless the organization exists.
    pub async fn ensure_exists(pool: &PgPool, id: DbId) -> Result<(), RepoError> {
        if Self::exists(pool, id).await? {
            Ok(())
        } else {
            Err(CoreError::NotFound {
                entity: "Organization",
                id,
            }
            .into())
        }
    }

    /// Whether `employee_id` is a live employee of `organization_id`.
    pub async fn employee_exists(
        pool: &PgPool,
        organization_id: DbId,
        employee_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM employees
                WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL
             )",
        )
        .bind(employee_id)
        .bind(organization_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }
}
