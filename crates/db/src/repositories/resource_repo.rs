//! Read/write access to the resource inventory.

use async_trait::async_trait;
use costkeeper_core::assignment::reapply::ResourceInventory;
use costkeeper_core::assignment::resource::{Assignment, ResourceView};
use costkeeper_core::error::CoreError;
use costkeeper_core::types::DbId;
use sqlx::PgPool;

use crate::error::internal;
use crate::models::resource::Resource;

const COLUMNS: &str = "id, organization_id, name, resource_type, cloud_type, region, tags, \
    pool_id, owner_id, created_at, updated_at";

pub struct ResourceRepo;

impl ResourceRepo {
    /// Find a live resource by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM resources WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a live resource, scoped to its organization.
    pub async fn find_in_org(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM resources
             WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Live resources currently assigned to any of `pool_ids`, ordered by ID.
    pub async fn list_by_pools(
        pool: &PgPool,
        pool_ids: &[DbId],
    ) -> Result<Vec<Resource>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM resources
             WHERE pool_id = ANY($1) AND deleted_at IS NULL
             ORDER BY id"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(pool_ids)
            .fetch_all(pool)
            .await
    }

    /// Overwrite a resource's pool and owner. Returns `true` if a row changed.
    pub async fn set_assignment(
        pool: &PgPool,
        id: DbId,
        assignment: Assignment,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resources SET pool_id = $2, owner_id = $3 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(assignment.pool_id)
        .bind(assignment.owner_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// [`ResourceInventory`] backed by the `resources` table.
#[derive(Clone)]
pub struct PgResourceInventory {
    pool: PgPool,
}

impl PgResourceInventory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceInventory for PgResourceInventory {
    async fn list_resources(&self, pool_ids: &[DbId]) -> Result<Vec<ResourceView>, CoreError> {
        let rows = ResourceRepo::list_by_pools(&self.pool, pool_ids)
            .await
            .map_err(internal)?;
        Ok(rows.into_iter().map(Resource::into_view).collect())
    }

    async fn get_resource_assignment(&self, resource_id: DbId) -> Result<Assignment, CoreError> {
        ResourceRepo::find_by_id(&self.pool, resource_id)
            .await
            .map_err(internal)?
            .map(|r| r.assignment())
            .ok_or(CoreError::NotFound {
                entity: "Resource",
                id: resource_id,
            })
    }

    async fn set_resource_assignment(
        &self,
        resource_id: DbId,
        assignment: Assignment,
    ) -> Result<(), CoreError> {
        let updated = ResourceRepo::set_assignment(&self.pool, resource_id, assignment)
            .await
            .map_err(internal)?;
        if updated {
            Ok(())
        } else {
            Err(CoreError::NotFound {
                entity: "Resource",
                id: resource_id,
            })
        }
    }
}
