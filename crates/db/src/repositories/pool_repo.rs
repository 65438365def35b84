//! Read access to the `pools` tree.

use async_trait::async_trait;
use costkeeper_core::assignment::reapply::PoolHierarchy;
use costkeeper_core::error::CoreError;
use costkeeper_core::types::DbId;
use sqlx::PgPool;

use crate::error::internal;
use crate::models::pool::Pool;

const COLUMNS: &str = "id, organization_id, parent_id, name, created_at, updated_at";

pub struct PoolRepo;

impl PoolRepo {
    /// Find a live pool, scoped to its organization.
    pub async fn find_in_org(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Pool>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pools
             WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, Pool>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Ids of every live pool below `id`, transitively, excluding `id`.
    pub async fn descendant_ids(pool: &PgPool, id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "WITH RECURSIVE descendants AS (
                SELECT id FROM pools WHERE parent_id = $1 AND deleted_at IS NULL
                UNION
                SELECT p.id FROM pools p
                JOIN descendants d ON p.parent_id = d.id
                WHERE p.deleted_at IS NULL
             )
             SELECT id FROM descendants ORDER BY id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// [`PoolHierarchy`] backed by the `pools` table.
#[derive(Clone)]
pub struct PgPoolHierarchy {
    pool: PgPool,
}

impl PgPoolHierarchy {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PoolHierarchy for PgPoolHierarchy {
    async fn descendant_pool_ids(&self, pool_id: DbId) -> Result<Vec<DbId>, CoreError> {
        PoolRepo::descendant_ids(&self.pool, pool_id)
            .await
            .map_err(internal)
    }
}
