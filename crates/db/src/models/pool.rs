//! Pool model. Pools are managed elsewhere; the rule engine only reads them.

use costkeeper_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `pools` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Pool {
    pub id: DbId,
    pub organization_id: DbId,
    pub parent_id: Option<DbId>,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
