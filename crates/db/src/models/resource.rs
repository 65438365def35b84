//! Cloud resource model as seen by the rule engine.

use std::collections::BTreeMap;

use costkeeper_core::assignment::resource::{Assignment, ResourceView};
use costkeeper_core::types::{DbId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

/// A row from the `resources` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Resource {
    pub id: DbId,
    pub organization_id: DbId,
    pub name: String,
    pub resource_type: String,
    pub cloud_type: String,
    pub region: Option<String>,
    pub tags: Value,
    pub pool_id: Option<DbId>,
    pub owner_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Resource {
    pub fn assignment(&self) -> Assignment {
        Assignment {
            pool_id: self.pool_id,
            owner_id: self.owner_id,
        }
    }

    /// Project the row onto the attributes conditions are evaluated against.
    ///
    /// Non-string tag values are matched on their JSON text.
    pub fn into_view(self) -> ResourceView {
        ResourceView {
            id: self.id,
            name: self.name,
            resource_type: self.resource_type,
            cloud_type: self.cloud_type,
            region: self.region,
            tags: tag_map(self.tags),
        }
    }
}

fn tag_map(tags: Value) -> BTreeMap<String, String> {
    let Value::Object(map) = tags else {
        return BTreeMap::new();
    };
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}
