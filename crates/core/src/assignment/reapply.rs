//! Bulk re-application of assignment rules to a pool's resources.
//!
//! The resource inventory and the pool hierarchy are owned by other parts of
//! the platform; this module only sees them through the
//! [`ResourceInventory`] and [`PoolHierarchy`] traits.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use super::matcher::RuleSet;
use super::resource::{Assignment, ResourceView};
use crate::error::CoreError;
use crate::types::DbId;

/// Default number of pools whose resources are listed per inventory call.
pub const DEFAULT_POOL_BATCH_SIZE: usize = 50;

/// Read/write access to cloud resources and their current assignment.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    /// Resources currently owned by any of `pool_ids`.
    async fn list_resources(&self, pool_ids: &[DbId]) -> Result<Vec<ResourceView>, CoreError>;

    /// Current assignment; `NotFound` if the resource does not exist.
    async fn get_resource_assignment(&self, resource_id: DbId) -> Result<Assignment, CoreError>;

    async fn set_resource_assignment(
        &self,
        resource_id: DbId,
        assignment: Assignment,
    ) -> Result<(), CoreError>;
}

/// Read access to the pool tree.
#[async_trait]
pub trait PoolHierarchy: Send + Sync {
    /// All pools below `pool_id`, transitively. Excludes `pool_id` itself.
    async fn descendant_pool_ids(&self, pool_id: DbId) -> Result<Vec<DbId>, CoreError>;
}

/// Counters returned by [`BulkApplier::reapply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapplyOutcome {
    pub processed: u64,
    pub updated_assignments: u64,
}

/// Re-evaluates rules over every resource in a pool (and optionally its
/// descendants), writing assignments that no longer match.
pub struct BulkApplier<'a> {
    inventory: &'a dyn ResourceInventory,
    hierarchy: &'a dyn PoolHierarchy,
    pool_batch_size: usize,
}

impl<'a> BulkApplier<'a> {
    pub fn new(inventory: &'a dyn ResourceInventory, hierarchy: &'a dyn PoolHierarchy) -> Self {
        Self {
            inventory,
            hierarchy,
            pool_batch_size: DEFAULT_POOL_BATCH_SIZE,
        }
    }

    pub fn with_pool_batch_size(mut self, size: usize) -> Self {
        self.pool_batch_size = size.max(1);
        self
    }

    /// Apply `rules` to the resources of `pool_id`.
    ///
    /// Resources matching no rule are left alone. Writes are per resource, so
    /// an interrupted run leaves every already-processed resource valid.
    /// Pools are listed batch by batch after earlier writes, so a resource
    /// moved into a later batch's pool shows up again; it is counted once.
    pub async fn reapply(
        &self,
        rules: &RuleSet,
        pool_id: DbId,
        include_children: bool,
    ) -> Result<ReapplyOutcome, CoreError> {
        let mut pool_ids = vec![pool_id];
        if include_children {
            pool_ids.extend(self.hierarchy.descendant_pool_ids(pool_id).await?);
        }

        let mut outcome = ReapplyOutcome::default();
        let mut seen: HashSet<DbId> = HashSet::new();
        for batch in pool_ids.chunks(self.pool_batch_size) {
            let resources = self.inventory.list_resources(batch).await?;
            for resource in &resources {
                if !seen.insert(resource.id) {
                    continue;
                }
                outcome.processed += 1;
                if self.apply_one(rules, resource).await? {
                    outcome.updated_assignments += 1;
                }
            }
        }

        tracing::debug!(
            pool_id,
            include_children,
            pools = pool_ids.len(),
            processed = outcome.processed,
            updated = outcome.updated_assignments,
            "Reapply pass finished"
        );
        Ok(outcome)
    }

    /// Returns `true` when the resource's assignment was rewritten.
    async fn apply_one(&self, rules: &RuleSet, resource: &ResourceView) -> Result<bool, CoreError> {
        let Some(rule) = rules.select(resource) else {
            return Ok(false);
        };

        let current = self.inventory.get_resource_assignment(resource.id).await?;
        let next = rule.target.apply(current);
        if next == current {
            return Ok(false);
        }

        self.inventory
            .set_resource_assignment(resource.id, next)
            .await?;
        tracing::debug!(
            resource_id = resource.id,
            rule_id = rule.id,
            pool_id = ?next.pool_id,
            owner_id = ?next.owner_id,
            "Resource reassigned"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;
    use crate::assignment::condition::{CaseMode, Condition};
    use crate::assignment::matcher::CompiledRule;
    use crate::assignment::resource::RuleTarget;

    struct StoredResource {
        view: ResourceView,
        assignment: Assignment,
    }

    #[derive(Default)]
    struct MemoryInventory {
        resources: Mutex<HashMap<DbId, StoredResource>>,
        list_calls: Mutex<Vec<Vec<DbId>>>,
    }

    impl MemoryInventory {
        fn add(&self, id: DbId, name: &str, tags: &[(&str, &str)], pool_id: DbId) {
            let view = ResourceView {
                id,
                name: name.to_string(),
                resource_type: "Instance".to_string(),
                cloud_type: "aws_cnr".to_string(),
                region: None,
                tags: tags
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            };
            let assignment = Assignment {
                pool_id: Some(pool_id),
                owner_id: None,
            };
            self.resources
                .lock()
                .unwrap()
                .insert(id, StoredResource { view, assignment });
        }

        fn assignment(&self, id: DbId) -> Assignment {
            self.resources.lock().unwrap()[&id].assignment
        }
    }

    #[async_trait]
    impl ResourceInventory for MemoryInventory {
        async fn list_resources(&self, pool_ids: &[DbId]) -> Result<Vec<ResourceView>, CoreError> {
            self.list_calls.lock().unwrap().push(pool_ids.to_vec());
            let resources = self.resources.lock().unwrap();
            let mut views: Vec<ResourceView> = resources
                .values()
                .filter(|r| r.assignment.pool_id.is_some_and(|p| pool_ids.contains(&p)))
                .map(|r| r.view.clone())
                .collect();
            views.sort_by_key(|v| v.id);
            Ok(views)
        }

        async fn get_resource_assignment(&self, resource_id: DbId) -> Result<Assignment, CoreError> {
            self.resources
                .lock()
                .unwrap()
                .get(&resource_id)
                .map(|r| r.assignment)
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
            let mut resources = self.resources.lock().unwrap();
            let stored = resources.get_mut(&resource_id).ok_or(CoreError::NotFound {
                entity: "Resource",
                id: resource_id,
            })?;
            stored.assignment = assignment;
            Ok(())
        }
    }

    /// Pool tree as a child -> parent map.
    struct MemoryHierarchy {
        parents: HashMap<DbId, DbId>,
    }

    #[async_trait]
    impl PoolHierarchy for MemoryHierarchy {
        async fn descendant_pool_ids(&self, pool_id: DbId) -> Result<Vec<DbId>, CoreError> {
            let mut found = Vec::new();
            let mut frontier = vec![pool_id];
            while let Some(parent) = frontier.pop() {
                let mut children: Vec<DbId> = self
                    .parents
                    .iter()
                    .filter(|(_, p)| **p == parent)
                    .map(|(c, _)| *c)
                    .collect();
                children.sort_unstable();
                frontier.extend(&children);
                found.extend(children);
            }
            Ok(found)
        }
    }

    const ROOT: DbId = 1;
    const QA_POOL: DbId = 2;
    const ENV_POOL: DbId = 3;

    /// Root pool 1 with children 2 and 3; pool 4 below 3.
    fn hierarchy() -> MemoryHierarchy {
        MemoryHierarchy {
            parents: HashMap::from([(2, ROOT), (3, ROOT), (4, 3)]),
        }
    }

    fn example_rules() -> RuleSet {
        RuleSet::new(
            vec![
                CompiledRule {
                    id: 10,
                    priority: 1,
                    active: true,
                    target: RuleTarget::Pool(QA_POOL),
                    conditions: vec![Condition::NameStartsWith("QA_".to_string())],
                },
                CompiledRule {
                    id: 20,
                    priority: 2,
                    active: true,
                    target: RuleTarget::Pool(ENV_POOL),
                    conditions: vec![Condition::TagExists("env".to_string())],
                },
            ],
            CaseMode::Sensitive,
        )
    }

    #[tokio::test]
    async fn reassigns_matching_resources_and_leaves_the_rest() {
        let inventory = MemoryInventory::default();
        inventory.add(1, "QA_node1", &[], ROOT);
        inventory.add(2, "node2", &[("env", "prod")], ROOT);
        inventory.add(3, "node3", &[], ROOT);
        let hierarchy = hierarchy();

        let outcome = BulkApplier::new(&inventory, &hierarchy)
            .reapply(&example_rules(), ROOT, false)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReapplyOutcome {
                processed: 3,
                updated_assignments: 2
            }
        );
        assert_eq!(inventory.assignment(1).pool_id, Some(QA_POOL));
        assert_eq!(inventory.assignment(2).pool_id, Some(ENV_POOL));
        assert_eq!(inventory.assignment(3).pool_id, Some(ROOT));
    }

    #[tokio::test]
    async fn second_pass_updates_nothing() {
        let inventory = MemoryInventory::default();
        inventory.add(1, "QA_node1", &[], QA_POOL);
        inventory.add(2, "QA_node2", &[], ROOT);
        let hierarchy = hierarchy();
        let applier = BulkApplier::new(&inventory, &hierarchy);
        let rules = example_rules();

        let first = applier.reapply(&rules, ROOT, true).await.unwrap();
        assert_eq!(first.updated_assignments, 1);

        let second = applier.reapply(&rules, ROOT, true).await.unwrap();
        assert_eq!(second.processed, 2);
        assert_eq!(second.updated_assignments, 0);
    }

    #[tokio::test]
    async fn children_are_only_included_on_request() {
        let inventory = MemoryInventory::default();
        inventory.add(1, "QA_deep", &[], 4);
        let hierarchy = hierarchy();
        let applier = BulkApplier::new(&inventory, &hierarchy);

        let shallow = applier.reapply(&example_rules(), ENV_POOL, false).await.unwrap();
        assert_eq!(shallow.processed, 0);

        let deep = applier.reapply(&example_rules(), ENV_POOL, true).await.unwrap();
        assert_eq!(deep.processed, 1);
        assert_eq!(deep.updated_assignments, 1);
        assert_eq!(inventory.assignment(1).pool_id, Some(QA_POOL));
    }

    #[tokio::test]
    async fn owner_rules_only_touch_the_owner() {
        let inventory = MemoryInventory::default();
        inventory.add(1, "QA_node1", &[], ROOT);
        let hierarchy = hierarchy();
        let rules = RuleSet::new(
            vec![CompiledRule {
                id: 1,
                priority: 1,
                active: true,
                target: RuleTarget::Owner(77),
                conditions: vec![Condition::NameContains("node".to_string())],
            }],
            CaseMode::Sensitive,
        );

        let outcome = BulkApplier::new(&inventory, &hierarchy)
            .reapply(&rules, ROOT, false)
            .await
            .unwrap();

        assert_eq!(outcome.updated_assignments, 1);
        assert_eq!(
            inventory.assignment(1),
            Assignment {
                pool_id: Some(ROOT),
                owner_id: Some(77)
            }
        );
    }

    #[tokio::test]
    async fn pools_are_listed_in_batches() {
        let inventory = MemoryInventory::default();
        inventory.add(1, "QA_a", &[], ROOT);
        inventory.add(2, "QA_b", &[], 4);
        let hierarchy = hierarchy();

        let outcome = BulkApplier::new(&inventory, &hierarchy)
            .with_pool_batch_size(2)
            .reapply(&example_rules(), ROOT, true)
            .await
            .unwrap();

        assert_eq!(outcome.processed, 2);
        let calls = inventory.list_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|batch| batch.len() <= 2));
    }

    #[tokio::test]
    async fn resource_moved_into_a_later_batch_is_counted_once() {
        let inventory = MemoryInventory::default();
        inventory.add(1, "node", &[("env", "prod")], ROOT);
        let hierarchy = hierarchy();

        let outcome = BulkApplier::new(&inventory, &hierarchy)
            .with_pool_batch_size(1)
            .reapply(&example_rules(), ROOT, true)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReapplyOutcome {
                processed: 1,
                updated_assignments: 1
            }
        );
        assert_eq!(inventory.assignment(1).pool_id, Some(ENV_POOL));
        // ENV_POOL's batch still listed the moved resource.
        let calls = inventory.list_calls.lock().unwrap();
        assert!(calls.iter().any(|batch| batch == &[ENV_POOL]));
    }

    #[tokio::test]
    async fn inventory_errors_propagate() {
        struct Broken;

        #[async_trait]
        impl ResourceInventory for Broken {
            async fn list_resources(&self, _: &[DbId]) -> Result<Vec<ResourceView>, CoreError> {
                Err(CoreError::Internal("inventory offline".to_string()))
            }
            async fn get_resource_assignment(&self, id: DbId) -> Result<Assignment, CoreError> {
                Err(CoreError::NotFound {
                    entity: "Resource",
                    id,
                })
            }
            async fn set_resource_assignment(&self, _: DbId, _: Assignment) -> Result<(), CoreError> {
                Ok(())
            }
        }

        let hierarchy = hierarchy();
        let result = BulkApplier::new(&Broken, &hierarchy)
            .reapply(&example_rules(), ROOT, false)
            .await;
        assert_matches!(result, Err(CoreError::Internal(_)));
    }
}
