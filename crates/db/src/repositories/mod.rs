//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! `&PgPool` as the first argument. Multi-row writes open their own
//! transaction.

pub mod assignment_rule_repo;
pub mod organization_repo;
pub mod pool_repo;
pub mod resource_repo;
pub mod rule_priority_repo;

pub use assignment_rule_repo::AssignmentRuleRepo;
pub use organization_repo::OrganizationRepo;
pub use pool_repo::{PgPoolHierarchy, PoolRepo};
pub use resource_repo::{PgResourceInventory, ResourceRepo};
pub use rule_priority_repo::RulePriorityRepo;
