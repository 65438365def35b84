//! Assignment-rule engine.
//!
//! Classifies cloud resources into pools and owners using an ordered,
//! organization-scoped list of rules. Everything here is storage-agnostic:
//!
//! - [`condition`] -- the closed set of condition types and their evaluation.
//! - [`resource`] -- the resource projection and assignment targets.
//! - [`matcher`] -- first-match resolution over priority-ordered rules.
//! - [`priority`] -- dense priority planning (create, delete, reorder).
//! - [`retry`] -- bounded retry loop for optimistic priority writes.
//! - [`validation`] -- boundary validation for rule create/edit payloads.
//! - [`reapply`] -- bulk re-application over a pool's resources.

pub mod condition;
pub mod matcher;
pub mod priority;
pub mod reapply;
pub mod resource;
pub mod retry;
pub mod validation;
