//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` request DTOs where the entity is written through the API

pub mod assignment_rule;
pub mod pool;
pub mod resource;
